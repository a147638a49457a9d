//! Approval state machine for draft lines.
//!
//! A request targets a batch of draft lines and advances all of them by exactly one
//! slot. The slot is chosen from the first requested line; every other line in the
//! batch must sit at the same stage or the request is rejected before anything is
//! written. Filling the third slot commits the lines and promotes them to the ledger.
//!
//! The planner here is pure. Persistence and the promotion side effect live in the
//! database crate, which runs the decision and its writes in one transaction.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::domain::approval::{ApprovalStage, SlotPosition};
use crate::domain::line::LineId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalRequest {
    line_ids: Vec<LineId>,
    officer: String,
}

impl ApprovalRequest {
    /// Validates the request shape. Duplicate ids collapse onto their first occurrence.
    pub fn new(line_ids: impl IntoIterator<Item = i64>, officer: &str) -> Result<Self, DomainError> {
        let officer = officer.trim();
        if officer.is_empty() {
            return Err(DomainError::MissingOfficer);
        }

        let mut seen = HashSet::new();
        let line_ids: Vec<LineId> =
            line_ids.into_iter().filter(|id| seen.insert(*id)).map(LineId).collect();
        if line_ids.is_empty() {
            return Err(DomainError::EmptyApprovalTarget);
        }

        Ok(Self { line_ids, officer: officer.to_string() })
    }

    pub fn line_ids(&self) -> &[LineId] {
        &self.line_ids
    }

    pub fn officer(&self) -> &str {
        &self.officer
    }

    pub fn raw_ids(&self) -> Vec<i64> {
        self.line_ids.iter().map(|id| id.0).collect()
    }
}

/// Current stage of one targeted line as read inside the approval transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineApprovalState {
    pub line_id: LineId,
    pub stage: ApprovalStage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApprovalDecision {
    pub slot: SlotPosition,
    pub new_stage: ApprovalStage,
}

impl ApprovalDecision {
    pub fn promotes(&self) -> bool {
        self.slot == SlotPosition::Third
    }
}

/// Decides the single slot transition for the whole batch.
pub fn decide(
    request: &ApprovalRequest,
    states: &[LineApprovalState],
) -> Result<ApprovalDecision, DomainError> {
    let by_id: HashMap<LineId, ApprovalStage> =
        states.iter().map(|state| (state.line_id, state.stage)).collect();

    let missing: Vec<i64> =
        request.line_ids.iter().filter(|id| !by_id.contains_key(id)).map(|id| id.0).collect();
    if !missing.is_empty() {
        return Err(DomainError::LinesNotFound { line_ids: missing });
    }

    let leader = request.line_ids[0];
    let expected = by_id[&leader];
    let slot = expected.next_slot().ok_or(DomainError::AlreadyFullyApproved)?;

    for id in &request.line_ids[1..] {
        let found = by_id[id];
        if found != expected {
            return Err(DomainError::MixedApprovalStages { expected, found, line_id: id.0 });
        }
    }

    Ok(ApprovalDecision { slot, new_stage: slot.resulting_stage() })
}

/// Result reported to the approving officer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApprovalOutcome {
    pub message: String,
    pub new_state: ApprovalStage,
    pub approved_level: u8,
    pub line_ids: Vec<LineId>,
    pub promoted: usize,
    pub already_committed: usize,
}

pub fn outcome_message(slot: SlotPosition, promoted: bool) -> String {
    let mut message = format!("approval level {} recorded", slot.number());
    if promoted {
        message.push_str(" and committed to the ledger");
    }
    message
}

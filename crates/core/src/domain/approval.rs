use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// One of the three ordered signature positions on a draft line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotPosition {
    First,
    Second,
    Third,
}

impl SlotPosition {
    pub const ALL: [SlotPosition; 3] = [Self::First, Self::Second, Self::Third];

    pub fn number(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
            Self::Third => 3,
        }
    }

    pub fn index(self) -> usize {
        usize::from(self.number() - 1)
    }

    pub fn approver_column(self) -> &'static str {
        match self {
            Self::First => "approver_1",
            Self::Second => "approver_2",
            Self::Third => "approver_3",
        }
    }

    pub fn date_column(self) -> &'static str {
        match self {
            Self::First => "approved_date_1",
            Self::Second => "approved_date_2",
            Self::Third => "approved_date_3",
        }
    }

    pub fn time_column(self) -> &'static str {
        match self {
            Self::First => "approved_time_1",
            Self::Second => "approved_time_2",
            Self::Third => "approved_time_3",
        }
    }

    /// Stage a line reaches once this slot is filled.
    pub fn resulting_stage(self) -> ApprovalStage {
        match self {
            Self::First => ApprovalStage::FirstApproved,
            Self::Second => ApprovalStage::SecondApproved,
            Self::Third => ApprovalStage::Committed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalSignature {
    pub officer: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl ApprovalSignature {
    pub fn at(officer: impl Into<String>, moment: NaiveDateTime) -> Self {
        let moment = moment.with_nanosecond(0).unwrap_or(moment);
        Self { officer: officer.into(), date: moment.date(), time: moment.time() }
    }

    pub fn date_text(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }

    pub fn time_text(&self) -> String {
        self.time.format("%H:%M:%S").to_string()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApprovalStage {
    #[serde(rename = "draft-0-approved")]
    Unapproved,
    #[serde(rename = "draft-1-approved")]
    FirstApproved,
    #[serde(rename = "draft-2-approved")]
    SecondApproved,
    #[serde(rename = "committed")]
    Committed,
}

impl ApprovalStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unapproved => "draft-0-approved",
            Self::FirstApproved => "draft-1-approved",
            Self::SecondApproved => "draft-2-approved",
            Self::Committed => "committed",
        }
    }

    /// Slot the next approval fills, or `None` once every slot is taken.
    pub fn next_slot(&self) -> Option<SlotPosition> {
        match self {
            Self::Unapproved => Some(SlotPosition::First),
            Self::FirstApproved => Some(SlotPosition::Second),
            Self::SecondApproved => Some(SlotPosition::Third),
            Self::Committed => None,
        }
    }
}

/// The three approval slots of a draft line. Slots fill strictly left to right.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalSlots {
    slots: [Option<ApprovalSignature>; 3],
}

impl ApprovalSlots {
    /// Builds slots from stored columns, rejecting a filled slot that follows an empty one.
    pub fn from_parts(slots: [Option<ApprovalSignature>; 3]) -> Result<Self, DomainError> {
        let mut seen_empty = false;
        for (index, slot) in slots.iter().enumerate() {
            match slot {
                None => seen_empty = true,
                Some(_) if seen_empty => {
                    return Err(DomainError::ApprovalSlotGap { slot: index + 1 });
                }
                Some(_) => {}
            }
        }
        Ok(Self { slots })
    }

    pub fn slot(&self, position: SlotPosition) -> Option<&ApprovalSignature> {
        self.slots[position.index()].as_ref()
    }

    pub fn filled_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn stage(&self) -> ApprovalStage {
        match self.filled_count() {
            0 => ApprovalStage::Unapproved,
            1 => ApprovalStage::FirstApproved,
            2 => ApprovalStage::SecondApproved,
            _ => ApprovalStage::Committed,
        }
    }

    pub fn next_open(&self) -> Option<SlotPosition> {
        self.stage().next_slot()
    }

    /// Fills the next open slot. A filled slot is never overwritten.
    pub fn fill(&mut self, signature: ApprovalSignature) -> Result<SlotPosition, DomainError> {
        let position = self.next_open().ok_or(DomainError::AlreadyFullyApproved)?;
        self.slots[position.index()] = Some(signature);
        Ok(position)
    }

    pub fn officers(&self) -> Vec<&str> {
        self.slots.iter().flatten().map(|signature| signature.officer.as_str()).collect()
    }
}

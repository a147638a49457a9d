use chrono::{Local, NaiveDateTime, Utc};
use tracing::{info, warn};

use stockplan_core::approvals::{
    decide, outcome_message, ApprovalOutcome, ApprovalRequest, LineApprovalState,
};
use stockplan_core::domain::approval::ApprovalSignature;
use stockplan_core::domain::plan::PlanId;

use super::EngineError;
use crate::repositories::committed_line::{self, PromotionResult};
use crate::repositories::draft_line::{self, ApprovalSummary};
use crate::DbPool;

/// Three-slot sign-off for batches of draft lines, with promotion on the third slot.
///
/// A request is all or nothing: the slot fill, the status change and every ledger
/// insert share one transaction, and any failure rolls the whole request back.
#[derive(Clone, Debug)]
pub struct ApprovalEngine {
    pool: DbPool,
}

impl ApprovalEngine {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Approves at the local wall clock.
    pub async fn approve(
        &self,
        line_ids: Vec<i64>,
        officer: &str,
    ) -> Result<ApprovalOutcome, EngineError> {
        self.approve_at(line_ids, officer, Local::now().naive_local()).await
    }

    pub async fn approve_at(
        &self,
        line_ids: Vec<i64>,
        officer: &str,
        moment: NaiveDateTime,
    ) -> Result<ApprovalOutcome, EngineError> {
        let request = ApprovalRequest::new(line_ids, officer)?;
        let ids = request.line_ids();

        let mut tx = self.pool.begin().await?;
        let lines = draft_line::fetch_lines(&mut tx, ids).await?;
        let states: Vec<LineApprovalState> = lines
            .iter()
            .map(|line| LineApprovalState { line_id: line.id, stage: line.approvals.stage() })
            .collect();

        let decision = match decide(&request, &states) {
            Ok(decision) => decision,
            Err(error) => {
                warn!(
                    event_name = "engine.approval.rejected",
                    officer = request.officer(),
                    lines = ids.len(),
                    error = %error,
                    "approval request rejected"
                );
                return Err(error.into());
            }
        };

        let now = Utc::now();
        let signature = ApprovalSignature::at(request.officer(), moment);
        let filled = draft_line::fill_slot(&mut tx, ids, decision.slot, &signature, now).await?;
        if filled != ids.len() as u64 {
            return Err(EngineError::ApprovalConflict(format!(
                "slot {} changed under a concurrent approval ({filled} of {} lines updated)",
                decision.slot.number(),
                ids.len()
            )));
        }

        let mut promoted = 0;
        let mut already_committed = 0;
        if decision.promotes() {
            for id in ids {
                match committed_line::promote(&mut tx, *id, now).await? {
                    PromotionResult::Promoted(_) => promoted += 1,
                    PromotionResult::AlreadyCommitted => already_committed += 1,
                }
            }
            draft_line::mark_committed(&mut tx, ids, now).await?;
        }

        tx.commit().await?;

        info!(
            event_name = "engine.approval.recorded",
            officer = request.officer(),
            slot = decision.slot.number(),
            new_state = decision.new_stage.as_str(),
            lines = ids.len(),
            "approval slot filled"
        );
        if decision.promotes() {
            info!(
                event_name = "engine.approval.promoted",
                promoted,
                skipped = already_committed,
                "approved lines promoted to the committed ledger"
            );
        }

        Ok(ApprovalOutcome {
            message: outcome_message(decision.slot, promoted > 0),
            new_state: decision.new_stage,
            approved_level: decision.slot.number(),
            line_ids: ids.to_vec(),
            promoted,
            already_committed,
        })
    }

    pub async fn plan_approval_summary(
        &self,
        plan_id: PlanId,
    ) -> Result<ApprovalSummary, EngineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(draft_line::approval_summary(&mut conn, plan_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use serde_json::json;

    use stockplan_core::domain::approval::{ApprovalStage, SlotPosition};
    use stockplan_core::domain::line::LineId;
    use stockplan_core::domain::plan::{BudgetYear, DepartmentId, PlanKey};
    use stockplan_core::errors::DomainError;
    use stockplan_core::lock::PlanLockTable;
    use stockplan_core::retry::RetryPolicy;

    use super::ApprovalEngine;
    use crate::engine::{EngineError, PlanningEngine};
    use crate::repositories::draft_line;
    use crate::{connect_with_settings, migrations};

    async fn engines() -> (PlanningEngine, ApprovalEngine) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        (
            PlanningEngine::new(pool.clone(), Arc::new(PlanLockTable::new(4)), RetryPolicy::default()),
            ApprovalEngine::new(pool),
        )
    }

    async fn draft(planning: &PlanningEngine, item_id: i64) -> LineId {
        planning
            .upsert_line(json!({
                "meta": { "bdg_year": "2025", "department_id": 10 },
                "item": { "item_id": item_id, "unit_cost": 5 },
                "periods": { "qty": { "q1": 1 } }
            }))
            .await
            .expect("upsert")
            .line_id
    }

    #[tokio::test]
    async fn slots_fill_in_order_and_stamp_the_officer() {
        let (planning, approvals) = engines().await;
        let line = draft(&planning, 1).await;
        let moment = NaiveDate::from_ymd_opt(2025, 3, 14)
            .and_then(|date| date.and_hms_opt(9, 30, 15))
            .expect("moment");

        let first = approvals.approve_at(vec![line.0], "A", moment).await.expect("first");
        assert_eq!(first.approved_level, 1);
        assert_eq!(first.new_state, ApprovalStage::FirstApproved);
        assert_eq!(first.promoted, 0);

        let mut conn = planning.pool().acquire().await.expect("acquire");
        let stored = draft_line::find(&mut conn, line).await.expect("find").expect("line");
        let signature = stored.approvals.slot(SlotPosition::First).expect("slot one filled");
        assert!(stored.approvals.slot(SlotPosition::Second).is_none());
        assert_eq!(signature.officer, "A");
        assert_eq!(signature.date_text(), "2025-03-14");
        assert_eq!(signature.time_text(), "09:30:15");
    }

    #[tokio::test]
    async fn third_slot_promotes_and_fourth_is_rejected() {
        let (planning, approvals) = engines().await;
        let lines = vec![draft(&planning, 1).await.0, draft(&planning, 2).await.0];

        for officer in ["A", "B"] {
            approvals.approve(lines.clone(), officer).await.expect("approve");
        }
        let third = approvals.approve(lines.clone(), "C").await.expect("third");
        assert_eq!(third.new_state, ApprovalStage::Committed);
        assert_eq!(third.promoted, 2);
        assert_eq!(third.message, "approval level 3 recorded and committed to the ledger");

        let error = approvals.approve(lines, "D").await.expect_err("fully approved");
        assert!(matches!(error, EngineError::Domain(DomainError::AlreadyFullyApproved)));
    }

    #[tokio::test]
    async fn rejected_batches_write_nothing() {
        let (planning, approvals) = engines().await;
        let ahead = draft(&planning, 1).await;
        let behind = draft(&planning, 2).await;
        approvals.approve(vec![ahead.0], "A").await.expect("approve");

        let error = approvals.approve(vec![ahead.0, behind.0], "B").await.expect_err("mixed");
        assert!(matches!(error, EngineError::Domain(DomainError::MixedApprovalStages { .. })));

        let error = approvals.approve(vec![behind.0, 404], "B").await.expect_err("unknown");
        assert!(matches!(
            error,
            EngineError::Domain(DomainError::LinesNotFound { ref line_ids }) if line_ids == &vec![404]
        ));

        let plan = planning
            .locate_or_create_plan(&PlanKey::new(
                BudgetYear::parse("2025").expect("year"),
                DepartmentId(10),
            ))
            .await
            .expect("plan");
        let summary = approvals.plan_approval_summary(plan.id).await.expect("summary");
        assert_eq!((summary.unapproved, summary.first_approved), (1, 1));
        assert_eq!(summary.total(), 2);
    }
}

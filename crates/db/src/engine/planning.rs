use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use sqlx::SqliteConnection;
use tracing::{info, warn};

use stockplan_core::config::EngineConfig;
use stockplan_core::domain::line::DraftKey;
use stockplan_core::domain::plan::{Plan, PlanKey};
use stockplan_core::errors::DomainError;
use stockplan_core::lock::PlanLockTable;
use stockplan_core::retry::{RetryPolicy, Retryable};
use stockplan_core::submission::{parse_submission, SubmissionEnvelope, ValidatedSubmission};
use stockplan_core::upsert::{
    plan_write_set, BatchReport, LineOutcome, UpsertMode, UpsertOutcome, KEY_COLUMNS,
};

use super::EngineError;
use crate::repositories::{draft_line, plan, unit};
use crate::DbPool;

/// Plan find-or-create and draft line upsert.
///
/// Every line runs in its own transaction. The transaction is opened before the plan
/// lock is taken and the lock guard lives until commit, so a second caller for the same
/// (year, department) always sees the first caller's committed plan row.
#[derive(Clone, Debug)]
pub struct PlanningEngine {
    pool: DbPool,
    locks: Arc<PlanLockTable>,
    retry: RetryPolicy,
}

impl PlanningEngine {
    pub fn new(pool: DbPool, locks: Arc<PlanLockTable>, retry: RetryPolicy) -> Self {
        Self { pool, locks, retry }
    }

    pub fn from_config(pool: DbPool, config: &EngineConfig) -> Self {
        Self::new(
            pool,
            Arc::new(PlanLockTable::new(config.plan_lock_shards)),
            RetryPolicy::new(config.upsert_max_attempts),
        )
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn locate_or_create_plan(&self, key: &PlanKey) -> Result<Plan, EngineError> {
        let mut tx = self.pool.begin().await?;
        let guard = self.locks.lock(key).await;
        let plan = locate_locked(&mut tx, key).await?;
        tx.commit().await?;
        drop(guard);
        Ok(plan)
    }

    /// Validates and upserts one raw line, retrying the whole step on write races.
    pub async fn upsert_line(&self, raw: Value) -> Result<UpsertOutcome, EngineError> {
        let validated = parse_submission(raw)?;
        self.upsert_validated(&validated).await
    }

    pub async fn upsert_validated(
        &self,
        validated: &ValidatedSubmission,
    ) -> Result<UpsertOutcome, EngineError> {
        let result = self
            .retry
            .run("upsert_line", |attempt| self.upsert_attempt(validated, attempt))
            .await;

        match result {
            Err(error) if error.is_retryable() => {
                warn!(
                    event_name = "engine.upsert.conflict_exhausted",
                    attempts = self.retry.max_attempts(),
                    error = %error,
                    "upsert retries exhausted"
                );
                Err(EngineError::ConflictExhausted {
                    attempts: self.retry.max_attempts(),
                    last: error.to_string(),
                })
            }
            other => other,
        }
    }

    /// Processes lines in input order. A failing line never aborts its siblings.
    pub async fn upsert_batch(&self, lines: Vec<Value>) -> BatchReport {
        let mut outcomes = Vec::with_capacity(lines.len());
        for (index, raw) in lines.into_iter().enumerate() {
            match self.upsert_line(raw).await {
                Ok(outcome) => outcomes.push(LineOutcome::success(outcome)),
                Err(error) => {
                    warn!(
                        event_name = "engine.upsert.line_failed",
                        index,
                        error = %error,
                        "batch line rejected"
                    );
                    outcomes.push(LineOutcome::failure(error.public_message()));
                }
            }
        }

        let report = BatchReport::from_outcomes(outcomes);
        info!(
            event_name = "engine.upsert.batch_completed",
            succeeded = report.succeeded,
            failed = report.failed,
            "batch upsert finished"
        );
        report
    }

    pub async fn upsert_envelope(&self, envelope: SubmissionEnvelope) -> BatchReport {
        self.upsert_batch(envelope.into_lines()).await
    }

    async fn upsert_attempt(
        &self,
        validated: &ValidatedSubmission,
        attempt: u32,
    ) -> Result<UpsertOutcome, EngineError> {
        let mut tx = self.pool.begin().await?;
        let guard = self.locks.lock(&validated.plan_key).await;

        let plan = locate_locked(&mut tx, &validated.plan_key).await?;
        let unit = unit::resolve(&mut tx, validated.unit.as_ref()).await?;
        let key = DraftKey { plan_id: plan.id, item_id: validated.item_id, unit };
        let now = Utc::now();

        let outcome = match draft_line::find_draft_by_key(&mut tx, &key).await? {
            Some(existing) => {
                let set = plan_write_set(&validated.submission, Some(&existing.values))?;
                if set.is_empty() {
                    UpsertOutcome {
                        plan_id: plan.id,
                        line_id: existing.id,
                        mode: UpsertMode::UpdateSkip,
                        unit_id: unit.id(),
                        changed_columns: Vec::new(),
                    }
                } else {
                    draft_line::update_columns(&mut tx, existing.id, &set, now).await?;
                    UpsertOutcome {
                        plan_id: plan.id,
                        line_id: existing.id,
                        mode: UpsertMode::Updated,
                        unit_id: unit.id(),
                        changed_columns: UpsertOutcome::column_names(&set.columns()),
                    }
                }
            }
            None => {
                let set = plan_write_set(&validated.submission, None)?;
                let line_id = draft_line::insert_draft(&mut tx, &key, &set, now).await?;
                let mut changed_columns: Vec<String> =
                    KEY_COLUMNS.iter().map(|column| column.to_string()).collect();
                changed_columns.extend(UpsertOutcome::column_names(&set.columns()));
                UpsertOutcome {
                    plan_id: plan.id,
                    line_id,
                    mode: UpsertMode::Inserted,
                    unit_id: unit.id(),
                    changed_columns,
                }
            }
        };

        tx.commit().await?;
        drop(guard);

        info!(
            event_name = "engine.upsert.line_applied",
            plan_id = outcome.plan_id.0,
            line_id = outcome.line_id.0,
            mode = ?outcome.mode,
            unit_resolved = unit.id().is_some(),
            changed = outcome.changed_columns.len(),
            attempt,
            "draft line upserted"
        );
        Ok(outcome)
    }
}

async fn locate_locked(conn: &mut SqliteConnection, key: &PlanKey) -> Result<Plan, EngineError> {
    let location = plan::locate_or_create(conn, key, Utc::now()).await?.ok_or_else(|| {
        DomainError::InvariantViolation(format!(
            "plan for budget year {} and department {} could be neither created nor found",
            key.budget_year.as_str(),
            key.department_id.0
        ))
    })?;

    if location.created {
        info!(
            event_name = "engine.plan.created",
            plan_id = location.plan.id.0,
            budget_year = key.budget_year.as_str(),
            department_id = key.department_id.0,
            "plan created"
        );
    }
    Ok(location.plan)
}

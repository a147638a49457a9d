//! Administrative ordering of draft lines, kept apart from approval state.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};
use tracing::warn;

use stockplan_core::domain::line::{ItemId, LineId};
use stockplan_core::domain::plan::PlanId;

use super::{placeholders, RankingRepository, RepositoryError};
use crate::DbPool;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RankedLine {
    pub line_id: LineId,
    pub plan_id: PlanId,
    pub item_id: ItemId,
    pub item_name: Option<String>,
    pub rank_position: Option<i64>,
    pub ranked_at: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankAssignment {
    pub line_id: i64,
    pub position: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RankFailure {
    pub line_id: i64,
    pub position: i64,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RankingReport {
    pub updated: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_items: Vec<RankFailure>,
}

pub struct SqlRankingRepository {
    pool: DbPool,
}

impl SqlRankingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const LIST_SQL: &str = "SELECT d.id, d.plan_id, d.item_id, d.item_name, r.rank_position, r.ranked_at
     FROM draft_line AS d
     LEFT JOIN line_rank AS r ON r.line_id = d.id";

const LIST_ORDER: &str = "ORDER BY r.rank_position IS NULL, r.rank_position ASC, d.id ASC";

fn ranked_line_from_row(row: &SqliteRow) -> Result<RankedLine, RepositoryError> {
    Ok(RankedLine {
        line_id: LineId(row.try_get("id")?),
        plan_id: PlanId(row.try_get("plan_id")?),
        item_id: ItemId(row.try_get("item_id")?),
        item_name: row.try_get("item_name")?,
        rank_position: row.try_get("rank_position")?,
        ranked_at: row.try_get("ranked_at")?,
    })
}

#[async_trait::async_trait]
impl RankingRepository for SqlRankingRepository {
    /// Ranked lines first by position, unranked lines after them.
    async fn list_ranking(
        &self,
        plan_id: Option<PlanId>,
    ) -> Result<Vec<RankedLine>, RepositoryError> {
        let rows = if let Some(plan_id) = plan_id {
            let sql = format!("{LIST_SQL} WHERE d.plan_id = ? {LIST_ORDER}");
            sqlx::query(&sql).bind(plan_id.0).fetch_all(&self.pool).await?
        } else {
            let sql = format!("{LIST_SQL} {LIST_ORDER}");
            sqlx::query(&sql).fetch_all(&self.pool).await?
        };

        rows.iter().map(ranked_line_from_row).collect()
    }

    /// Applies each assignment independently; bad items are reported, not fatal.
    async fn assign_ranks(
        &self,
        assignments: Vec<RankAssignment>,
    ) -> Result<RankingReport, RepositoryError> {
        let mut report = RankingReport::default();
        let ranked_at = Utc::now().to_rfc3339();

        for assignment in assignments {
            if assignment.line_id <= 0 || assignment.position <= 0 {
                report.failed_items.push(RankFailure {
                    line_id: assignment.line_id,
                    position: assignment.position,
                    reason: "line_id and position must be positive".to_string(),
                });
                continue;
            }

            let result = sqlx::query(
                "INSERT INTO line_rank (line_id, rank_position, ranked_at)
                 SELECT id, ?, ? FROM draft_line WHERE id = ?
                 ON CONFLICT(line_id) DO UPDATE SET
                     rank_position = excluded.rank_position,
                     ranked_at = excluded.ranked_at",
            )
            .bind(assignment.position)
            .bind(&ranked_at)
            .bind(assignment.line_id)
            .execute(&self.pool)
            .await;

            let reason = match result {
                Ok(done) if done.rows_affected() > 0 => {
                    report.updated += 1;
                    continue;
                }
                Ok(_) => "line not found",
                Err(error) => {
                    warn!(
                        event_name = "engine.ranking.assign_failed",
                        line_id = assignment.line_id,
                        error = %error,
                        "rank assignment failed"
                    );
                    "rank could not be stored"
                }
            };
            report.failed_items.push(RankFailure {
                line_id: assignment.line_id,
                position: assignment.position,
                reason: reason.to_string(),
            });
        }

        report.failed = report.failed_items.len();
        Ok(report)
    }

    async fn reset_ranks(&self, line_ids: &[LineId]) -> Result<u64, RepositoryError> {
        if line_ids.is_empty() {
            return Ok(0);
        }

        let sql =
            format!("DELETE FROM line_rank WHERE line_id IN ({})", placeholders(line_ids.len()));
        let mut query = sqlx::query(&sql);
        for id in line_ids {
            query = query.bind(id.0);
        }

        Ok(query.execute(&self.pool).await?.rows_affected())
    }

    async fn reset_all_ranks(&self) -> Result<u64, RepositoryError> {
        Ok(sqlx::query("DELETE FROM line_rank").execute(&self.pool).await?.rows_affected())
    }
}

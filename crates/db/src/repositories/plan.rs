use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use stockplan_core::domain::plan::{BudgetYear, DepartmentId, Plan, PlanId, PlanKey};

use super::RepositoryError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanLocation {
    pub plan: Plan,
    pub created: bool,
}

/// Conditional insert followed by a select of the (possibly pre-existing) row.
///
/// Callers serialize on the plan lock and run this inside their transaction, so the
/// select always observes either our insert or the committed row of an earlier caller.
/// `None` means neither produced a row.
pub async fn locate_or_create(
    conn: &mut SqliteConnection,
    key: &PlanKey,
    now: DateTime<Utc>,
) -> Result<Option<PlanLocation>, RepositoryError> {
    let inserted = sqlx::query(
        "INSERT INTO plan (budget_year, department_id, created_at)
         SELECT ?, ?, ?
         WHERE NOT EXISTS (
             SELECT 1 FROM plan WHERE budget_year = ? AND department_id = ?
         )",
    )
    .bind(key.budget_year.as_str())
    .bind(key.department_id.0)
    .bind(now.to_rfc3339())
    .bind(key.budget_year.as_str())
    .bind(key.department_id.0)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    let plan = find_by_key(conn, key).await?;
    Ok(plan.map(|plan| PlanLocation { plan, created: inserted > 0 }))
}

pub async fn find_by_key(
    conn: &mut SqliteConnection,
    key: &PlanKey,
) -> Result<Option<Plan>, RepositoryError> {
    let row = sqlx::query(
        "SELECT id, budget_year, department_id, created_at
         FROM plan WHERE budget_year = ? AND department_id = ?",
    )
    .bind(key.budget_year.as_str())
    .bind(key.department_id.0)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(plan_from_row).transpose()
}

pub async fn find(conn: &mut SqliteConnection, id: PlanId) -> Result<Option<Plan>, RepositoryError> {
    let row = sqlx::query("SELECT id, budget_year, department_id, created_at FROM plan WHERE id = ?")
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(plan_from_row).transpose()
}

pub async fn count_for_key(
    conn: &mut SqliteConnection,
    key: &PlanKey,
) -> Result<i64, RepositoryError> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM plan WHERE budget_year = ? AND department_id = ?",
    )
    .bind(key.budget_year.as_str())
    .bind(key.department_id.0)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

fn plan_from_row(row: &SqliteRow) -> Result<Plan, RepositoryError> {
    let budget_year: String = row.try_get("budget_year")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Plan {
        id: PlanId(row.try_get("id")?),
        budget_year: BudgetYear::parse(&budget_year)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?,
        department_id: DepartmentId(row.try_get("department_id")?),
        created_at: parse_timestamp(&created_at)?,
    })
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {error}")))
}

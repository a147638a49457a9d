use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use stockplan_core::domain::approval::{ApprovalSignature, ApprovalSlots, SlotPosition};
use stockplan_core::domain::line::{
    ColumnValue, DraftKey, DraftLine, ItemId, LineColumn, LineId, LineStatus, LineValues,
    WriteSet,
};
use stockplan_core::domain::plan::PlanId;
use stockplan_core::domain::unit::{ResolvedUnit, UnitId};

use super::plan::parse_timestamp;
use super::{placeholders, RepositoryError};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

fn select_sql(filter: &str) -> String {
    format!(
        "SELECT id, plan_id, item_id, unit_id, status, {},
                approver_1, approved_date_1, approved_time_1,
                approver_2, approved_date_2, approved_time_2,
                approver_3, approved_date_3, approved_time_3,
                created_at, updated_at
         FROM draft_line
         WHERE {filter}",
        LineColumn::sql_list()
    )
}

/// Open draft for the upsert key, if any. An unresolved unit matches stored NULLs.
pub async fn find_draft_by_key(
    conn: &mut SqliteConnection,
    key: &DraftKey,
) -> Result<Option<DraftLine>, RepositoryError> {
    let sql = select_sql(
        "plan_id = ? AND item_id = ? AND COALESCE(unit_id, 0) = ? AND status = 'draft'
         ORDER BY id ASC LIMIT 1",
    );
    let row = sqlx::query(&sql)
        .bind(key.plan_id.0)
        .bind(key.item_id.0)
        .bind(key.unit.key_value())
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(draft_line_from_row).transpose()
}

pub async fn find(
    conn: &mut SqliteConnection,
    id: LineId,
) -> Result<Option<DraftLine>, RepositoryError> {
    let sql = select_sql("id = ?");
    let row = sqlx::query(&sql).bind(id.0).fetch_optional(&mut *conn).await?;
    row.as_ref().map(draft_line_from_row).transpose()
}

/// Loads the given lines in id order. Ids with no row are simply absent from the result.
pub async fn fetch_lines(
    conn: &mut SqliteConnection,
    ids: &[LineId],
) -> Result<Vec<DraftLine>, RepositoryError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = select_sql(&format!("id IN ({}) ORDER BY id ASC", placeholders(ids.len())));
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id.0);
    }
    let rows = query.fetch_all(&mut *conn).await?;

    rows.iter().map(draft_line_from_row).collect()
}

pub async fn list_for_plan(
    conn: &mut SqliteConnection,
    plan_id: PlanId,
) -> Result<Vec<DraftLine>, RepositoryError> {
    let sql = select_sql("plan_id = ? ORDER BY id ASC");
    let rows = sqlx::query(&sql).bind(plan_id.0).fetch_all(&mut *conn).await?;
    rows.iter().map(draft_line_from_row).collect()
}

/// Inserts a new draft row with the key columns plus every column in the write set.
pub async fn insert_draft(
    conn: &mut SqliteConnection,
    key: &DraftKey,
    set: &WriteSet,
    now: DateTime<Utc>,
) -> Result<LineId, RepositoryError> {
    let mut columns = vec!["plan_id", "item_id", "unit_id", "status", "created_at", "updated_at"];
    columns.extend(set.iter().map(|(column, _)| column.as_str()));

    let sql = format!(
        "INSERT INTO draft_line ({}) VALUES ({})",
        columns.join(", "),
        placeholders(columns.len())
    );

    let timestamp = now.to_rfc3339();
    let mut query = sqlx::query(&sql)
        .bind(key.plan_id.0)
        .bind(key.item_id.0)
        .bind(key.unit.id())
        .bind(LineStatus::Draft.as_str())
        .bind(timestamp.clone())
        .bind(timestamp);
    for (_, value) in set.iter() {
        query = query.bind(value.to_storage());
    }

    let id = query.execute(&mut *conn).await?.last_insert_rowid();
    Ok(LineId(id))
}

/// Overwrites exactly the columns in the write set on a line that is still a draft.
pub async fn update_columns(
    conn: &mut SqliteConnection,
    id: LineId,
    set: &WriteSet,
    now: DateTime<Utc>,
) -> Result<u64, RepositoryError> {
    if set.is_empty() {
        return Ok(0);
    }

    let assignments: Vec<String> =
        set.iter().map(|(column, _)| format!("{} = ?", column.as_str())).collect();
    let sql = format!(
        "UPDATE draft_line SET {}, updated_at = ? WHERE id = ? AND status = 'draft'",
        assignments.join(", ")
    );

    let mut query = sqlx::query(&sql);
    for (_, value) in set.iter() {
        query = query.bind(value.to_storage());
    }
    let result = query.bind(now.to_rfc3339()).bind(id.0).execute(&mut *conn).await?;

    Ok(result.rows_affected())
}

/// Compare-and-set fill of one approval slot across the given draft lines.
///
/// Only lines still in draft whose target slot is empty and whose previous slot is
/// filled are touched; the caller compares the affected count with the batch size.
pub async fn fill_slot(
    conn: &mut SqliteConnection,
    ids: &[LineId],
    slot: SlotPosition,
    signature: &ApprovalSignature,
    now: DateTime<Utc>,
) -> Result<u64, RepositoryError> {
    if ids.is_empty() {
        return Ok(0);
    }

    let previous_filled = match slot {
        SlotPosition::First => String::new(),
        SlotPosition::Second => {
            format!(" AND {} IS NOT NULL", SlotPosition::First.approver_column())
        }
        SlotPosition::Third => {
            format!(" AND {} IS NOT NULL", SlotPosition::Second.approver_column())
        }
    };
    let sql = format!(
        "UPDATE draft_line
         SET {approver} = ?, {date} = ?, {time} = ?, updated_at = ?
         WHERE id IN ({ids}) AND status = 'draft' AND {approver} IS NULL{previous_filled}",
        approver = slot.approver_column(),
        date = slot.date_column(),
        time = slot.time_column(),
        ids = placeholders(ids.len()),
    );

    let mut query = sqlx::query(&sql)
        .bind(&signature.officer)
        .bind(signature.date_text())
        .bind(signature.time_text())
        .bind(now.to_rfc3339());
    for id in ids {
        query = query.bind(id.0);
    }

    Ok(query.execute(&mut *conn).await?.rows_affected())
}

pub async fn mark_committed(
    conn: &mut SqliteConnection,
    ids: &[LineId],
    now: DateTime<Utc>,
) -> Result<u64, RepositoryError> {
    if ids.is_empty() {
        return Ok(0);
    }

    let sql = format!(
        "UPDATE draft_line SET status = 'committed', updated_at = ?
         WHERE id IN ({}) AND status = 'draft'",
        placeholders(ids.len())
    );
    let mut query = sqlx::query(&sql).bind(now.to_rfc3339());
    for id in ids {
        query = query.bind(id.0);
    }

    Ok(query.execute(&mut *conn).await?.rows_affected())
}

pub async fn count_drafts_for_key(
    conn: &mut SqliteConnection,
    key: &DraftKey,
) -> Result<i64, RepositoryError> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM draft_line
         WHERE plan_id = ? AND item_id = ? AND COALESCE(unit_id, 0) = ? AND status = 'draft'",
    )
    .bind(key.plan_id.0)
    .bind(key.item_id.0)
    .bind(key.unit.key_value())
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

/// Line counts of one plan by approval stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApprovalSummary {
    pub plan_id: PlanId,
    pub unapproved: i64,
    pub first_approved: i64,
    pub second_approved: i64,
    pub committed: i64,
}

impl ApprovalSummary {
    pub fn total(&self) -> i64 {
        self.unapproved + self.first_approved + self.second_approved + self.committed
    }
}

pub async fn approval_summary(
    conn: &mut SqliteConnection,
    plan_id: PlanId,
) -> Result<ApprovalSummary, RepositoryError> {
    let row = sqlx::query(
        "SELECT
            COALESCE(SUM(CASE WHEN status = 'draft' AND approver_1 IS NULL
                              THEN 1 ELSE 0 END), 0) AS unapproved,
            COALESCE(SUM(CASE WHEN status = 'draft' AND approver_1 IS NOT NULL
                                   AND approver_2 IS NULL
                              THEN 1 ELSE 0 END), 0) AS first_approved,
            COALESCE(SUM(CASE WHEN status = 'draft' AND approver_2 IS NOT NULL
                              THEN 1 ELSE 0 END), 0) AS second_approved,
            COALESCE(SUM(CASE WHEN status = 'committed' THEN 1 ELSE 0 END), 0) AS committed
         FROM draft_line
         WHERE plan_id = ?",
    )
    .bind(plan_id.0)
    .fetch_one(&mut *conn)
    .await?;

    Ok(ApprovalSummary {
        plan_id,
        unapproved: row.try_get("unapproved")?,
        first_approved: row.try_get("first_approved")?,
        second_approved: row.try_get("second_approved")?,
        committed: row.try_get("committed")?,
    })
}

pub(crate) fn line_values_from_row(row: &SqliteRow) -> Result<LineValues, RepositoryError> {
    let mut values = LineValues::default();
    for column in LineColumn::ALL {
        let raw: Option<String> = row.try_get(column.as_str())?;
        if let Some(raw) = raw {
            let value =
                ColumnValue::from_storage(column, &raw).map_err(RepositoryError::Decode)?;
            values.insert(column, value);
        }
    }
    Ok(values)
}

fn signature_from_row(
    row: &SqliteRow,
    slot: SlotPosition,
) -> Result<Option<ApprovalSignature>, RepositoryError> {
    let officer: Option<String> = row.try_get(slot.approver_column())?;
    let Some(officer) = officer else {
        return Ok(None);
    };

    let date: Option<String> = row.try_get(slot.date_column())?;
    let time: Option<String> = row.try_get(slot.time_column())?;
    let (Some(date), Some(time)) = (date, time) else {
        return Err(RepositoryError::Decode(format!(
            "approval slot {} has an approver but no date or time",
            slot.number()
        )));
    };

    let date = NaiveDate::parse_from_str(&date, DATE_FORMAT)
        .map_err(|error| RepositoryError::Decode(format!("invalid approval date `{date}`: {error}")))?;
    let time = NaiveTime::parse_from_str(&time, TIME_FORMAT)
        .map_err(|error| RepositoryError::Decode(format!("invalid approval time `{time}`: {error}")))?;

    Ok(Some(ApprovalSignature { officer, date, time }))
}

fn draft_line_from_row(row: &SqliteRow) -> Result<DraftLine, RepositoryError> {
    let status: String = row.try_get("status")?;
    let status = LineStatus::parse(&status)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown line status `{status}`")))?;
    let unit_id: Option<i64> = row.try_get("unit_id")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    let approvals = ApprovalSlots::from_parts([
        signature_from_row(row, SlotPosition::First)?,
        signature_from_row(row, SlotPosition::Second)?,
        signature_from_row(row, SlotPosition::Third)?,
    ])
    .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(DraftLine {
        id: LineId(row.try_get("id")?),
        plan_id: PlanId(row.try_get("plan_id")?),
        item_id: ItemId(row.try_get("item_id")?),
        unit: ResolvedUnit(unit_id.map(UnitId)),
        status,
        values: line_values_from_row(row)?,
        approvals,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

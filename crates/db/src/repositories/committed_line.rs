use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use stockplan_core::domain::line::{CommittedLine, CommittedLineId, ItemId, LineColumn, LineId};
use stockplan_core::domain::plan::PlanId;
use stockplan_core::domain::unit::{ResolvedUnit, UnitId};

use super::draft_line::line_values_from_row;
use super::plan::parse_timestamp;
use super::RepositoryError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromotionResult {
    Promoted(CommittedLineId),
    AlreadyCommitted,
}

/// Copies a draft line's full column set into the ledger unless the (plan, item) pair
/// is already there. Replaying a promotion is therefore a no-op.
pub async fn promote(
    conn: &mut SqliteConnection,
    source: LineId,
    now: DateTime<Utc>,
) -> Result<PromotionResult, RepositoryError> {
    let columns = LineColumn::sql_list();
    let sql = format!(
        "INSERT INTO committed_line (plan_id, item_id, unit_id, source_line_id, {columns}, committed_at)
         SELECT d.plan_id, d.item_id, d.unit_id, d.id, {columns}, ?
         FROM draft_line AS d
         WHERE d.id = ?
           AND NOT EXISTS (
               SELECT 1 FROM committed_line AS c
               WHERE c.plan_id = d.plan_id AND c.item_id = d.item_id
           )"
    );

    let result =
        sqlx::query(&sql).bind(now.to_rfc3339()).bind(source.0).execute(&mut *conn).await?;

    if result.rows_affected() == 0 {
        Ok(PromotionResult::AlreadyCommitted)
    } else {
        Ok(PromotionResult::Promoted(CommittedLineId(result.last_insert_rowid())))
    }
}

fn select_sql(filter: &str) -> String {
    format!(
        "SELECT id, plan_id, item_id, unit_id, source_line_id, {}, committed_at
         FROM committed_line
         WHERE {filter}",
        LineColumn::sql_list()
    )
}

pub async fn find_by_plan_item(
    conn: &mut SqliteConnection,
    plan_id: PlanId,
    item_id: ItemId,
) -> Result<Option<CommittedLine>, RepositoryError> {
    let sql = select_sql("plan_id = ? AND item_id = ?");
    let row = sqlx::query(&sql)
        .bind(plan_id.0)
        .bind(item_id.0)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(committed_line_from_row).transpose()
}

pub async fn list_for_plan(
    conn: &mut SqliteConnection,
    plan_id: PlanId,
) -> Result<Vec<CommittedLine>, RepositoryError> {
    let sql = select_sql("plan_id = ? ORDER BY id ASC");
    let rows = sqlx::query(&sql).bind(plan_id.0).fetch_all(&mut *conn).await?;
    rows.iter().map(committed_line_from_row).collect()
}

pub async fn count_for_plan_item(
    conn: &mut SqliteConnection,
    plan_id: PlanId,
    item_id: ItemId,
) -> Result<i64, RepositoryError> {
    let count =
        sqlx::query_scalar("SELECT COUNT(*) FROM committed_line WHERE plan_id = ? AND item_id = ?")
            .bind(plan_id.0)
            .bind(item_id.0)
            .fetch_one(&mut *conn)
            .await?;
    Ok(count)
}

fn committed_line_from_row(row: &SqliteRow) -> Result<CommittedLine, RepositoryError> {
    let unit_id: Option<i64> = row.try_get("unit_id")?;
    let committed_at: String = row.try_get("committed_at")?;

    Ok(CommittedLine {
        id: CommittedLineId(row.try_get("id")?),
        plan_id: PlanId(row.try_get("plan_id")?),
        item_id: ItemId(row.try_get("item_id")?),
        unit: ResolvedUnit(unit_id.map(UnitId)),
        source_line_id: LineId(row.try_get("source_line_id")?),
        values: line_values_from_row(row)?,
        committed_at: parse_timestamp(&committed_at)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use stockplan_core::domain::field::Field;
    use stockplan_core::domain::line::{
        ColumnKind, ColumnValue, DraftKey, ItemId, LineColumn, LineId, WriteSet,
    };
    use stockplan_core::domain::plan::{BudgetYear, DepartmentId, PlanKey};
    use stockplan_core::domain::unit::{ResolvedUnit, UnitId};

    use super::{count_for_plan_item, find_by_plan_item, list_for_plan, promote, PromotionResult};
    use crate::repositories::draft_line::insert_draft;
    use crate::repositories::plan::locate_or_create;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn promotion_copies_columns_once_per_plan_item() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let mut conn = pool.acquire().await.expect("acquire");

        let plan_key = PlanKey::new(BudgetYear::parse("2025").expect("year"), DepartmentId(10));
        let plan = locate_or_create(&mut conn, &plan_key, Utc::now())
            .await
            .expect("plan")
            .expect("row")
            .plan;

        let mut set = WriteSet::default();
        set.push_decimal(LineColumn::TotalQty, &Field::Value(Decimal::new(15, 0)));
        set.push_decimal(LineColumn::Trend1YrB1, &Field::Value(Decimal::new(-125, 2)));
        set.push_text(LineColumn::ManualCalc, &Field::Value("Y".to_string()));
        let key =
            DraftKey { plan_id: plan.id, item_id: ItemId(500), unit: ResolvedUnit(Some(UnitId(1))) };
        let line = insert_draft(&mut conn, &key, &set, Utc::now()).await.expect("insert");

        let first = promote(&mut conn, line, Utc::now()).await.expect("promote");
        assert!(matches!(first, PromotionResult::Promoted(_)));
        let replay = promote(&mut conn, line, Utc::now()).await.expect("replay");
        assert_eq!(replay, PromotionResult::AlreadyCommitted);

        let committed = find_by_plan_item(&mut conn, plan.id, ItemId(500))
            .await
            .expect("find")
            .expect("committed line");
        assert_eq!(committed.source_line_id, line);
        assert_eq!(committed.unit, ResolvedUnit(Some(UnitId(1))));
        assert_eq!(committed.values.decimal(LineColumn::TotalQty), Some(Decimal::new(15, 0)));
        assert_eq!(committed.values.decimal(LineColumn::Trend1YrB1), Some(Decimal::new(-125, 2)));
        assert_eq!(committed.values.text(LineColumn::ManualCalc), Some("Y"));

        assert_eq!(count_for_plan_item(&mut conn, plan.id, ItemId(500)).await.expect("count"), 1);
        assert_eq!(list_for_plan(&mut conn, plan.id).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn promotion_keeps_every_forecast_and_package_column() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let mut conn = pool.acquire().await.expect("acquire");

        let plan_key = PlanKey::new(BudgetYear::parse("2025").expect("year"), DepartmentId(11));
        let plan = locate_or_create(&mut conn, &plan_key, Utc::now())
            .await
            .expect("plan")
            .expect("row")
            .plan;

        let mut set = WriteSet::default();
        for (position, column) in LineColumn::ALL.into_iter().enumerate() {
            let value = match column.kind() {
                ColumnKind::Decimal => ColumnValue::Decimal(Decimal::new(position as i64 + 1, 1)),
                ColumnKind::Text => ColumnValue::Text(format!("{}-{position}", column.as_str())),
            };
            set.set(column, value);
        }
        let key = DraftKey { plan_id: plan.id, item_id: ItemId(77), unit: ResolvedUnit(None) };
        let line = insert_draft(&mut conn, &key, &set, Utc::now()).await.expect("insert");
        promote(&mut conn, line, Utc::now()).await.expect("promote");

        let committed = find_by_plan_item(&mut conn, plan.id, ItemId(77))
            .await
            .expect("find")
            .expect("committed line");
        assert_eq!(committed.values.len(), LineColumn::ALL.len());
        for (column, value) in set.iter() {
            assert_eq!(committed.values.get(*column), Some(value), "{}", column.as_str());
        }
        assert_eq!(
            committed.values.decimal(LineColumn::PackagePeriod4Qty),
            set.decimal(LineColumn::PackagePeriod4Qty)
        );
    }

    #[tokio::test]
    async fn promoting_a_missing_line_writes_nothing() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let mut conn = pool.acquire().await.expect("acquire");

        let result = promote(&mut conn, LineId(42), Utc::now()).await.expect("promote");
        assert_eq!(result, PromotionResult::AlreadyCommitted);
    }
}

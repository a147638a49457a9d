use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::line::{ColumnValue, LineColumn, LineId, LineValues, WriteSet};
use crate::domain::plan::PlanId;
use crate::errors::DomainError;
use crate::submission::LineSubmission;

/// Key columns reported alongside the write set when a new draft row is inserted.
pub const KEY_COLUMNS: [&str; 3] = ["plan_id", "item_id", "unit_id"];

/// Final write set for one submission against the currently stored draft, if any.
///
/// Explicit values always win. Derived figures fill the gaps:
/// - a period amount missing from the payload is `qty * unit_cost` when that period's
///   quantity was submitted and a unit cost is known (submitted or stored);
/// - `total_qty` / `total_amount` are re-summed when any period of that kind is written
///   and no explicit total was sent. Periods that are absent both here and in storage are
///   skipped, not treated as zero.
///
/// A derived figure that does not fit a `Decimal` fails the whole line with a validation
/// error rather than storing a truncated value.
pub fn plan_write_set(
    submission: &LineSubmission,
    existing: Option<&LineValues>,
) -> Result<WriteSet, DomainError> {
    let mut set = submission.explicit_write_set();

    let stored = |column: LineColumn| existing.and_then(|values| values.decimal(column));
    let unit_cost = set.decimal(LineColumn::UnitCost).or_else(|| stored(LineColumn::UnitCost));

    if let Some(unit_cost) = unit_cost {
        for (qty_column, amount_column) in
            LineColumn::PERIOD_QTY.into_iter().zip(LineColumn::PERIOD_AMOUNT)
        {
            if set.contains(amount_column) {
                continue;
            }
            if let Some(qty) = set.decimal(qty_column) {
                let amount = qty
                    .checked_mul(unit_cost)
                    .ok_or_else(|| overflow(amount_column))?;
                set.set(amount_column, ColumnValue::Decimal(amount));
            }
        }
    }

    derive_total(&mut set, &LineColumn::PERIOD_QTY, LineColumn::TotalQty, existing)?;
    derive_total(&mut set, &LineColumn::PERIOD_AMOUNT, LineColumn::TotalAmount, existing)?;

    Ok(set)
}

fn overflow(column: LineColumn) -> DomainError {
    DomainError::Validation(format!("derived {} is out of range", column.as_str()))
}

fn derive_total(
    set: &mut WriteSet,
    periods: &[LineColumn; 4],
    total_column: LineColumn,
    existing: Option<&LineValues>,
) -> Result<(), DomainError> {
    if set.contains(total_column) || !periods.iter().any(|column| set.contains(*column)) {
        return Ok(());
    }

    let mut total: Option<Decimal> = None;
    for value in periods.iter().filter_map(|column| {
        set.decimal(*column).or_else(|| existing.and_then(|values| values.decimal(*column)))
    }) {
        let sum = total
            .unwrap_or(Decimal::ZERO)
            .checked_add(value)
            .ok_or_else(|| overflow(total_column))?;
        total = Some(sum);
    }

    if let Some(total) = total {
        set.set(total_column, ColumnValue::Decimal(total));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpsertMode {
    Inserted,
    Updated,
    UpdateSkip,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UpsertOutcome {
    pub plan_id: PlanId,
    pub line_id: LineId,
    pub mode: UpsertMode,
    pub unit_id: Option<i64>,
    pub changed_columns: Vec<String>,
}

impl UpsertOutcome {
    pub fn column_names(columns: &[LineColumn]) -> Vec<String> {
        columns.iter().map(|column| column.as_str().to_string()).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LineOutcome {
    Success { success: bool, data: UpsertOutcome },
    Failure { success: bool, error: String },
}

impl LineOutcome {
    pub fn success(data: UpsertOutcome) -> Self {
        Self::Success { success: true, data }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure { success: false, error: error.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LineResult {
    pub index: usize,
    #[serde(flatten)]
    pub outcome: LineOutcome,
}

/// Per-line outcomes of a batch in input order, plus the aggregate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub success: bool,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<LineResult>,
}

impl BatchReport {
    pub fn from_outcomes(outcomes: Vec<LineOutcome>) -> Self {
        let results: Vec<LineResult> = outcomes
            .into_iter()
            .enumerate()
            .map(|(index, outcome)| LineResult { index, outcome })
            .collect();
        let succeeded = results.iter().filter(|result| result.outcome.is_success()).count();
        let failed = results.len() - succeeded;
        Self { success: failed == 0, succeeded, failed, results }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{plan_write_set, BatchReport, LineOutcome, UpsertMode, UpsertOutcome};
    use crate::domain::line::{ColumnValue, LineColumn, LineId, LineValues};
    use crate::domain::plan::PlanId;
    use crate::submission::LineSubmission;

    fn submission(value: serde_json::Value) -> LineSubmission {
        serde_json::from_value(value).expect("submission should deserialize")
    }

    fn dec(value: i64) -> Decimal {
        Decimal::new(value, 0)
    }

    #[test]
    fn totals_skip_absent_periods() {
        let set = plan_write_set(
            &submission(json!({
                "item": { "unit_cost": 100 },
                "periods": { "qty": { "q1": 10, "q2": 5 } }
            })),
            None,
        )
        .expect("write set");

        assert_eq!(set.decimal(LineColumn::TotalQty), Some(dec(15)));
        assert_eq!(set.decimal(LineColumn::Period1Amount), Some(dec(1000)));
        assert_eq!(set.decimal(LineColumn::Period2Amount), Some(dec(500)));
        assert!(!set.contains(LineColumn::Period3Amount));
        assert_eq!(set.decimal(LineColumn::TotalAmount), Some(dec(1500)));
    }

    #[test]
    fn explicit_totals_and_amounts_win() {
        let set = plan_write_set(
            &submission(json!({
                "item": { "unit_cost": 100 },
                "periods": {
                    "qty": { "q1": 10, "total": 99 },
                    "amount": { "q1": 7 }
                }
            })),
            None,
        )
        .expect("write set");

        assert_eq!(set.decimal(LineColumn::TotalQty), Some(dec(99)));
        assert_eq!(set.decimal(LineColumn::Period1Amount), Some(dec(7)));
        assert_eq!(set.decimal(LineColumn::TotalAmount), Some(dec(7)));
    }

    #[test]
    fn update_totals_merge_stored_periods() {
        let mut stored = LineValues::default();
        stored.insert(LineColumn::Period1Qty, ColumnValue::Decimal(dec(10)));
        stored.insert(LineColumn::Period2Qty, ColumnValue::Decimal(dec(5)));
        stored.insert(LineColumn::UnitCost, ColumnValue::Decimal(dec(2)));

        let set = plan_write_set(
            &submission(json!({ "periods": { "qty": { "q2": 8, "q4": 1 } } })),
            Some(&stored),
        )
        .expect("write set");

        assert_eq!(set.decimal(LineColumn::TotalQty), Some(dec(19)));
        assert_eq!(set.decimal(LineColumn::Period2Amount), Some(dec(16)));
        assert_eq!(set.decimal(LineColumn::Period4Amount), Some(dec(2)));
        assert_eq!(set.decimal(LineColumn::TotalAmount), Some(dec(18)));
    }

    #[test]
    fn nothing_is_derived_without_period_input() {
        let set = plan_write_set(&submission(json!({ "item": { "unit_cost": 100 } })), None)
            .expect("write set");
        assert_eq!(set.columns(), vec![LineColumn::UnitCost]);
    }

    #[test]
    fn oversized_derived_amount_is_a_validation_error() {
        let error = plan_write_set(
            &submission(json!({
                "item": { "unit_cost": "10000" },
                "periods": { "qty": { "q1": "10000000000000000000000000" } }
            })),
            None,
        )
        .expect_err("amount overflows");

        assert!(error.is_validation());
        assert!(error.to_string().contains("period1_amount"));
    }

    #[test]
    fn oversized_total_is_a_validation_error() {
        let mut stored = LineValues::default();
        stored.insert(LineColumn::Period1Qty, ColumnValue::Decimal(Decimal::MAX));

        let error = plan_write_set(
            &submission(json!({ "periods": { "qty": { "q2": 1 } } })),
            Some(&stored),
        )
        .expect_err("total overflows");

        assert!(error.to_string().contains("total_qty"));
    }

    #[test]
    fn batch_report_preserves_order_and_counts() {
        let ok = |id| {
            LineOutcome::success(UpsertOutcome {
                plan_id: PlanId(1),
                line_id: LineId(id),
                mode: UpsertMode::Inserted,
                unit_id: None,
                changed_columns: Vec::new(),
            })
        };
        let report = BatchReport::from_outcomes(vec![
            ok(1),
            LineOutcome::failure("item_id is required"),
            ok(2),
        ]);

        assert!(!report.success);
        assert_eq!((report.succeeded, report.failed), (2, 1));
        assert_eq!(
            report.results.iter().map(|result| result.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(!report.results[1].outcome.is_success());

        let encoded = serde_json::to_value(&report).expect("serialize");
        assert_eq!(encoded["results"][1]["error"], "item_id is required");
        assert_eq!(encoded["results"][0]["data"]["mode"], "inserted");
    }

    #[test]
    fn update_skip_serializes_with_kebab_case() {
        assert_eq!(
            serde_json::to_value(UpsertMode::UpdateSkip).expect("serialize"),
            json!("update-skip")
        );
    }
}

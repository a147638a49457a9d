//! Inbound budget-line payloads as produced by the spreadsheet importer and entry forms.
//!
//! Every column is a [`Field`], so the write set can tell "not sent" and "sent empty"
//! apart from a real value. Numeric input is coerced leniently: anything that is not a
//! number becomes null, never zero.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::domain::field::Field;
use crate::domain::line::{InputType, ItemId, LineColumn, WriteSet};
use crate::domain::plan::{BudgetYear, DepartmentId, PlanKey};
use crate::domain::unit::{deserialize_unit_ref, UnitRef};
use crate::errors::DomainError;

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LineSubmission {
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: SubmissionMeta,
    #[serde(default, deserialize_with = "null_as_default")]
    pub item: SubmissionItem,
    #[serde(default, deserialize_with = "null_as_default")]
    pub periods: SubmissionPeriods,
    #[serde(default, deserialize_with = "null_as_default")]
    pub history: SubmissionHistory,
    #[serde(default)]
    pub current_qty: Field<Decimal>,
    #[serde(default)]
    pub input_type: Field<InputType>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub forecast: ForecastFigures,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SubmissionMeta {
    #[serde(default, alias = "bdg_year")]
    pub budget_year: Field<String>,
    #[serde(default)]
    pub department_id: Field<i64>,
    #[serde(default)]
    pub as_of_date: Field<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SubmissionItem {
    #[serde(default)]
    pub item_id: Field<i64>,
    #[serde(default, alias = "stock_item_unit_id", deserialize_with = "deserialize_unit_ref")]
    pub unit: Option<UnitRef>,
    #[serde(default)]
    pub unit_qty: Field<Decimal>,
    #[serde(default)]
    pub unit_cost: Field<Decimal>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub basic: ItemMetadata,
}

/// Item master attributes copied onto the line for reporting.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ItemMetadata {
    #[serde(default)]
    pub item_name: Field<String>,
    #[serde(default)]
    pub item_unit: Field<String>,
    #[serde(default)]
    pub item_type_name: Field<String>,
    #[serde(default)]
    pub stock_class_name: Field<String>,
    #[serde(default)]
    pub stock_sub_class_name: Field<String>,
    #[serde(default)]
    pub stock_item_ed_type_name: Field<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PeriodFigures {
    #[serde(default)]
    pub q1: Field<Decimal>,
    #[serde(default)]
    pub q2: Field<Decimal>,
    #[serde(default)]
    pub q3: Field<Decimal>,
    #[serde(default)]
    pub q4: Field<Decimal>,
    #[serde(default)]
    pub total: Field<Decimal>,
}

impl PeriodFigures {
    pub fn quarters(&self) -> [&Field<Decimal>; 4] {
        [&self.q1, &self.q2, &self.q3, &self.q4]
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SubmissionPeriods {
    #[serde(default, deserialize_with = "null_as_default")]
    pub qty: PeriodFigures,
    #[serde(default, deserialize_with = "null_as_default")]
    pub amount: PeriodFigures,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SubmissionHistory {
    #[serde(default)]
    pub last_1_year_qty: Field<Decimal>,
    #[serde(default)]
    pub last_2_year_qty: Field<Decimal>,
    #[serde(default)]
    pub last_3_year_qty: Field<Decimal>,
}

/// Forecast and package-level figures computed upstream; stored and promoted verbatim.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ForecastFigures {
    #[serde(default)]
    pub inc_percent: Field<Decimal>,
    #[serde(default)]
    pub year_qty: Field<Decimal>,
    #[serde(default, alias = "forcast_qty")]
    pub forecast_qty: Field<Decimal>,
    #[serde(default)]
    pub incoming_balance_qty: Field<Decimal>,
    #[serde(default)]
    pub period1_po_qty: Field<Decimal>,
    #[serde(default)]
    pub period2_po_qty: Field<Decimal>,
    #[serde(default)]
    pub period3_po_qty: Field<Decimal>,
    #[serde(default)]
    pub period4_po_qty: Field<Decimal>,
    #[serde(default)]
    pub period1_po_amount: Field<Decimal>,
    #[serde(default)]
    pub period2_po_amount: Field<Decimal>,
    #[serde(default)]
    pub period3_po_amount: Field<Decimal>,
    #[serde(default)]
    pub period4_po_amount: Field<Decimal>,
    #[serde(default)]
    pub total_po_qty: Field<Decimal>,
    #[serde(default)]
    pub total_po_amount: Field<Decimal>,
    #[serde(default)]
    pub trend_1_yr_b0: Field<Decimal>,
    #[serde(default)]
    pub trend_1_yr_b1: Field<Decimal>,
    #[serde(default)]
    pub trend_3_yr_b0: Field<Decimal>,
    #[serde(default)]
    pub trend_3_yr_b1: Field<Decimal>,
    #[serde(default)]
    pub trend_1_yr_r2: Field<Decimal>,
    #[serde(default)]
    pub trend_1_yr_point: Field<Decimal>,
    #[serde(default)]
    pub trend_1_yr_rsd: Field<Decimal>,
    #[serde(default)]
    pub trend_1_yr_mean: Field<Decimal>,
    #[serde(default)]
    pub trend_1_yr_sd: Field<Decimal>,
    #[serde(default)]
    pub package_unit_cost: Field<Decimal>,
    #[serde(default)]
    pub package_current_qty: Field<Decimal>,
    #[serde(default)]
    pub package_total_qty: Field<Decimal>,
    #[serde(default)]
    pub package_total_amount: Field<Decimal>,
    #[serde(default)]
    pub package_incoming_balance_qty: Field<Decimal>,
    #[serde(default)]
    pub package_period1_qty: Field<Decimal>,
    #[serde(default)]
    pub package_period2_qty: Field<Decimal>,
    #[serde(default)]
    pub package_period3_qty: Field<Decimal>,
    #[serde(default)]
    pub package_period4_qty: Field<Decimal>,
    #[serde(default)]
    pub manual_calc: Field<String>,
}

impl LineSubmission {
    /// Columns the caller explicitly supplied with a usable value. Key columns are not included.
    pub fn explicit_write_set(&self) -> WriteSet {
        let mut set = WriteSet::default();

        let basic = &self.item.basic;
        set.push_text(LineColumn::ItemName, &basic.item_name);
        set.push_text(LineColumn::ItemUnit, &basic.item_unit);
        set.push_text(LineColumn::ItemTypeName, &basic.item_type_name);
        set.push_text(LineColumn::StockClassName, &basic.stock_class_name);
        set.push_text(LineColumn::StockSubClassName, &basic.stock_sub_class_name);
        set.push_text(LineColumn::StockItemEdTypeName, &basic.stock_item_ed_type_name);

        let qty = &self.periods.qty;
        for (column, field) in LineColumn::PERIOD_QTY.into_iter().zip(qty.quarters()) {
            set.push_decimal(column, field);
        }
        set.push_decimal(LineColumn::TotalQty, &qty.total);

        let amount = &self.periods.amount;
        for (column, field) in LineColumn::PERIOD_AMOUNT.into_iter().zip(amount.quarters()) {
            set.push_decimal(column, field);
        }
        set.push_decimal(LineColumn::TotalAmount, &amount.total);

        set.push_decimal(LineColumn::Last1YearQty, &self.history.last_1_year_qty);
        set.push_decimal(LineColumn::Last2YearQty, &self.history.last_2_year_qty);
        set.push_decimal(LineColumn::Last3YearQty, &self.history.last_3_year_qty);
        set.push_decimal(LineColumn::CurrentQty, &self.current_qty);
        set.push_decimal(LineColumn::UnitCost, &self.item.unit_cost);
        set.push_decimal(LineColumn::UnitQty, &self.item.unit_qty);
        set.push_text(
            LineColumn::InputType,
            &self.input_type.clone().map(|tag| tag.as_str().to_string()),
        );

        let forecast = &self.forecast;
        set.push_decimal(LineColumn::IncPercent, &forecast.inc_percent);
        set.push_decimal(LineColumn::YearQty, &forecast.year_qty);
        set.push_decimal(LineColumn::ForecastQty, &forecast.forecast_qty);
        set.push_decimal(LineColumn::IncomingBalanceQty, &forecast.incoming_balance_qty);
        set.push_decimal(LineColumn::Period1PoQty, &forecast.period1_po_qty);
        set.push_decimal(LineColumn::Period2PoQty, &forecast.period2_po_qty);
        set.push_decimal(LineColumn::Period3PoQty, &forecast.period3_po_qty);
        set.push_decimal(LineColumn::Period4PoQty, &forecast.period4_po_qty);
        set.push_decimal(LineColumn::Period1PoAmount, &forecast.period1_po_amount);
        set.push_decimal(LineColumn::Period2PoAmount, &forecast.period2_po_amount);
        set.push_decimal(LineColumn::Period3PoAmount, &forecast.period3_po_amount);
        set.push_decimal(LineColumn::Period4PoAmount, &forecast.period4_po_amount);
        set.push_decimal(LineColumn::TotalPoQty, &forecast.total_po_qty);
        set.push_decimal(LineColumn::TotalPoAmount, &forecast.total_po_amount);
        set.push_decimal(LineColumn::Trend1YrB0, &forecast.trend_1_yr_b0);
        set.push_decimal(LineColumn::Trend1YrB1, &forecast.trend_1_yr_b1);
        set.push_decimal(LineColumn::Trend3YrB0, &forecast.trend_3_yr_b0);
        set.push_decimal(LineColumn::Trend3YrB1, &forecast.trend_3_yr_b1);
        set.push_decimal(LineColumn::Trend1YrR2, &forecast.trend_1_yr_r2);
        set.push_decimal(LineColumn::Trend1YrPoint, &forecast.trend_1_yr_point);
        set.push_decimal(LineColumn::Trend1YrRsd, &forecast.trend_1_yr_rsd);
        set.push_decimal(LineColumn::Trend1YrMean, &forecast.trend_1_yr_mean);
        set.push_decimal(LineColumn::Trend1YrSd, &forecast.trend_1_yr_sd);
        set.push_decimal(LineColumn::PackageUnitCost, &forecast.package_unit_cost);
        set.push_decimal(LineColumn::PackageCurrentQty, &forecast.package_current_qty);
        set.push_decimal(LineColumn::PackageTotalQty, &forecast.package_total_qty);
        set.push_decimal(LineColumn::PackageTotalAmount, &forecast.package_total_amount);
        set.push_decimal(
            LineColumn::PackageIncomingBalanceQty,
            &forecast.package_incoming_balance_qty,
        );
        set.push_decimal(LineColumn::PackagePeriod1Qty, &forecast.package_period1_qty);
        set.push_decimal(LineColumn::PackagePeriod2Qty, &forecast.package_period2_qty);
        set.push_decimal(LineColumn::PackagePeriod3Qty, &forecast.package_period3_qty);
        set.push_decimal(LineColumn::PackagePeriod4Qty, &forecast.package_period4_qty);
        set.push_text(LineColumn::ManualCalc, &forecast.manual_calc);

        set
    }

    /// Checks the fields every line needs before any transaction opens.
    pub fn validate(self) -> Result<ValidatedSubmission, DomainError> {
        let budget_year = match self.meta.budget_year.value() {
            Some(year) => BudgetYear::parse(year)?,
            None => {
                return Err(DomainError::Validation(
                    "budget_year and department_id are required".to_string(),
                ))
            }
        };
        let department_id = match self.meta.department_id.value() {
            Some(id) if *id > 0 => DepartmentId(*id),
            _ => {
                return Err(DomainError::Validation(
                    "budget_year and department_id are required".to_string(),
                ))
            }
        };
        let item_id = match self.item.item_id.value() {
            Some(id) if *id > 0 => ItemId(*id),
            _ => return Err(DomainError::Validation("item_id is required".to_string())),
        };

        Ok(ValidatedSubmission {
            plan_key: PlanKey::new(budget_year, department_id),
            item_id,
            unit: self.item.unit.clone(),
            submission: self,
        })
    }
}

#[derive(Clone, Debug)]
pub struct ValidatedSubmission {
    pub plan_key: PlanKey,
    pub item_id: ItemId,
    pub unit: Option<UnitRef>,
    pub submission: LineSubmission,
}

/// A request body holding either one line or an ordered batch of lines.
#[derive(Clone, Debug, PartialEq)]
pub enum SubmissionEnvelope {
    Single(Value),
    Batch(Vec<Value>),
}

impl SubmissionEnvelope {
    pub fn from_json(raw: Value) -> Result<Self, DomainError> {
        match raw {
            Value::Array(lines) if lines.is_empty() => Err(DomainError::Validation(
                "batch must contain at least one line".to_string(),
            )),
            Value::Array(lines) => Ok(Self::Batch(lines)),
            Value::Object(_) => Ok(Self::Single(raw)),
            _ => Err(DomainError::Validation(
                "payload must be a line object or an array of line objects".to_string(),
            )),
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Batch(_))
    }

    pub fn into_lines(self) -> Vec<Value> {
        match self {
            Self::Single(line) => vec![line],
            Self::Batch(lines) => lines,
        }
    }
}

/// Parses and validates one raw line. Shape errors are reported as validation failures.
pub fn parse_submission(raw: Value) -> Result<ValidatedSubmission, DomainError> {
    let submission: LineSubmission = serde_json::from_value(raw)
        .map_err(|error| DomainError::Validation(format!("malformed line payload: {error}")))?;
    submission.validate()
}

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::approval::ApprovalSlots;
use crate::domain::field::{Coerce, Field};
use crate::domain::plan::PlanId;
use crate::domain::unit::ResolvedUnit;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommittedLineId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Draft,
    Committed,
}

impl LineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Committed => "committed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "draft" => Some(Self::Draft),
            "committed" => Some(Self::Committed),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Add,
    Edit,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Edit => "edit",
        }
    }
}

impl Coerce for InputType {
    fn coerce(raw: Value) -> Option<Self> {
        let text = String::coerce(raw)?;
        match text.to_ascii_lowercase().as_str() {
            "add" => Some(Self::Add),
            "edit" => Some(Self::Edit),
            _ => None,
        }
    }
}

/// Upsert key of a draft line, independent of its surrogate id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DraftKey {
    pub plan_id: PlanId,
    pub item_id: ItemId,
    pub unit: ResolvedUnit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Decimal,
    Text,
}

/// Every non-key column a draft line carries and a committed line copies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineColumn {
    ItemName,
    ItemUnit,
    ItemTypeName,
    StockClassName,
    StockSubClassName,
    StockItemEdTypeName,
    Period1Qty,
    Period2Qty,
    Period3Qty,
    Period4Qty,
    TotalQty,
    Period1Amount,
    Period2Amount,
    Period3Amount,
    Period4Amount,
    TotalAmount,
    Last1YearQty,
    Last2YearQty,
    Last3YearQty,
    CurrentQty,
    UnitCost,
    UnitQty,
    InputType,
    IncPercent,
    YearQty,
    ForecastQty,
    IncomingBalanceQty,
    Period1PoQty,
    Period2PoQty,
    Period3PoQty,
    Period4PoQty,
    Period1PoAmount,
    Period2PoAmount,
    Period3PoAmount,
    Period4PoAmount,
    TotalPoQty,
    TotalPoAmount,
    Trend1YrB0,
    Trend1YrB1,
    Trend3YrB0,
    Trend3YrB1,
    Trend1YrR2,
    Trend1YrPoint,
    Trend1YrRsd,
    Trend1YrMean,
    Trend1YrSd,
    PackageUnitCost,
    PackageCurrentQty,
    PackageTotalQty,
    PackageTotalAmount,
    PackageIncomingBalanceQty,
    PackagePeriod1Qty,
    PackagePeriod2Qty,
    PackagePeriod3Qty,
    PackagePeriod4Qty,
    ManualCalc,
}

impl LineColumn {
    pub const ALL: [LineColumn; 56] = [
        Self::ItemName,
        Self::ItemUnit,
        Self::ItemTypeName,
        Self::StockClassName,
        Self::StockSubClassName,
        Self::StockItemEdTypeName,
        Self::Period1Qty,
        Self::Period2Qty,
        Self::Period3Qty,
        Self::Period4Qty,
        Self::TotalQty,
        Self::Period1Amount,
        Self::Period2Amount,
        Self::Period3Amount,
        Self::Period4Amount,
        Self::TotalAmount,
        Self::Last1YearQty,
        Self::Last2YearQty,
        Self::Last3YearQty,
        Self::CurrentQty,
        Self::UnitCost,
        Self::UnitQty,
        Self::InputType,
        Self::IncPercent,
        Self::YearQty,
        Self::ForecastQty,
        Self::IncomingBalanceQty,
        Self::Period1PoQty,
        Self::Period2PoQty,
        Self::Period3PoQty,
        Self::Period4PoQty,
        Self::Period1PoAmount,
        Self::Period2PoAmount,
        Self::Period3PoAmount,
        Self::Period4PoAmount,
        Self::TotalPoQty,
        Self::TotalPoAmount,
        Self::Trend1YrB0,
        Self::Trend1YrB1,
        Self::Trend3YrB0,
        Self::Trend3YrB1,
        Self::Trend1YrR2,
        Self::Trend1YrPoint,
        Self::Trend1YrRsd,
        Self::Trend1YrMean,
        Self::Trend1YrSd,
        Self::PackageUnitCost,
        Self::PackageCurrentQty,
        Self::PackageTotalQty,
        Self::PackageTotalAmount,
        Self::PackageIncomingBalanceQty,
        Self::PackagePeriod1Qty,
        Self::PackagePeriod2Qty,
        Self::PackagePeriod3Qty,
        Self::PackagePeriod4Qty,
        Self::ManualCalc,
    ];

    pub const PERIOD_QTY: [LineColumn; 4] =
        [Self::Period1Qty, Self::Period2Qty, Self::Period3Qty, Self::Period4Qty];

    pub const PERIOD_AMOUNT: [LineColumn; 4] =
        [Self::Period1Amount, Self::Period2Amount, Self::Period3Amount, Self::Period4Amount];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ItemName => "item_name",
            Self::ItemUnit => "item_unit",
            Self::ItemTypeName => "item_type_name",
            Self::StockClassName => "stock_class_name",
            Self::StockSubClassName => "stock_sub_class_name",
            Self::StockItemEdTypeName => "stock_item_ed_type_name",
            Self::Period1Qty => "period1_qty",
            Self::Period2Qty => "period2_qty",
            Self::Period3Qty => "period3_qty",
            Self::Period4Qty => "period4_qty",
            Self::TotalQty => "total_qty",
            Self::Period1Amount => "period1_amount",
            Self::Period2Amount => "period2_amount",
            Self::Period3Amount => "period3_amount",
            Self::Period4Amount => "period4_amount",
            Self::TotalAmount => "total_amount",
            Self::Last1YearQty => "last_1_year_qty",
            Self::Last2YearQty => "last_2_year_qty",
            Self::Last3YearQty => "last_3_year_qty",
            Self::CurrentQty => "current_qty",
            Self::UnitCost => "unit_cost",
            Self::UnitQty => "unit_qty",
            Self::InputType => "input_type",
            Self::IncPercent => "inc_percent",
            Self::YearQty => "year_qty",
            Self::ForecastQty => "forecast_qty",
            Self::IncomingBalanceQty => "incoming_balance_qty",
            Self::Period1PoQty => "period1_po_qty",
            Self::Period2PoQty => "period2_po_qty",
            Self::Period3PoQty => "period3_po_qty",
            Self::Period4PoQty => "period4_po_qty",
            Self::Period1PoAmount => "period1_po_amount",
            Self::Period2PoAmount => "period2_po_amount",
            Self::Period3PoAmount => "period3_po_amount",
            Self::Period4PoAmount => "period4_po_amount",
            Self::TotalPoQty => "total_po_qty",
            Self::TotalPoAmount => "total_po_amount",
            Self::Trend1YrB0 => "trend_1_yr_b0",
            Self::Trend1YrB1 => "trend_1_yr_b1",
            Self::Trend3YrB0 => "trend_3_yr_b0",
            Self::Trend3YrB1 => "trend_3_yr_b1",
            Self::Trend1YrR2 => "trend_1_yr_r2",
            Self::Trend1YrPoint => "trend_1_yr_point",
            Self::Trend1YrRsd => "trend_1_yr_rsd",
            Self::Trend1YrMean => "trend_1_yr_mean",
            Self::Trend1YrSd => "trend_1_yr_sd",
            Self::PackageUnitCost => "package_unit_cost",
            Self::PackageCurrentQty => "package_current_qty",
            Self::PackageTotalQty => "package_total_qty",
            Self::PackageTotalAmount => "package_total_amount",
            Self::PackageIncomingBalanceQty => "package_incoming_balance_qty",
            Self::PackagePeriod1Qty => "package_period1_qty",
            Self::PackagePeriod2Qty => "package_period2_qty",
            Self::PackagePeriod3Qty => "package_period3_qty",
            Self::PackagePeriod4Qty => "package_period4_qty",
            Self::ManualCalc => "manual_calc",
        }
    }

    pub fn kind(self) -> ColumnKind {
        match self {
            Self::ItemName
            | Self::ItemUnit
            | Self::ItemTypeName
            | Self::StockClassName
            | Self::StockSubClassName
            | Self::StockItemEdTypeName
            | Self::InputType
            | Self::ManualCalc => ColumnKind::Text,
            _ => ColumnKind::Decimal,
        }
    }

    /// Comma-separated column list in `ALL` order, for SELECT and INSERT ... SELECT.
    pub fn sql_list() -> String {
        Self::ALL.iter().map(|column| column.as_str()).collect::<Vec<_>>().join(", ")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Decimal(Decimal),
    Text(String),
}

impl ColumnValue {
    /// Storage encoding. Decimals are persisted as canonical text to avoid float rounding.
    pub fn to_storage(&self) -> String {
        match self {
            Self::Decimal(value) => value.normalize().to_string(),
            Self::Text(value) => value.clone(),
        }
    }

    pub fn from_storage(column: LineColumn, raw: &str) -> Result<Self, String> {
        match column.kind() {
            ColumnKind::Text => Ok(Self::Text(raw.to_string())),
            ColumnKind::Decimal => Decimal::from_str(raw)
                .map(Self::Decimal)
                .map_err(|error| format!("column `{}` holds `{raw}`: {error}", column.as_str())),
        }
    }
}

/// Present column values of a stored line. Columns holding SQL NULL are simply missing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineValues(BTreeMap<LineColumn, ColumnValue>);

impl LineValues {
    pub fn insert(&mut self, column: LineColumn, value: ColumnValue) {
        self.0.insert(column, value);
    }

    pub fn get(&self, column: LineColumn) -> Option<&ColumnValue> {
        self.0.get(&column)
    }

    pub fn decimal(&self, column: LineColumn) -> Option<Decimal> {
        match self.0.get(&column) {
            Some(ColumnValue::Decimal(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn text(&self, column: LineColumn) -> Option<&str> {
        match self.0.get(&column) {
            Some(ColumnValue::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LineColumn, &ColumnValue)> {
        self.0.iter()
    }
}

/// Columns a single upsert will write, in a deterministic order.
///
/// Built by folding over a submission: only `Field::Value` entries make it in, so an
/// absent or null field can never overwrite what is already stored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteSet {
    entries: BTreeMap<LineColumn, ColumnValue>,
}

impl WriteSet {
    pub fn push_decimal(&mut self, column: LineColumn, field: &Field<Decimal>) {
        if let Field::Value(value) = field {
            self.entries.insert(column, ColumnValue::Decimal(*value));
        }
    }

    pub fn push_text(&mut self, column: LineColumn, field: &Field<String>) {
        if let Field::Value(value) = field {
            self.entries.insert(column, ColumnValue::Text(value.clone()));
        }
    }

    pub fn set(&mut self, column: LineColumn, value: ColumnValue) {
        self.entries.insert(column, value);
    }

    pub fn contains(&self, column: LineColumn) -> bool {
        self.entries.contains_key(&column)
    }

    pub fn decimal(&self, column: LineColumn) -> Option<Decimal> {
        match self.entries.get(&column) {
            Some(ColumnValue::Decimal(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn columns(&self) -> Vec<LineColumn> {
        self.entries.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LineColumn, &ColumnValue)> {
        self.entries.iter()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftLine {
    pub id: LineId,
    pub plan_id: PlanId,
    pub item_id: ItemId,
    pub unit: ResolvedUnit,
    pub status: LineStatus,
    pub values: LineValues,
    pub approvals: ApprovalSlots,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DraftLine {
    pub fn key(&self) -> DraftKey {
        DraftKey { plan_id: self.plan_id, item_id: self.item_id, unit: self.unit }
    }
}

/// Permanent ledger row. Written once at promotion and never changed afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedLine {
    pub id: CommittedLineId,
    pub plan_id: PlanId,
    pub item_id: ItemId,
    pub unit: ResolvedUnit,
    pub source_line_id: LineId,
    pub values: LineValues,
    pub committed_at: DateTime<Utc>,
}

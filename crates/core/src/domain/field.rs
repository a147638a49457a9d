use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A submitted column value that remembers whether the caller sent it at all.
///
/// `Absent` means the key was missing from the payload, `Null` means it was sent
/// but carried nothing usable (JSON null, an empty string, or text that is not a
/// number for a numeric column). Only `Value` ever reaches a write set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Field<T> {
    Absent,
    Null,
    Value(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Self::Absent
    }
}

impl<T> Field<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(value) => Some(value),
            Self::Absent | Self::Null => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Value(value) => Some(value),
            Self::Absent | Self::Null => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Self::Absent => Field::Absent,
            Self::Null => Field::Null,
            Self::Value(value) => Field::Value(f(value)),
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::Value(value),
            None => Self::Null,
        }
    }
}

/// Lenient conversion from raw JSON into a column type. `None` turns into `Field::Null`.
pub trait Coerce: Sized {
    fn coerce(raw: Value) -> Option<Self>;
}

impl Coerce for Decimal {
    fn coerce(raw: Value) -> Option<Self> {
        match raw {
            Value::Number(number) => Decimal::from_str(&number.to_string()).ok(),
            Value::String(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return None;
                }
                Decimal::from_str(trimmed).ok()
            }
            _ => None,
        }
    }
}

/// Floats that convert to `i64` without saturating. The upper bound is 2^63, exclusive.
const I64_FLOAT_RANGE: std::ops::Range<f64> = i64::MIN as f64..i64::MAX as f64;

impl Coerce for i64 {
    fn coerce(raw: Value) -> Option<Self> {
        match raw {
            Value::Number(number) => number.as_i64().or_else(|| {
                number
                    .as_f64()
                    .filter(|v| v.fract() == 0.0 && I64_FLOAT_RANGE.contains(v))
                    .map(|v| v as i64)
            }),
            Value::String(text) => text.trim().parse::<i64>().ok(),
            _ => None,
        }
    }
}

impl Coerce for String {
    fn coerce(raw: Value) -> Option<Self> {
        match raw {
            Value::String(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        }
    }
}

impl<'de, T> Deserialize<'de> for Field<T>
where
    T: Coerce,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        if raw.is_null() {
            return Ok(Self::Null);
        }
        Ok(T::coerce(raw).into())
    }
}

impl<T> Serialize for Field<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Value(value) => value.serialize(serializer),
            Self::Absent | Self::Null => serializer.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde::Deserialize;

    use super::Field;

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(default)]
        qty: Field<Decimal>,
        #[serde(default)]
        name: Field<String>,
        #[serde(default)]
        id: Field<i64>,
    }

    fn sample(json: &str) -> Sample {
        serde_json::from_str(json).expect("sample should deserialize")
    }

    #[test]
    fn missing_keys_stay_absent() {
        let parsed = sample("{}");
        assert_eq!(parsed.qty, Field::Absent);
        assert_eq!(parsed.name, Field::Absent);
        assert_eq!(parsed.id, Field::Absent);
    }

    #[test]
    fn explicit_null_and_empty_text_become_null() {
        let parsed = sample(r#"{"qty": null, "name": "   ", "id": ""}"#);
        assert_eq!(parsed.qty, Field::Null);
        assert_eq!(parsed.name, Field::Null);
        assert_eq!(parsed.id, Field::Null);
    }

    #[test]
    fn non_numeric_text_is_null_rather_than_zero() {
        let parsed = sample(r#"{"qty": "ten"}"#);
        assert_eq!(parsed.qty, Field::Null);
    }

    #[test]
    fn numbers_and_numeric_strings_are_accepted() {
        let parsed = sample(r#"{"qty": " 12.5 ", "name": "Gauze", "id": 500}"#);
        assert_eq!(parsed.qty, Field::Value(Decimal::new(125, 1)));
        assert_eq!(parsed.name, Field::Value("Gauze".to_string()));
        assert_eq!(parsed.id, Field::Value(500));

        let parsed = sample(r#"{"qty": 7, "id": "42"}"#);
        assert_eq!(parsed.qty, Field::Value(Decimal::new(7, 0)));
        assert_eq!(parsed.id, Field::Value(42));
    }

    #[test]
    fn fractional_ids_are_rejected() {
        let parsed = sample(r#"{"id": 4.5}"#);
        assert_eq!(parsed.id, Field::Null);
    }

    #[test]
    fn out_of_range_whole_floats_are_null_not_saturated() {
        assert_eq!(sample(r#"{"id": 1e30}"#).id, Field::Null);
        assert_eq!(sample(r#"{"id": -1e30}"#).id, Field::Null);
        assert_eq!(sample(r#"{"id": 9.223372036854776e18}"#).id, Field::Null);
        assert_eq!(sample(r#"{"id": 1e3}"#).id, Field::Value(1000));
    }
}

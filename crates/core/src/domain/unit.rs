use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitId(pub i64);

/// Caller-supplied packaging unit: either a canonical id or a unit name to look up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnitRef {
    Id(UnitId),
    Name(String),
}

impl UnitRef {
    /// Normalizes raw input. Blank names and non-integral numbers carry no unit.
    pub fn from_json(raw: &Value) -> Option<Self> {
        match raw {
            Value::Number(number) => number.as_i64().map(|id| Self::Id(UnitId(id))),
            Value::String(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| Self::Name(trimmed.to_string()))
            }
            _ => None,
        }
    }
}

/// Deserializes an optional `UnitRef`, mapping null and blank input to `None`.
pub fn deserialize_unit_ref<'de, D>(deserializer: D) -> Result<Option<UnitRef>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(UnitRef::from_json(&raw))
}

/// Outcome of unit resolution. An unresolved unit still takes part in the upsert key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedUnit(pub Option<UnitId>);

impl ResolvedUnit {
    pub const UNRESOLVED_SENTINEL: i64 = 0;

    /// Value compared inside the draft key; an unresolved unit compares as 0.
    pub fn key_value(&self) -> i64 {
        self.0.map(|id| id.0).unwrap_or(Self::UNRESOLVED_SENTINEL)
    }

    pub fn id(&self) -> Option<i64> {
        self.0.map(|id| id.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ResolvedUnit, UnitId, UnitRef};

    #[test]
    fn numeric_input_is_trusted_as_an_id() {
        assert_eq!(UnitRef::from_json(&json!(12)), Some(UnitRef::Id(UnitId(12))));
    }

    #[test]
    fn names_are_trimmed_and_blank_names_dropped() {
        assert_eq!(
            UnitRef::from_json(&json!("  กล่อง ")),
            Some(UnitRef::Name("กล่อง".to_string()))
        );
        assert_eq!(UnitRef::from_json(&json!("   ")), None);
        assert_eq!(UnitRef::from_json(&json!(null)), None);
    }

    #[test]
    fn unresolved_unit_keys_as_zero() {
        assert_eq!(ResolvedUnit(None).key_value(), 0);
        assert_eq!(ResolvedUnit(Some(UnitId(7))).key_value(), 7);
    }
}

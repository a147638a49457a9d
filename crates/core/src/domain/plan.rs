use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlanId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepartmentId(pub i64);

/// Fiscal year label as the hospital writes it, e.g. "2568" or "2025".
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BudgetYear(String);

impl BudgetYear {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::Validation("budget_year is required".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Natural key of a plan: one plan per budget year and department.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlanKey {
    pub budget_year: BudgetYear,
    pub department_id: DepartmentId,
}

impl PlanKey {
    pub fn new(budget_year: BudgetYear, department_id: DepartmentId) -> Self {
        Self { budget_year, department_id }
    }

    /// Stable 64-bit digest used to pick a lock shard. Identical across processes and runs.
    pub fn lock_digest(&self) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.budget_year.as_str().as_bytes());
        hasher.update(b"\x1f");
        hasher.update(&self.department_id.0.to_le_bytes());
        let hash = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(prefix)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub budget_year: BudgetYear,
    pub department_id: DepartmentId,
    pub created_at: DateTime<Utc>,
}

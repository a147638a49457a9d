use thiserror::Error;

use stockplan_core::errors::{ApplicationError, DomainError, InterfaceError};
use stockplan_core::retry::Retryable;

use crate::repositories::RepositoryError;

pub mod approval;
pub mod planning;

pub use approval::ApprovalEngine;
pub use planning::PlanningEngine;

/// SQLite busy codes: SQLITE_BUSY, SQLITE_BUSY_RECOVERY, SQLITE_BUSY_SNAPSHOT.
const BUSY_CODES: [&str; 3] = ["5", "261", "517"];

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("gave up after {attempts} attempts on a concurrent write: {last}")]
    ConflictExhausted { attempts: u32, last: String },
    #[error("approval conflict: {0}")]
    ApprovalConflict(String),
}

impl From<sqlx::Error> for EngineError {
    fn from(error: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(error))
    }
}

impl Retryable for EngineError {
    fn is_retryable(&self) -> bool {
        let Self::Repository(error) = self else {
            return false;
        };
        error.as_database().is_some_and(|db| {
            db.is_unique_violation()
                || db.code().is_some_and(|code| BUSY_CODES.iter().any(|busy| *busy == code))
        })
    }
}

impl From<EngineError> for ApplicationError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::Domain(error) => Self::Domain(error),
            error @ EngineError::Repository(_) if error.is_retryable() => {
                Self::Conflict("a concurrent update touched the same rows, please retry".to_string())
            }
            EngineError::Repository(error) => Self::Persistence(error.to_string()),
            EngineError::ConflictExhausted { attempts, .. } => Self::Conflict(format!(
                "gave up after {attempts} attempts on a concurrent write, please retry"
            )),
            EngineError::ApprovalConflict(message) => Self::Conflict(message),
        }
    }
}

impl EngineError {
    /// Caller-safe reason, used for per-line batch failures.
    pub fn public_message(self) -> String {
        InterfaceError::from(ApplicationError::from(self)).message().to_string()
    }
}

pub mod approvals;
pub mod config;
pub mod domain;
pub mod errors;
pub mod lock;
pub mod retry;
pub mod submission;
pub mod upsert;

pub use approvals::{ApprovalDecision, ApprovalOutcome, ApprovalRequest, LineApprovalState};
pub use domain::approval::{ApprovalSignature, ApprovalSlots, ApprovalStage, SlotPosition};
pub use domain::field::Field;
pub use domain::line::{
    CommittedLine, DraftKey, DraftLine, ItemId, LineColumn, LineId, LineStatus, LineValues,
    WriteSet,
};
pub use domain::plan::{BudgetYear, DepartmentId, Plan, PlanId, PlanKey};
pub use domain::unit::{ResolvedUnit, Unit, UnitId, UnitRef};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use lock::{PlanLockGuard, PlanLockTable};
pub use retry::{RetryPolicy, Retryable};
pub use submission::{LineSubmission, SubmissionEnvelope, ValidatedSubmission};
pub use upsert::{BatchReport, LineOutcome, UpsertMode, UpsertOutcome};

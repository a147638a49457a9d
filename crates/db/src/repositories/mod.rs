use async_trait::async_trait;
use thiserror::Error;

use stockplan_core::domain::line::LineId;
use stockplan_core::domain::plan::PlanId;
use stockplan_core::domain::unit::{ResolvedUnit, Unit, UnitRef};

pub mod committed_line;
pub mod draft_line;
pub mod plan;
pub mod ranking;
pub mod unit;

pub use committed_line::PromotionResult;
pub use draft_line::ApprovalSummary;
pub use plan::PlanLocation;
pub use ranking::{
    RankAssignment, RankFailure, RankedLine, RankingReport, SqlRankingRepository,
};
pub use unit::SqlUnitRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl RepositoryError {
    pub fn as_database(&self) -> Option<&(dyn sqlx::error::DatabaseError + 'static)> {
        match self {
            Self::Database(sqlx::Error::Database(error)) => Some(error.as_ref()),
            _ => None,
        }
    }
}

#[async_trait]
pub trait UnitRepository: Send + Sync {
    async fn resolve(&self, unit: Option<&UnitRef>) -> Result<ResolvedUnit, RepositoryError>;
    async fn list(&self) -> Result<Vec<Unit>, RepositoryError>;
    async fn save(&self, unit: Unit) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait RankingRepository: Send + Sync {
    async fn list_ranking(&self, plan_id: Option<PlanId>)
        -> Result<Vec<RankedLine>, RepositoryError>;
    async fn assign_ranks(
        &self,
        assignments: Vec<RankAssignment>,
    ) -> Result<RankingReport, RepositoryError>;
    async fn reset_ranks(&self, line_ids: &[LineId]) -> Result<u64, RepositoryError>;
    async fn reset_all_ranks(&self) -> Result<u64, RepositoryError>;
}

/// `?, ?, ?` for an IN list of `count` bound values.
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

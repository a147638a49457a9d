//! JSON routes over the planning, approval and ranking engines.
//!
//! - `POST   /api/plans/locate`              find or create the plan for a year and department
//! - `GET    /api/plans/{plan_id}/summary`   line counts by approval stage
//! - `POST   /api/lines`                     upsert one line object or an ordered batch
//! - `POST   /api/approvals`                 advance a batch of lines by one approval slot
//! - `GET    /api/ranking`                   ranked lines, optionally for one plan
//! - `POST   /api/ranking`                   assign rank positions
//! - `POST   /api/ranking/reset`             clear the positions of selected lines
//! - `DELETE /api/ranking`                   clear every position

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use stockplan_core::approvals::ApprovalOutcome;
use stockplan_core::config::EngineConfig;
use stockplan_core::domain::line::LineId;
use stockplan_core::domain::plan::{BudgetYear, DepartmentId, Plan, PlanId, PlanKey};
use stockplan_core::errors::{ApplicationError, DomainError, InterfaceError};
use stockplan_core::submission::SubmissionEnvelope;
use stockplan_core::upsert::{BatchReport, UpsertOutcome};
use stockplan_db::repositories::{
    ApprovalSummary, RankAssignment, RankedLine, RankingReport, RankingRepository,
    SqlRankingRepository,
};
use stockplan_db::{ApprovalEngine, DbPool, EngineError, PlanningEngine};

#[derive(Clone)]
pub struct ApiState {
    planning: PlanningEngine,
    approvals: ApprovalEngine,
    ranking: Arc<dyn RankingRepository>,
}

impl ApiState {
    pub fn new(db_pool: DbPool, engine: &EngineConfig) -> Self {
        Self {
            planning: PlanningEngine::from_config(db_pool.clone(), engine),
            approvals: ApprovalEngine::new(db_pool.clone()),
            ranking: Arc::new(SqlRankingRepository::new(db_pool)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LocatePlanRequest {
    #[serde(alias = "bdg_year")]
    pub budget_year: String,
    pub department_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub line_ids: Vec<i64>,
    pub officer: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RankingQuery {
    pub plan_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AssignRanksRequest {
    pub items: Vec<RankAssignment>,
}

#[derive(Debug, Deserialize)]
pub struct ResetRanksRequest {
    pub line_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(flatten)]
    pub data: T,
}

fn ok<T>(data: T) -> Json<Envelope<T>> {
    Json(Envelope { success: true, data })
}

#[derive(Debug, Serialize)]
pub struct PlanBody {
    pub plan: Plan,
}

#[derive(Debug, Serialize)]
pub struct LineBody {
    pub data: UpsertOutcome,
}

#[derive(Debug, Serialize)]
pub struct RankingBody {
    pub lines: Vec<RankedLine>,
}

#[derive(Debug, Serialize)]
pub struct ClearedBody {
    pub cleared: u64,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub success: bool,
    pub error: String,
    pub correlation_id: String,
}

/// Failure carried back to the caller with a reason and a correlation id for log lookup.
#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn from_application(error: ApplicationError) -> Self {
        let correlation_id = Uuid::new_v4().simple().to_string();
        warn!(
            event_name = "api.request.failed",
            correlation_id = %correlation_id,
            error = %error,
            "request failed"
        );
        Self(error.into_interface(correlation_id))
    }
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        Self::from_application(error.into())
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        Self::from_application(error.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            success: false,
            error: self.0.message().to_string(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/plans/locate", post(locate_plan))
        .route("/api/plans/{plan_id}/summary", get(plan_summary))
        .route("/api/lines", post(upsert_lines))
        .route("/api/approvals", post(approve_lines))
        .route("/api/ranking", get(list_ranking).post(assign_ranks).delete(reset_all_ranks))
        .route("/api/ranking/reset", post(reset_ranks))
        .with_state(state)
}

async fn locate_plan(
    State(state): State<ApiState>,
    Json(body): Json<LocatePlanRequest>,
) -> Result<Json<Envelope<PlanBody>>, ApiError> {
    if body.department_id <= 0 {
        return Err(DomainError::Validation("department_id must be positive".to_string()).into());
    }
    let year = BudgetYear::parse(&body.budget_year)?;
    let key = PlanKey::new(year, DepartmentId(body.department_id));
    let plan = state.planning.locate_or_create_plan(&key).await?;
    Ok(ok(PlanBody { plan }))
}

async fn plan_summary(
    State(state): State<ApiState>,
    Path(plan_id): Path<i64>,
) -> Result<Json<Envelope<ApprovalSummary>>, ApiError> {
    let summary = state.approvals.plan_approval_summary(PlanId(plan_id)).await?;
    Ok(ok(summary))
}

/// A line object gets its outcome or an error status; an array always gets a per-line report.
async fn upsert_lines(
    State(state): State<ApiState>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    match SubmissionEnvelope::from_json(body)? {
        SubmissionEnvelope::Single(line) => {
            let outcome = state.planning.upsert_line(line).await?;
            Ok(ok(LineBody { data: outcome }).into_response())
        }
        SubmissionEnvelope::Batch(lines) => {
            let report: BatchReport = state.planning.upsert_batch(lines).await;
            Ok(Json(report).into_response())
        }
    }
}

async fn approve_lines(
    State(state): State<ApiState>,
    Json(body): Json<ApproveRequest>,
) -> Result<Json<Envelope<ApprovalOutcome>>, ApiError> {
    let outcome = state.approvals.approve(body.line_ids, &body.officer).await?;
    info!(
        event_name = "api.approval.completed",
        level = outcome.approved_level,
        lines = outcome.line_ids.len(),
        "approval request completed"
    );
    Ok(ok(outcome))
}

async fn list_ranking(
    State(state): State<ApiState>,
    Query(query): Query<RankingQuery>,
) -> Result<Json<Envelope<RankingBody>>, ApiError> {
    let lines =
        state.ranking.list_ranking(query.plan_id.map(PlanId)).await.map_err(EngineError::from)?;
    Ok(ok(RankingBody { lines }))
}

async fn assign_ranks(
    State(state): State<ApiState>,
    Json(body): Json<AssignRanksRequest>,
) -> Result<Json<Envelope<RankingReport>>, ApiError> {
    if body.items.is_empty() {
        return Err(DomainError::Validation("items must not be empty".to_string()).into());
    }
    let report = state.ranking.assign_ranks(body.items).await.map_err(EngineError::from)?;
    Ok(ok(report))
}

async fn reset_ranks(
    State(state): State<ApiState>,
    Json(body): Json<ResetRanksRequest>,
) -> Result<Json<Envelope<ClearedBody>>, ApiError> {
    if body.line_ids.is_empty() {
        return Err(DomainError::Validation("line_ids must not be empty".to_string()).into());
    }
    let ids: Vec<LineId> = body.line_ids.into_iter().map(LineId).collect();
    let cleared = state.ranking.reset_ranks(&ids).await.map_err(EngineError::from)?;
    Ok(ok(ClearedBody { cleared }))
}

async fn reset_all_ranks(
    State(state): State<ApiState>,
) -> Result<Json<Envelope<ClearedBody>>, ApiError> {
    let cleared = state.ranking.reset_all_ranks().await.map_err(EngineError::from)?;
    Ok(ok(ClearedBody { cleared }))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use stockplan_core::config::AppConfig;
    use stockplan_db::repositories::SqlUnitRepository;
    use stockplan_db::{connect_with_settings, migrations};

    use super::{router, ApiState};

    async fn app() -> Router {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlUnitRepository::new(pool.clone()).seed_defaults().await.expect("seed units");
        router(ApiState::new(pool, &AppConfig::default().engine))
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |body| Body::from(body.to_string())))
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn gauze_line() -> Value {
        json!({
            "meta": { "bdg_year": "2025", "department_id": 10 },
            "item": { "item_id": 500, "stock_item_unit_id": "กล่อง", "unit_cost": 100 },
            "periods": { "qty": { "q1": 10, "q2": 5 } }
        })
    }

    #[tokio::test]
    async fn single_line_upsert_then_three_approvals_commit_it() {
        let app = app().await;

        let (status, body) = call(&app, Method::POST, "/api/lines", Some(gauze_line())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["mode"], "inserted");
        assert_eq!(body["data"]["unit_id"], 1);
        let line_id = body["data"]["line_id"].as_i64().expect("line id");
        let plan_id = body["data"]["plan_id"].as_i64().expect("plan id");

        let mut last = Value::Null;
        for officer in ["A", "B", "C"] {
            let (status, body) = call(
                &app,
                Method::POST,
                "/api/approvals",
                Some(json!({ "line_ids": [line_id], "officer": officer })),
            )
            .await;
            assert_eq!(status, StatusCode::OK, "approval by {officer}: {body}");
            last = body;
        }
        assert_eq!(last["new_state"], "committed");
        assert_eq!(last["promoted"], 1);

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/approvals",
            Some(json!({ "line_ids": [line_id], "officer": "D" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "already fully approved");
        assert!(body["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));

        let (status, body) =
            call(&app, Method::GET, &format!("/api/plans/{plan_id}/summary"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["committed"], 1);
    }

    #[tokio::test]
    async fn batch_reports_each_line_in_order() {
        let app = app().await;
        let batch = json!([
            gauze_line(),
            { "meta": { "bdg_year": "2025", "department_id": 10 }, "item": {} },
            { "meta": { "bdg_year": "2025", "department_id": 10 }, "item": { "item_id": 501 } }
        ]);

        let (status, body) = call(&app, Method::POST, "/api/lines", Some(batch)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["succeeded"], 2);
        assert_eq!(body["failed"], 1);
        assert_eq!(body["results"][1]["index"], 1);
        assert_eq!(body["results"][1]["success"], false);
        assert!(body["results"][1]["error"].as_str().is_some_and(|error| error.contains("item_id")));
    }

    #[tokio::test]
    async fn status_codes_follow_error_kind() {
        let app = app().await;

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/lines",
            Some(json!({ "meta": { "department_id": 10 }, "item": { "item_id": 1 } })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/approvals",
            Some(json!({ "line_ids": [404], "officer": "A" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/approvals",
            Some(json!({ "line_ids": [], "officer": "A" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn locate_returns_the_same_plan_twice() {
        let app = app().await;
        let request = json!({ "bdg_year": "2568", "department_id": 4 });

        let (_, first) = call(&app, Method::POST, "/api/plans/locate", Some(request.clone())).await;
        let (status, second) = call(&app, Method::POST, "/api/plans/locate", Some(request)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["plan"]["id"], second["plan"]["id"]);

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/plans/locate",
            Some(json!({ "budget_year": "2568", "department_id": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ranking_routes_assign_list_and_reset() {
        let app = app().await;
        let (_, line) = call(&app, Method::POST, "/api/lines", Some(gauze_line())).await;
        let line_id = line["data"]["line_id"].as_i64().expect("line id");

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/ranking",
            Some(json!({ "items": [
                { "line_id": line_id, "position": 1 },
                { "line_id": 9999, "position": 2 }
            ] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!((body["updated"].clone(), body["failed"].clone()), (json!(1), json!(1)));

        let (_, body) = call(&app, Method::GET, "/api/ranking", None).await;
        assert_eq!(body["lines"][0]["rank_position"], 1);

        let (_, body) =
            call(&app, Method::POST, "/api/ranking/reset", Some(json!({ "line_ids": [line_id] })))
                .await;
        assert_eq!(body["cleared"], 1);

        let (status, body) = call(&app, Method::DELETE, "/api/ranking", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cleared"], 0);
    }
}

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::domain::{CandidateId, ListQuery, RequirementId};
use super::filter::FilterSpec;
use super::ports::{
    CandidateSource, CandidateSourceError, EngagementAction, EngagementError, EngagementService,
    RunRequest, RunTarget, ScoringService,
};
use super::service::{MatchingService, MatchingServiceError};
use super::store::ContextToken;

/// Router builder exposing the candidate listing, ranking, and scoring endpoints.
pub fn matching_router<C, S, E>(service: Arc<MatchingService<C, S, E>>) -> Router
where
    C: CandidateSource + 'static,
    S: ScoringService + 'static,
    E: EngagementService + 'static,
{
    Router::new()
        .route(
            "/api/v1/requirements/:requirement_id/candidates/search",
            post(search_handler::<C, S, E>),
        )
        .route(
            "/api/v1/requirements/:requirement_id/ranking",
            get(ranking_handler::<C, S, E>),
        )
        .route(
            "/api/v1/requirements/:requirement_id/ats-runs",
            post(start_run_handler::<C, S, E>),
        )
        .route(
            "/api/v1/requirements/:requirement_id/candidates/:candidate_id/engagement",
            post(engagement_handler::<C, S, E>),
        )
        .with_state(service)
}

/// Listing query plus filter selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    pub query: ListQuery,
    pub filter: FilterSpec,
}

/// Run request body; omitting `candidate_ids` scores every candidate of the requirement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StartRunRequest {
    pub candidate_ids: Option<Vec<CandidateId>>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl From<StartRunRequest> for RunRequest {
    fn from(value: StartRunRequest) -> Self {
        let target = match value.candidate_ids {
            Some(ids) => RunTarget::Candidates(ids),
            None => RunTarget::All,
        };
        RunRequest {
            target,
            page: value.page,
            limit: value.limit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRunResponse {
    pub token: ContextToken,
    pub target_count: usize,
    pub total_candidates: usize,
    pub concurrency_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementRequest {
    pub action: EngagementAction,
}

pub(crate) async fn search_handler<C, S, E>(
    State(service): State<Arc<MatchingService<C, S, E>>>,
    Path(requirement_id): Path<String>,
    axum::Json(request): axum::Json<SearchRequest>,
) -> Response
where
    C: CandidateSource + 'static,
    S: ScoringService + 'static,
    E: EngagementService + 'static,
{
    let requirement = RequirementId(requirement_id);
    match service
        .refresh(&requirement, &request.query, &request.filter)
        .await
    {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(other) => error_response(other),
    }
}

pub(crate) async fn ranking_handler<C, S, E>(
    State(service): State<Arc<MatchingService<C, S, E>>>,
    Path(requirement_id): Path<String>,
) -> Response
where
    C: CandidateSource + 'static,
    S: ScoringService + 'static,
    E: EngagementService + 'static,
{
    match service.view(&RequirementId(requirement_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(other) => error_response(other),
    }
}

pub(crate) async fn start_run_handler<C, S, E>(
    State(service): State<Arc<MatchingService<C, S, E>>>,
    Path(requirement_id): Path<String>,
    axum::Json(request): axum::Json<StartRunRequest>,
) -> Response
where
    C: CandidateSource + 'static,
    S: ScoringService + 'static,
    E: EngagementService + 'static,
{
    let requirement = RequirementId(requirement_id);
    match service.start_scoring(&requirement, request.into()).await {
        Ok(run) => {
            let body = StartRunResponse {
                token: run.token(),
                target_count: run.target_count(),
                total_candidates: run.total_candidates(),
                concurrency_limit: run.context().concurrency_limit,
            };
            tokio::spawn(run.execute());
            (StatusCode::ACCEPTED, axum::Json(body)).into_response()
        }
        Err(other) => error_response(other),
    }
}

pub(crate) async fn engagement_handler<C, S, E>(
    State(service): State<Arc<MatchingService<C, S, E>>>,
    Path((requirement_id, candidate_id)): Path<(String, String)>,
    axum::Json(request): axum::Json<EngagementRequest>,
) -> Response
where
    C: CandidateSource + 'static,
    S: ScoringService + 'static,
    E: EngagementService + 'static,
{
    let requirement = RequirementId(requirement_id);
    let candidate = CandidateId(candidate_id);
    match service
        .engage(&requirement, &candidate, request.action)
        .await
    {
        Ok(flags) => (StatusCode::OK, axum::Json(flags)).into_response(),
        Err(other) => error_response(other),
    }
}

fn error_response(error: MatchingServiceError) -> Response {
    let status = match &error {
        MatchingServiceError::ContextNotFound(_)
        | MatchingServiceError::CandidateNotListed(_)
        | MatchingServiceError::Source(CandidateSourceError::RequirementNotFound(_))
        | MatchingServiceError::Engagement(EngagementError::CandidateNotFound(_)) => {
            StatusCode::NOT_FOUND
        }
        MatchingServiceError::RunStart(_)
        | MatchingServiceError::Source(CandidateSourceError::Unavailable(_))
        | MatchingServiceError::Engagement(EngagementError::Unavailable(_)) => {
            error!(%error, "upstream service failure");
            StatusCode::BAD_GATEWAY
        }
    };

    let payload = json!({
        "error": error.to_string(),
        "retryable": error.is_retryable(),
    });
    (status, axum::Json(payload)).into_response()
}

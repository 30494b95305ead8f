use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::job::OptimizationResult;
use crate::poller::PollStatus;
use crate::session::Session;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct JobQuery {
    pub job_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResultResponse {
    Waiting { attempt: u32, max_attempts: u32 },
    Ready { result: Box<OptimizationResult> },
    Cancelled,
}

fn respond(status: PollStatus) -> Result<Json<ResultResponse>, AppError> {
    match status {
        PollStatus::Waiting {
            attempt,
            max_attempts,
        } => Ok(Json(ResultResponse::Waiting {
            attempt,
            max_attempts,
        })),
        PollStatus::Ready(result) => Ok(Json(ResultResponse::Ready { result })),
        PollStatus::Failed(e) => Err(e.into()),
        PollStatus::Cancelled => Ok(Json(ResultResponse::Cancelled)),
    }
}

/// GET /api/results?job_id=
///
/// Opens the results view for a job and reports where its poll stands.
pub async fn handle_get_result(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<JobQuery>,
) -> Result<Json<ResultResponse>, AppError> {
    respond(state.results.open(query.job_id.as_deref(), &session))
}

/// POST /api/results/retry?job_id=
pub async fn handle_retry_result(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<JobQuery>,
) -> Result<Json<ResultResponse>, AppError> {
    respond(state.results.retry(query.job_id.as_deref(), &session))
}

/// DELETE /api/results?job_id=
///
/// The view was torn down; its poll is cancelled.
pub async fn handle_close_result(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<JobQuery>,
) -> Result<StatusCode, AppError> {
    if state.results.close(query.job_id.as_deref(), &session) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("No open results view for this job".to_string()))
    }
}

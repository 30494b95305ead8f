//! Axum route handlers for the resume pipeline.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::AppError;
use crate::models::resume::ResumeFile;
use crate::pipeline::{EnhanceOutcome, Notification, PipelineSnapshot};
use crate::session::Session;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EnhanceRequest {
    pub job_description: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhanceStatus {
    Started,
    Queued,
}

#[derive(Debug, Serialize)]
pub struct EnhanceResponse {
    pub status: EnhanceStatus,
    pub job_id: Option<String>,
    pub pipeline: PipelineSnapshot,
}

/// GET /api/pipeline
pub async fn handle_get_pipeline(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<PipelineSnapshot>, AppError> {
    let pipeline = state.pipelines.for_session(&session)?;
    Ok(Json(pipeline.snapshot()))
}

/// DELETE /api/pipeline
pub async fn handle_reset_pipeline(
    State(state): State<AppState>,
    session: Session,
) -> Result<StatusCode, AppError> {
    state.pipelines.for_session(&session)?.reset();
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/pipeline/upload
///
/// Multipart form with a `file` field. Responds with the pipeline after the
/// upload settled, including any queued enhancement that was replayed.
pub async fn handle_upload(
    State(state): State<AppState>,
    session: Session,
    mut multipart: Multipart,
) -> Result<Json<PipelineSnapshot>, AppError> {
    state.require_controls()?;
    let pipeline = state.pipelines.for_session(&session)?;

    let file = read_resume_file(&mut multipart)
        .await
        .map_err(|e| pipeline.fail(e))?;
    pipeline.upload_resume(&session, file).await?;

    Ok(Json(pipeline.snapshot()))
}

/// POST /api/pipeline/enhance
pub async fn handle_enhance(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<EnhanceRequest>,
) -> Result<Json<EnhanceResponse>, AppError> {
    state.require_controls()?;
    let pipeline = state.pipelines.for_session(&session)?;

    let (status, job_id) = match pipeline
        .enhance_resume(&session, &request.job_description)
        .await?
    {
        EnhanceOutcome::Started(enhancement) => (EnhanceStatus::Started, Some(enhancement.job_id)),
        EnhanceOutcome::Queued => (EnhanceStatus::Queued, None),
    };

    Ok(Json(EnhanceResponse {
        status,
        job_id,
        pipeline: pipeline.snapshot(),
    }))
}

/// GET /api/pipeline/notifications
///
/// Drains the notifications queued for the user's pipeline.
pub async fn handle_notifications(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<Notification>>, AppError> {
    let pipeline = state.pipelines.for_session(&session)?;
    Ok(Json(pipeline.notifications().drain()))
}

async fn read_resume_file(multipart: &mut Multipart) -> Result<ResumeFile, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid upload: {e}")))?
    {
        if field.name() != Some("file") {
            debug!("Ignoring multipart field {:?}", field.name());
            continue;
        }

        let filename = field.file_name().unwrap_or("resume").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Invalid upload: {e}")))?;

        return Ok(ResumeFile {
            filename,
            content_type,
            bytes,
        });
    }

    Err(AppError::Validation("Choose a resume file to upload".to_string()))
}

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::session::Session;
use crate::state::AppState;
use crate::storage::sync::sync_enhanced_document;
use crate::storage::{ResolvedUrl, UrlVariant};

fn default_format() -> String {
    "pdf".to_string()
}

#[derive(Debug, Deserialize)]
pub struct DocumentQuery {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub variant: UrlVariant,
}

#[derive(Debug, Deserialize)]
pub struct SyncQuery {
    #[serde(default = "default_format")]
    pub format: String,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub key: String,
    pub filename: String,
}

/// GET /api/documents/:resume_id?format=pdf&variant=view|download
pub async fn handle_get_document_url(
    State(state): State<AppState>,
    session: Session,
    Path(resume_id): Path<String>,
    Query(query): Query<DocumentQuery>,
) -> Result<Json<ResolvedUrl>, AppError> {
    let user_id = session.require_user()?;
    let resolved = state
        .resolver
        .resolve(user_id, &resume_id, &query.format, query.variant)
        .await?;
    Ok(Json(resolved))
}

/// GET /api/documents/:resume_id/blob?format=pdf&variant=view|download
///
/// Streams the local copy written by the blob fallback.
pub async fn handle_get_blob(
    State(state): State<AppState>,
    session: Session,
    Path(resume_id): Path<String>,
    Query(query): Query<DocumentQuery>,
) -> Result<Response, AppError> {
    let user_id = session.require_user()?;
    let (path, bytes) = state
        .resolver
        .read_blob(user_id, &resume_id, &query.format)
        .await?;

    let disposition = format!(
        "{}; filename=\"{}\"",
        query.variant.disposition(),
        path.filename()
    );
    Ok((
        [
            (header::CONTENT_TYPE, path.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// POST /api/documents/:resume_id/sync?format=pdf
///
/// Pulls the rendered document from the optimization API into storage.
pub async fn handle_sync_document(
    State(state): State<AppState>,
    session: Session,
    Path(resume_id): Path<String>,
    Query(query): Query<SyncQuery>,
) -> Result<Json<SyncResponse>, AppError> {
    let user_id = session.require_user()?;
    let path = sync_enhanced_document(
        state.api.as_ref(),
        &state.resolver,
        user_id,
        &resume_id,
        &query.format,
    )
    .await?;

    Ok(Json(SyncResponse {
        key: path.key(),
        filename: path.filename(),
    }))
}

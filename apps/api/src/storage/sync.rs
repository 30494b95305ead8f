use tracing::info;

use crate::api_client::JobApi;
use crate::errors::AppError;
use crate::storage::{StoragePath, UrlResolver};

/// Copies a rendered resume from the optimization backend into object
/// storage, overwriting the previous copy.
pub async fn sync_enhanced_document(
    api: &dyn JobApi,
    resolver: &UrlResolver,
    user_id: &str,
    resume_id: &str,
    format: &str,
) -> Result<StoragePath, AppError> {
    let bytes = api.download(resume_id, format).await?;
    if bytes.is_empty() {
        return Err(AppError::Server(format!(
            "download of {resume_id}.{format} returned no content"
        )));
    }

    let size = bytes.len();
    let path = resolver
        .store_document(user_id, resume_id, format, bytes)
        .await?;
    info!(path = %path, size, "Synced enhanced document");
    Ok(path)
}

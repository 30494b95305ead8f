//! Remote Job API client, the single point of entry for calls to the
//! optimization backend (upload, optimize, download, health).
//!
//! Every request is bounded by a client-side wall-clock timeout; a timeout is
//! reported as `ApiError::Timeout` and treated like any other transport error.
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{multipart, Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::job::OptimizeResponse;
use crate::models::resume::{ResumeFile, UploadResponse};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("request timed out after {}s", .after.as_secs())]
    Timeout { after: Duration },

    #[error("API error (status {status}): {message}")]
    Server { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Body of `GET /api/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(
            self.status.to_ascii_lowercase().as_str(),
            "ok" | "healthy" | "up"
        )
    }
}

/// Remote API liveness as last observed. Interactive operations are only
/// allowed once a probe came back healthy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum ApiHealth {
    Unknown,
    Healthy,
    Unhealthy(String),
}

impl ApiHealth {
    pub fn controls_enabled(&self) -> bool {
        matches!(self, ApiHealth::Healthy)
    }
}

/// The operations the dashboard needs from the optimization backend.
/// Carried in `AppState` as `Arc<dyn JobApi>` so tests can swap in fakes.
#[async_trait]
pub trait JobApi: Send + Sync {
    async fn upload(&self, user_id: &str, file: &ResumeFile) -> Result<UploadResponse, ApiError>;

    async fn optimize(
        &self,
        user_id: &str,
        resume_id: &str,
        job_description: &str,
    ) -> Result<OptimizeResponse, ApiError>;

    async fn download(&self, resume_id: &str, format: &str) -> Result<Bytes, ApiError>;

    async fn health(&self) -> Result<HealthStatus, ApiError>;
}

/// Probes the remote API once and folds the outcome into an `ApiHealth`.
pub async fn probe_health(api: &dyn JobApi) -> ApiHealth {
    match api.health().await {
        Ok(status) if status.is_healthy() => ApiHealth::Healthy,
        Ok(status) => {
            warn!("Job API reports status '{}'", status.status);
            ApiHealth::Unhealthy(status.status)
        }
        Err(e) => {
            warn!("Job API health check failed: {e}");
            ApiHealth::Unhealthy(e.to_string())
        }
    }
}

/// reqwest-backed `JobApi`.
#[derive(Clone)]
pub struct JobApiClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl JobApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::Transport)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn classify(&self, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout {
                after: self.timeout,
            }
        } else {
            ApiError::Transport(err)
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!("Job API returned {}: {}", status, body);
        Err(ApiError::Server {
            status: status.as_u16(),
            message: extract_error_message(&body),
        })
    }

    async fn read_json<T: DeserializeOwned>(&self, response: Response) -> Result<T, ApiError> {
        let body = response.text().await.map_err(|e| self.classify(e))?;
        serde_json::from_str(&body).map_err(|e| ApiError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl JobApi for JobApiClient {
    async fn upload(&self, user_id: &str, file: &ResumeFile) -> Result<UploadResponse, ApiError> {
        let part = multipart::Part::bytes(file.bytes.to_vec())
            .file_name(file.filename.clone())
            .mime_str(file.mime_type())
            .map_err(ApiError::Transport)?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("user_id", user_id.to_string());

        let response = self
            .send(self.client.post(self.url("/api/upload")).multipart(form))
            .await?;
        let upload: UploadResponse = self.read_json(response).await?;
        if upload.resume_id.trim().is_empty() {
            return Err(ApiError::Malformed("upload response has no resume_id".to_string()));
        }

        debug!("Uploaded {} as resume {}", file.filename, upload.resume_id);
        Ok(upload)
    }

    async fn optimize(
        &self,
        user_id: &str,
        resume_id: &str,
        job_description: &str,
    ) -> Result<OptimizeResponse, ApiError> {
        let form = multipart::Form::new()
            .text("resume_id", resume_id.to_string())
            .text("user_id", user_id.to_string())
            .text("job_description", job_description.to_string());

        let response = self
            .send(self.client.post(self.url("/api/optimize")).multipart(form))
            .await?;
        let optimized: OptimizeResponse = self.read_json(response).await?;
        if optimized.job_id.trim().is_empty() {
            return Err(ApiError::Malformed("optimize response has no job_id".to_string()));
        }

        debug!(
            "Optimization job {} started for resume {}",
            optimized.job_id, resume_id
        );
        Ok(optimized)
    }

    async fn download(&self, resume_id: &str, format: &str) -> Result<Bytes, ApiError> {
        let path = format!("/api/download/{resume_id}/{format}");
        let response = self.send(self.client.get(self.url(&path))).await?;
        response.bytes().await.map_err(|e| self.classify(e))
    }

    async fn health(&self) -> Result<HealthStatus, ApiError> {
        let response = self.send(self.client.get(self.url("/api/health"))).await?;
        self.read_json(response).await
    }
}

/// Pulls a human-readable message out of an error body. The backend answers
/// with `{"detail": ...}`, `{"error": ...}` or `{"message": ...}`; anything
/// else is returned verbatim.
fn extract_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };

    ["detail", "error", "message"]
        .iter()
        .filter_map(|key| value.get(key))
        .find_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Object(o) => o.get("message").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .unwrap_or_else(|| body.trim().to_string())
}

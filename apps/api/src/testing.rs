//! In-memory fakes for the external collaborators, shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use tokio::sync::Notify;

use crate::api_client::{ApiError, HealthStatus, JobApi};
use crate::db::JobStore;
use crate::models::job::{OptimizationJobRow, OptimizeResponse};
use crate::models::resume::{ResumeFile, UploadResponse};
use crate::storage::resolver::UrlProbe;
use crate::storage::{ObjectStore, StorageError, StoragePath, UrlVariant};

pub fn pdf_file(name: &str) -> ResumeFile {
    ResumeFile::new(name, &b"%PDF-1.7 original"[..])
}

pub fn job_row(id: &str, status: &str) -> OptimizationJobRow {
    OptimizationJobRow {
        id: id.to_string(),
        status: status.to_string(),
        resume_id: Some("r1".to_string()),
        user_id: Some("u1".to_string()),
        enhanced_resume_id: Some("e1".to_string()),
        job_description: Some("Senior Backend Engineer".to_string()),
        modifications: Some(json!([])),
        match_details: Some(json!({"original_score": 60, "enhanced_score": 80})),
        keywords_extracted: Some(json!(["rust"])),
        match_count: Some(1),
        error_message: None,
        created_at: None,
    }
}

#[derive(Default)]
pub struct FakeJobApi {
    upload_calls: AtomicUsize,
    optimize_calls: AtomicUsize,
    download_calls: AtomicUsize,
    fail_upload: bool,
    fail_optimize: bool,
    fail_download: bool,
    unhealthy: bool,
    gate_upload: bool,
    gate_optimize: bool,
    upload_started: Notify,
    upload_release: Notify,
    optimize_started: Notify,
    optimize_release: Notify,
}

impl FakeJobApi {
    pub fn failing_upload(mut self) -> Self {
        self.fail_upload = true;
        self
    }

    pub fn failing_optimize(mut self) -> Self {
        self.fail_optimize = true;
        self
    }

    pub fn failing_download(mut self) -> Self {
        self.fail_download = true;
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.unhealthy = true;
        self
    }

    /// Uploads block until `release_upload` is called.
    pub fn gated_upload(mut self) -> Self {
        self.gate_upload = true;
        self
    }

    /// Optimize calls block until `release_optimize` is called.
    pub fn gated_optimize(mut self) -> Self {
        self.gate_optimize = true;
        self
    }

    pub async fn wait_upload_started(&self) {
        self.upload_started.notified().await;
    }

    pub fn release_upload(&self) {
        self.upload_release.notify_one();
    }

    pub async fn wait_optimize_started(&self) {
        self.optimize_started.notified().await;
    }

    pub fn release_optimize(&self) {
        self.optimize_release.notify_one();
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn optimize_calls(&self) -> usize {
        self.optimize_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobApi for FakeJobApi {
    async fn upload(&self, _user_id: &str, _file: &ResumeFile) -> Result<UploadResponse, ApiError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if self.gate_upload {
            self.upload_started.notify_one();
            self.upload_release.notified().await;
        }
        if self.fail_upload {
            return Err(ApiError::Timeout {
                after: Duration::from_secs(60),
            });
        }
        Ok(UploadResponse {
            resume_id: "r1".to_string(),
            parsed_resume: json!({"name": "Ada Lovelace", "skills": ["Rust"]}),
        })
    }

    async fn optimize(
        &self,
        _user_id: &str,
        _resume_id: &str,
        _job_description: &str,
    ) -> Result<OptimizeResponse, ApiError> {
        self.optimize_calls.fetch_add(1, Ordering::SeqCst);
        if self.gate_optimize {
            self.optimize_started.notify_one();
            self.optimize_release.notified().await;
        }
        if self.fail_optimize {
            return Err(ApiError::Server {
                status: 500,
                message: "model overloaded".to_string(),
            });
        }
        Ok(OptimizeResponse {
            job_id: "j1".to_string(),
            enhanced_resume_id: "e1".to_string(),
            analysis: json!({"match_score": 82}),
        })
    }

    async fn download(&self, _resume_id: &str, _format: &str) -> Result<Bytes, ApiError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_download {
            return Err(ApiError::Server {
                status: 404,
                message: "not rendered".to_string(),
            });
        }
        Ok(Bytes::from_static(b"%PDF-1.7 enhanced"))
    }

    async fn health(&self) -> Result<HealthStatus, ApiError> {
        Ok(HealthStatus {
            status: if self.unhealthy { "down" } else { "ok" }.to_string(),
        })
    }
}

/// Replays a script of fetch results; the last entry repeats forever.
pub struct FakeJobStore {
    script: Vec<Option<OptimizationJobRow>>,
    fail: bool,
    calls: AtomicUsize,
}

impl FakeJobStore {
    pub fn scripted(script: Vec<Option<OptimizationJobRow>>) -> Self {
        Self {
            script,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            script: vec![None],
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobStore for FakeJobStore {
    async fn fetch_job(
        &self,
        _job_id: &str,
        _user_id: &str,
    ) -> Result<Option<OptimizationJobRow>, sqlx::Error> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(sqlx::Error::PoolTimedOut);
        }
        let index = call.min(self.script.len().saturating_sub(1));
        Ok(self.script.get(index).cloned().flatten())
    }
}

#[derive(Default)]
pub struct FakeObjectStore {
    objects: Mutex<HashMap<String, Bytes>>,
    public: bool,
    fail_signed: bool,
    fail_download: bool,
    exists_calls: AtomicUsize,
    signed_calls: AtomicUsize,
    download_calls: AtomicUsize,
    upload_calls: AtomicUsize,
}

impl FakeObjectStore {
    pub fn with_object(key: &str) -> Self {
        let store = Self::default();
        store
            .objects
            .lock()
            .unwrap()
            .insert(key.to_string(), Bytes::from_static(b"%PDF-1.7 enhanced"));
        store
    }

    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    pub fn failing_signed_urls(mut self) -> Self {
        self.fail_signed = true;
        self
    }

    pub fn failing_downloads(mut self) -> Self {
        self.fail_download = true;
        self
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    pub fn signed_calls(&self) -> usize {
        self.signed_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn exists(&self, path: &StoragePath) -> Result<bool, StorageError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.objects.lock().unwrap().contains_key(&path.key()))
    }

    fn public_url(&self, path: &StoragePath, variant: UrlVariant) -> Option<String> {
        if !self.public {
            return None;
        }
        let url = format!("https://storage.test/public/{}", path.key());
        Some(match variant {
            UrlVariant::View => url,
            UrlVariant::Download => format!("{url}?download={}", path.filename()),
        })
    }

    async fn signed_url(
        &self,
        path: &StoragePath,
        _expires_in: Duration,
        download_as: Option<&str>,
    ) -> Result<String, StorageError> {
        let n = self.signed_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_signed {
            return Err(StorageError::Backend("signing key rotated".to_string()));
        }
        let mut url = format!("https://storage.test/signed/{}?token={n}", path.key());
        if let Some(name) = download_as {
            url.push_str(&format!("&download={name}"));
        }
        Ok(url)
    }

    async fn download(&self, path: &StoragePath) -> Result<Bytes, StorageError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_download {
            return Err(StorageError::Backend("connection reset".to_string()));
        }
        self.objects
            .lock()
            .unwrap()
            .get(&path.key())
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.key()))
    }

    async fn upload(&self, path: &StoragePath, bytes: Bytes) -> Result<(), StorageError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().insert(path.key(), bytes);
        Ok(())
    }
}

pub struct FakeProbe {
    ok: bool,
    calls: AtomicUsize,
}

impl FakeProbe {
    pub fn ok() -> Self {
        Self {
            ok: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            ok: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UrlProbe for FakeProbe {
    async fn probe(&self, _url: &str) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.ok {
            Ok(())
        } else {
            Err(StorageError::Probe("HEAD returned 403 Forbidden".to_string()))
        }
    }
}

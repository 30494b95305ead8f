//! URL resolution for rendered resumes.
//!
//! Strategies are tried in `RESOLUTION_ORDER`; the first success wins and is
//! cached per (user, resume, format, variant). An absent object short-circuits
//! to `NotFound` before any strategy runs.
//!
//! The blob fallback keeps one local copy per document under
//! `{blob_dir}/{user_id}/{resume_id}/` and hands out a URL to
//! `GET /api/documents/:resume_id/blob`, which streams that copy.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{ObjectStore, StorageError, StoragePath, UrlVariant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Public bucket URL, trusted only after a HEAD probe succeeds.
    PublicUrl,
    /// Presigned URL with an explicit expiry.
    SignedUrl,
    /// Downloads the bytes and serves them from a local copy.
    BlobDownload,
}

pub const RESOLUTION_ORDER: [Strategy; 3] =
    [Strategy::PublicUrl, Strategy::SignedUrl, Strategy::BlobDownload];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedUrl {
    pub url: String,
    pub strategy: Strategy,
    pub variant: UrlVariant,
    pub filename: String,
}

/// Checks that a URL actually serves content.
#[async_trait]
pub trait UrlProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<(), StorageError>;
}

/// HEAD-request probe.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Probe(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UrlProbe for HttpProbe {
    async fn probe(&self, url: &str) -> Result<(), StorageError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| StorageError::Probe(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(StorageError::Probe(format!("HEAD returned {}", response.status())))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub user_id: String,
    pub resume_id: String,
    pub format: String,
    pub variant: UrlVariant,
}

impl CacheKey {
    fn new(path: &StoragePath, variant: UrlVariant) -> Self {
        Self {
            user_id: path.user_id.clone(),
            resume_id: path.resume_id.clone(),
            format: path.format.clone(),
            variant,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedUrl {
    resolved: ResolvedUrl,
    expires_at: Instant,
}

/// Process-wide cache of resolved URLs. Entries expire after a fixed TTL and
/// are only evicted when read after expiry.
pub struct UrlCache {
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, CachedUrl>>,
}

impl UrlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<ResolvedUrl> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(cached) if cached.expires_at > Instant::now() => Some(cached.resolved.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: CacheKey, resolved: ResolvedUrl) {
        let expires_at = Instant::now() + self.ttl;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, CachedUrl {
                resolved,
                expires_at,
            });
    }

    /// Drops every cached URL for a resume, in every format and variant.
    pub fn invalidate(&self, user_id: &str, resume_id: &str) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|key, _| !(key.user_id == user_id && key.resume_id == resume_id));
        before - entries.len()
    }
}

pub struct UrlResolver {
    store: Arc<dyn ObjectStore>,
    probe: Arc<dyn UrlProbe>,
    cache: UrlCache,
    signed_url_expiry: Duration,
    blob_dir: PathBuf,
}

impl UrlResolver {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        probe: Arc<dyn UrlProbe>,
        cache_ttl: Duration,
        signed_url_expiry: Duration,
        blob_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            probe,
            cache: UrlCache::new(cache_ttl),
            signed_url_expiry,
            blob_dir,
        }
    }

    /// Resolves a viewable or downloadable URL for a rendered resume.
    pub async fn resolve(
        &self,
        user_id: &str,
        resume_id: &str,
        format: &str,
        variant: UrlVariant,
    ) -> Result<ResolvedUrl, StorageError> {
        let path = StoragePath::new(user_id, resume_id, format)?;
        let key = CacheKey::new(&path, variant);

        if let Some(hit) = self.cache.get(&key) {
            debug!(path = %path, strategy = ?hit.strategy, "URL cache hit");
            return Ok(hit);
        }

        if !self.store.exists(&path).await? {
            info!(path = %path, "Document not in storage");
            return Err(StorageError::NotFound(path.key()));
        }

        let mut failures = Vec::with_capacity(RESOLUTION_ORDER.len());
        for strategy in RESOLUTION_ORDER {
            match self.attempt(strategy, &path, variant).await {
                Ok(url) => {
                    info!(path = %path, ?strategy, ?variant, "Resolved document URL");
                    let resolved = ResolvedUrl {
                        url,
                        strategy,
                        variant,
                        filename: path.filename(),
                    };
                    self.cache.insert(key, resolved.clone());
                    return Ok(resolved);
                }
                Err(e) => {
                    warn!(path = %path, ?strategy, "URL strategy failed: {e}");
                    failures.push(format!("{strategy:?}: {e}"));
                }
            }
        }

        Err(StorageError::Exhausted(failures.join("; ")))
    }

    async fn attempt(
        &self,
        strategy: Strategy,
        path: &StoragePath,
        variant: UrlVariant,
    ) -> Result<String, StorageError> {
        let filename = path.filename();
        match strategy {
            Strategy::PublicUrl => {
                let url = self
                    .store
                    .public_url(path, variant)
                    .ok_or(StorageError::NotConfigured("public storage URL"))?;
                self.probe.probe(&url).await?;
                Ok(url)
            }
            Strategy::SignedUrl => {
                let download_as = (variant == UrlVariant::Download).then_some(filename.as_str());
                self.store
                    .signed_url(path, self.signed_url_expiry, download_as)
                    .await
            }
            Strategy::BlobDownload => {
                let bytes = self.store.download(path).await?;
                self.write_blob(path, bytes).await?;
                Ok(blob_url(path, variant))
            }
        }
    }

    fn blob_path(&self, path: &StoragePath) -> PathBuf {
        self.blob_dir
            .join(&path.user_id)
            .join(&path.resume_id)
            .join(path.filename())
    }

    /// Replaces the local copy of a document. The bytes are staged in the
    /// same directory and renamed over the target, so readers never see a
    /// partial file.
    async fn write_blob(&self, path: &StoragePath, bytes: Bytes) -> Result<PathBuf, StorageError> {
        let target = self.blob_path(path);
        let dir = self.blob_dir.join(&path.user_id).join(&path.resume_id);
        tokio::fs::create_dir_all(&dir).await?;

        let staging = tempfile::NamedTempFile::new_in(&dir)?;
        tokio::fs::write(staging.path(), &bytes).await?;
        staging
            .persist(&target)
            .map_err(|e| StorageError::Io(e.error))?;

        debug!("Wrote {} bytes to {}", bytes.len(), target.display());
        Ok(target)
    }

    /// Bytes behind a blob URL. A missing local copy is fetched again from
    /// storage.
    pub async fn read_blob(
        &self,
        user_id: &str,
        resume_id: &str,
        format: &str,
    ) -> Result<(StoragePath, Bytes), StorageError> {
        let path = StoragePath::new(user_id, resume_id, format)?;
        match tokio::fs::read(self.blob_path(&path)).await {
            Ok(bytes) => Ok((path, Bytes::from(bytes))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if !self.store.exists(&path).await? {
                    return Err(StorageError::NotFound(path.key()));
                }
                let bytes = self.store.download(&path).await?;
                self.write_blob(&path, bytes.clone()).await?;
                Ok((path, bytes))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Uploads a document, replacing the stored one, and forgets any URL
    /// cached for that resume.
    pub async fn store_document(
        &self,
        user_id: &str,
        resume_id: &str,
        format: &str,
        bytes: Bytes,
    ) -> Result<StoragePath, StorageError> {
        let path = StoragePath::new(user_id, resume_id, format)?;
        self.store.upload(&path, bytes).await?;
        match tokio::fs::remove_file(self.blob_path(&path)).await {
            Ok(()) => debug!(path = %path, "Removed stale local copy"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path, "Could not remove stale local copy: {e}"),
        }
        let dropped = self.cache.invalidate(user_id, resume_id);
        info!(path = %path, dropped, "Stored document, cached URLs invalidated");
        Ok(path)
    }
}

/// Path of the route that serves a document's local copy.
fn blob_url(path: &StoragePath, variant: UrlVariant) -> String {
    format!(
        "/api/documents/{}/blob?format={}&variant={}",
        path.resume_id,
        path.format,
        variant.as_str()
    )
}

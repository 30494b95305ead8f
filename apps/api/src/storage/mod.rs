//! Object storage for rendered resumes.
//!
//! Objects live at `{user_id}/{resume_id}/enhanced_resume_{resume_id}.{format}`.
//! `ObjectStore` is the seam to the hosted bucket; `S3ObjectStore` talks to
//! it through the S3 API (MinIO locally, the BaaS bucket in production).

pub mod resolver;
pub mod sync;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub use resolver::{ResolvedUrl, UrlResolver};

const SUPPORTED_FORMATS: [&str; 2] = ["pdf", "docx"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object {0} does not exist")]
    NotFound(String),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("URL probe failed: {0}")]
    Probe(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("blob write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("every URL strategy failed ({0})")]
    Exhausted(String),
}

/// Inline preview or forced download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlVariant {
    #[default]
    View,
    Download,
}

impl UrlVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            UrlVariant::View => "view",
            UrlVariant::Download => "download",
        }
    }

    /// `Content-Disposition` disposition type for this variant.
    pub fn disposition(self) -> &'static str {
        match self {
            UrlVariant::View => "inline",
            UrlVariant::Download => "attachment",
        }
    }
}

/// Deterministic location of a rendered resume.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoragePath {
    pub user_id: String,
    pub resume_id: String,
    pub format: String,
}

impl StoragePath {
    pub fn new(user_id: &str, resume_id: &str, format: &str) -> Result<Self, StorageError> {
        for (label, part) in [("user id", user_id), ("resume id", resume_id)] {
            if part.is_empty()
                || part.contains(['/', '\\'])
                || part.contains("..")
            {
                return Err(StorageError::InvalidKey(format!("{label} '{part}'")));
            }
        }
        let format = format.trim().to_ascii_lowercase();
        if !SUPPORTED_FORMATS.contains(&format.as_str()) {
            return Err(StorageError::InvalidKey(format!("format '{format}'")));
        }

        Ok(Self {
            user_id: user_id.to_string(),
            resume_id: resume_id.to_string(),
            format,
        })
    }

    /// Prefix used for the existence check.
    pub fn prefix(&self) -> String {
        format!("{}/{}/", self.user_id, self.resume_id)
    }

    pub fn filename(&self) -> String {
        format!("enhanced_resume_{}.{}", self.resume_id, self.format)
    }

    pub fn key(&self) -> String {
        format!("{}{}", self.prefix(), self.filename())
    }

    pub fn content_type(&self) -> &'static str {
        match self.format.as_str() {
            "pdf" => "application/pdf",
            _ => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        }
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Operations the resolver needs from the bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Existence check via list-with-prefix.
    async fn exists(&self, path: &StoragePath) -> Result<bool, StorageError>;

    /// Unauthenticated URL, if the bucket is publicly readable.
    fn public_url(&self, path: &StoragePath, variant: UrlVariant) -> Option<String>;

    async fn signed_url(
        &self,
        path: &StoragePath,
        expires_in: Duration,
        download_as: Option<&str>,
    ) -> Result<String, StorageError>;

    async fn download(&self, path: &StoragePath) -> Result<Bytes, StorageError>;

    /// Writes the object, replacing any previous version.
    async fn upload(&self, path: &StoragePath, bytes: Bytes) -> Result<(), StorageError>;
}

pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base: Option<String>,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String, public_base: Option<String>) -> Self {
        Self {
            client,
            bucket,
            public_base,
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn exists(&self, path: &StoragePath) -> Result<bool, StorageError> {
        let key = path.key();
        let listing = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(path.prefix())
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("list {}: {e}", path.prefix())))?;

        let found = listing
            .contents()
            .iter()
            .any(|object| object.key() == Some(key.as_str()));
        debug!(key, found, "Existence check");
        Ok(found)
    }

    fn public_url(&self, path: &StoragePath, variant: UrlVariant) -> Option<String> {
        let base = self.public_base.as_ref()?;
        let url = format!("{base}/{}/{}", self.bucket, path.key());
        Some(match variant {
            UrlVariant::View => url,
            UrlVariant::Download => format!("{url}?download={}", path.filename()),
        })
    }

    async fn signed_url(
        &self,
        path: &StoragePath,
        expires_in: Duration,
        download_as: Option<&str>,
    ) -> Result<String, StorageError> {
        let presign = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::Backend(format!("presigning config: {e}")))?;

        let mut request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path.key());
        if let Some(filename) = download_as {
            request =
                request.response_content_disposition(format!("attachment; filename=\"{filename}\""));
        }

        let presigned = request
            .presigned(presign)
            .await
            .map_err(|e| StorageError::Backend(format!("presign {path}: {e}")))?;
        Ok(presigned.uri().to_string())
    }

    async fn download(&self, path: &StoragePath) -> Result<Bytes, StorageError> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path.key())
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("get {path}: {e}")))?;

        let data = object
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(format!("read {path}: {e}")))?;
        Ok(data.into_bytes())
    }

    async fn upload(&self, path: &StoragePath, bytes: Bytes) -> Result<(), StorageError> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path.key())
            .body(ByteStream::from(bytes))
            .content_type(path.content_type())
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("put {path}: {e}")))?;

        info!("Uploaded {size} bytes to s3://{}/{}", self.bucket, path.key());
        Ok(())
    }
}

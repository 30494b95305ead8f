use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Dashboard configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub job_api_url: String,
    pub database_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    /// Base for public object URLs, e.g. `https://x.supabase.co/storage/v1/object/public`.
    /// Without it the public-URL strategy is skipped.
    pub storage_public_url: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub api_timeout: Duration,
    pub poll: PollSettings,
    pub url_cache_ttl: Duration,
    pub signed_url_expiry: Duration,
    pub render_delay: Duration,
    pub blob_dir: PathBuf,
}

/// Result poller bounds.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 30,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            job_api_url: require_env("JOB_API_URL")?
                .trim_end_matches('/')
                .to_string(),
            database_url: require_env("DATABASE_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            storage_public_url: std::env::var("STORAGE_PUBLIC_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.trim_end_matches('/').to_string()),
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            api_timeout: Duration::from_secs(parse_env("API_TIMEOUT_SECS", 60)?),
            poll: PollSettings {
                interval: Duration::from_secs(parse_env("POLL_INTERVAL_SECS", 5)?),
                max_attempts: parse_env("POLL_MAX_ATTEMPTS", 30)?,
            },
            url_cache_ttl: Duration::from_secs(parse_env("URL_CACHE_TTL_SECS", 600)?),
            signed_url_expiry: Duration::from_secs(parse_env("SIGNED_URL_EXPIRY_SECS", 3600)?),
            render_delay: Duration::from_millis(parse_env("RENDER_DELAY_MS", 1500)?),
            blob_dir: std::env::var("BLOB_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("dashboard-blobs")),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}

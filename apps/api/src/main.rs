mod api_client;
mod config;
mod db;
mod errors;
mod models;
mod pipeline;
mod poller;
mod routes;
mod session;
mod state;
mod storage;
#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::api_client::{probe_health, JobApiClient};
use crate::config::Config;
use crate::db::{create_pool, PgJobStore};
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::resolver::HttpProbe;
use crate::storage::{S3ObjectStore, UrlResolver};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting resume dashboard v{}", env!("CARGO_PKG_VERSION"));

    // Job rows live in the BaaS database
    let db = create_pool(&config.database_url).await?;
    let jobs = Arc::new(PgJobStore::new(db));

    // Object storage
    let s3 = build_s3_client(&config).await;
    let object_store = Arc::new(S3ObjectStore::new(
        s3,
        config.s3_bucket.clone(),
        config.storage_public_url.clone(),
    ));
    let probe = Arc::new(HttpProbe::new(config.api_timeout)?);
    let resolver = UrlResolver::new(
        object_store,
        probe,
        config.url_cache_ttl,
        config.signed_url_expiry,
        config.blob_dir.clone(),
    );
    info!("Object storage initialized (bucket: {})", config.s3_bucket);

    // Remote optimization API
    let api = Arc::new(JobApiClient::new(&config.job_api_url, config.api_timeout)?);
    info!("Job API client initialized ({})", config.job_api_url);

    let state = AppState::new(
        api.clone(),
        jobs,
        resolver,
        config.poll,
        config.render_delay,
    );

    // Upload and enhancement stay disabled until the API answers healthy
    let health = probe_health(api.as_ref()).await;
    info!("Job API health: {:?}", health);
    state.set_api_health(health);

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict CORS to the dashboard origin

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or the hosted bucket.
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "dashboard-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&s3_config)
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(s3_config)
}

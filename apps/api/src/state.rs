use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::api_client::{ApiHealth, JobApi};
use crate::config::PollSettings;
use crate::db::JobStore;
use crate::errors::AppError;
use crate::pipeline::PipelineRegistry;
use crate::poller::{ResultPoller, ResultWatchers};
use crate::storage::UrlResolver;

/// Shared application state injected into all route handlers via Axum extractors.
/// Everything a view needs is reachable from here; there is no ambient global.
#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn JobApi>,
    pub pipelines: Arc<PipelineRegistry>,
    pub results: Arc<ResultWatchers>,
    pub resolver: Arc<UrlResolver>,
    api_health: Arc<RwLock<ApiHealth>>,
}

impl AppState {
    pub fn new(
        api: Arc<dyn JobApi>,
        jobs: Arc<dyn JobStore>,
        resolver: UrlResolver,
        poll: PollSettings,
        render_delay: Duration,
    ) -> Self {
        Self {
            pipelines: Arc::new(PipelineRegistry::new(Arc::clone(&api), render_delay)),
            results: Arc::new(ResultWatchers::new(ResultPoller::new(jobs, poll))),
            resolver: Arc::new(resolver),
            api_health: Arc::new(RwLock::new(ApiHealth::Unknown)),
            api,
        }
    }

    pub fn api_health(&self) -> ApiHealth {
        self.api_health
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_api_health(&self, health: ApiHealth) {
        *self
            .api_health
            .write()
            .unwrap_or_else(PoisonError::into_inner) = health;
    }

    /// Upload and enhancement stay disabled until the remote API is known healthy.
    pub fn require_controls(&self) -> Result<(), AppError> {
        match self.api_health() {
            ApiHealth::Healthy => Ok(()),
            ApiHealth::Unknown => Err(AppError::Unavailable(
                "optimization service health not checked yet".to_string(),
            )),
            ApiHealth::Unhealthy(reason) => Err(AppError::Unavailable(reason)),
        }
    }
}

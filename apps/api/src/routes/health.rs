use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::api_client::probe_health;
use crate::state::AppState;

/// GET /health
/// Returns service status and the last known health of the optimization API.
/// A negative or unknown result is re-probed, like a dashboard reload would.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let mut job_api = state.api_health();
    if !job_api.controls_enabled() {
        job_api = probe_health(state.api.as_ref()).await;
        state.set_api_health(job_api.clone());
    }

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "resume-dashboard",
        "job_api": job_api,
        "controls_enabled": job_api.controls_enabled()
    }))
}

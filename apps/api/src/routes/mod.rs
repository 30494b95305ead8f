pub mod documents;
pub mod health;
pub mod pipeline;
pub mod results;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// Resumes larger than this are rejected before they reach the pipeline.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Pipeline
        .route(
            "/api/pipeline",
            get(pipeline::handle_get_pipeline).delete(pipeline::handle_reset_pipeline),
        )
        .route(
            "/api/pipeline/upload",
            post(pipeline::handle_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/pipeline/enhance", post(pipeline::handle_enhance))
        .route(
            "/api/pipeline/notifications",
            get(pipeline::handle_notifications),
        )
        // Results
        .route(
            "/api/results",
            get(results::handle_get_result).delete(results::handle_close_result),
        )
        .route("/api/results/retry", post(results::handle_retry_result))
        // Documents
        .route(
            "/api/documents/:resume_id",
            get(documents::handle_get_document_url),
        )
        .route(
            "/api/documents/:resume_id/blob",
            get(documents::handle_get_blob),
        )
        .route(
            "/api/documents/:resume_id/sync",
            post(documents::handle_sync_document),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::api_client::ApiHealth;
    use crate::config::PollSettings;
    use crate::session::USER_HEADER;
    use crate::storage::UrlResolver;
    use crate::testing::{job_row, FakeJobApi, FakeJobStore, FakeObjectStore, FakeProbe};

    const BOUNDARY: &str = "dashboard-test-boundary";

    fn test_state(api: FakeJobApi) -> AppState {
        let resolver = UrlResolver::new(
            Arc::new(FakeObjectStore::default()),
            Arc::new(FakeProbe::ok()),
            Duration::from_secs(600),
            Duration::from_secs(3600),
            std::env::temp_dir(),
        );
        AppState::new(
            Arc::new(api),
            Arc::new(FakeJobStore::scripted(vec![Some(job_row("j1", "completed"))])),
            resolver,
            PollSettings::default(),
            Duration::from_millis(10),
        )
    }

    fn healthy_app() -> Router {
        let state = test_state(FakeJobApi::default());
        state.set_api_health(ApiHealth::Healthy);
        build_router(state)
    }

    fn upload_request(user: Option<&str>) -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"resume.pdf\"\r\n\
             Content-Type: application/pdf\r\n\r\n\
             %PDF-1.7 original\r\n\
             --{BOUNDARY}--\r\n"
        );
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/pipeline/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header(USER_HEADER, "u1")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(USER_HEADER, "u1")
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_controls_disabled_until_health_known() {
        let app = build_router(test_state(FakeJobApi::default()));

        let response = app.oneshot(upload_request(Some("u1"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_health_probe_enables_controls() {
        let state = test_state(FakeJobApi::default());
        let app = build_router(state.clone());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["controls_enabled"], true);
        assert_eq!(state.api_health(), ApiHealth::Healthy);
    }

    #[tokio::test]
    async fn test_unhealthy_api_keeps_controls_disabled() {
        let state = test_state(FakeJobApi::default().unhealthy());
        let app = build_router(state.clone());

        app.clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/pipeline/enhance",
                json!({"job_description": "Rust engineer"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_upload_without_user_is_unauthorized() {
        let response = healthy_app().oneshot(upload_request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_upload_then_enhance_flow() {
        let app = healthy_app();

        let response = app
            .clone()
            .oneshot(upload_request(Some("u1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["state"], "uploaded");
        assert_eq!(body["resume_id"], "r1");
        assert_eq!(body["parsed_resume"]["name"], "Ada Lovelace");

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/pipeline/enhance",
                json!({"job_description": "Senior Backend Engineer"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "started");
        assert_eq!(body["pipeline"]["enhancement"]["job_id"], "j1");

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/pipeline/enhance",
                json!({"job_description": "Senior Backend Engineer"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .oneshot(get_request("/api/pipeline/notifications"))
            .await
            .unwrap();
        let notifications = body_json(response).await;
        let errors: Vec<&Value> = notifications
            .as_array()
            .unwrap()
            .iter()
            .filter(|n| n["level"] == "error")
            .collect();
        assert_eq!(errors.len(), 1);
    }

    #[tokio::test]
    async fn test_upload_without_file_field_is_notified() {
        let app = healthy_app();
        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"note\"\r\n\r\n\
             hello\r\n\
             --{BOUNDARY}--\r\n"
        );
        let request = Request::builder()
            .method("POST")
            .uri("/api/pipeline/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(USER_HEADER, "u1")
            .body(Body::from(body))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(get_request("/api/pipeline/notifications"))
            .await
            .unwrap();
        let notifications = body_json(response).await;
        let notifications = notifications.as_array().unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0]["level"], "error");

        let response = app.oneshot(get_request("/api/pipeline")).await.unwrap();
        assert_eq!(body_json(response).await["state"], "not_uploaded");
    }

    #[tokio::test]
    async fn test_blank_job_description_is_bad_request() {
        let app = healthy_app();
        app.clone()
            .oneshot(upload_request(Some("u1")))
            .await
            .unwrap();

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/pipeline/enhance",
                json!({"job_description": ""}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_results_without_job_id_is_not_found() {
        let response = healthy_app()
            .oneshot(get_request("/api/results"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_results_become_ready() {
        let app = healthy_app();

        let response = app
            .clone()
            .oneshot(get_request("/api/results?job_id=j1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let response = app
            .clone()
            .oneshot(get_request("/api/results?job_id=j1"))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["status"], "ready");
        assert_eq!(body["result"]["score_delta"], 20.0);

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/results?job_id=j1")
                    .header(USER_HEADER, "u1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_missing_document_is_not_found() {
        let response = healthy_app()
            .oneshot(get_request("/api/documents/r1?variant=download"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_sync_then_resolve_document() {
        let app = healthy_app();

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/documents/e1/sync", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["key"], "u1/e1/enhanced_resume_e1.pdf");

        let response = app
            .oneshot(get_request("/api/documents/e1?variant=download"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["strategy"], "signed_url");
        assert_eq!(body["filename"], "enhanced_resume_e1.pdf");
    }

    #[tokio::test]
    async fn test_blob_url_is_served_by_the_service() {
        let blob_dir = tempfile::tempdir().unwrap();
        let resolver = UrlResolver::new(
            Arc::new(
                FakeObjectStore::with_object("u1/r1/enhanced_resume_r1.pdf").failing_signed_urls(),
            ),
            Arc::new(FakeProbe::ok()),
            Duration::from_secs(600),
            Duration::from_secs(3600),
            blob_dir.path().to_path_buf(),
        );
        let state = AppState::new(
            Arc::new(FakeJobApi::default()),
            Arc::new(FakeJobStore::scripted(vec![None])),
            resolver,
            PollSettings::default(),
            Duration::from_millis(10),
        );
        let app = build_router(state);

        let response = app
            .clone()
            .oneshot(get_request("/api/documents/r1?variant=download"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["strategy"], "blob_download");
        let url = body["url"].as_str().unwrap().to_string();

        let response = app.oneshot(get_request(&url)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "application/pdf");
        assert_eq!(
            response.headers()["content-disposition"],
            "attachment; filename=\"enhanced_resume_r1.pdf\""
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"%PDF-1.7 enhanced");
    }
}

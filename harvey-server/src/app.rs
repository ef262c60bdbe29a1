//! Axum router wiring, grounded on `hi-youichi-loom/serve`'s
//! `router(state) -> Router` shape.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::{delete_pricing, get_events, get_health, get_static, post_chat, post_upload};
use crate::state::AppState;

/// Build the full HTTP surface of the Chat Facade (C8).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(post_chat))
        .route("/events", get(get_events))
        .route("/upload", post(post_upload))
        .route("/pricing/:id", delete(delete_pricing))
        .route("/static/:id", get(get_static))
        .route("/health", get(get_health))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use harvey_adapters::{HttpAnalysisAdapter, HttpExtractorAdapter};
    use harvey_cache::{CacheConfig, PricingContextCache};
    use harvey_llm::HttpProvider;
    use harvey_notify::NotifyBus;
    use harvey_session::SessionStore;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let notify = Arc::new(NotifyBus::new());
        let extractor = HttpExtractorAdapter::new("http://127.0.0.1:9");
        let cache = Arc::new(PricingContextCache::new(extractor, notify.clone(), CacheConfig::default()));
        let analysis = Arc::new(HttpAnalysisAdapter::new("http://127.0.0.1:9"));
        let blobs = Arc::new(harvey_blob::FsBlobStore::open(dir.path()).await.unwrap());
        let provider = Arc::new(HttpProvider::new("test-key", "test-model"));
        let sessions = Arc::new(SessionStore::new());
        let config = Arc::new(crate::config::ServerConfig {
            openai_model: "test-model".to_string(),
            openai_api_key: "test-key".to_string(),
            amint_base_url: "http://127.0.0.1:9".to_string(),
            analysis_base_url: "http://127.0.0.1:9".to_string(),
            cache_backend: crate::config::CacheBackend::Memory,
            http_host: "127.0.0.1".to_string(),
            http_port: 0,
            log_level: "info".to_string(),
            step_budget: 8,
            cache_ttl: Duration::from_secs(60),
            session_idle_ttl: Duration::from_secs(60),
        });

        let state = AppState {
            config,
            sessions,
            cache,
            analysis,
            notify,
            blobs,
            provider,
            loop_config: harvey_loop::LoopConfig::default(),
        };
        (state, dir)
    }

    #[tokio::test]
    async fn health_reports_up() {
        let (state, _dir) = test_state().await;
        let app = router(state);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn upload_static_delete_round_trip() {
        let (state, _dir) = test_state().await;
        let app = router(state);

        let boundary = "testboundary";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"x.yaml\"\r\nContent-Type: text/plain\r\n\r\nfeatures: []\r\n--{boundary}--\r\n"
        );
        let upload_response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/upload")
                    .header("content-type", format!("multipart/form-data; boundary={boundary}"))
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(upload_response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(upload_response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let relative_url = parsed["relative_url"].as_str().unwrap().to_string();

        let get_response = app
            .clone()
            .oneshot(Request::builder().uri(&relative_url).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(get_response.status(), StatusCode::OK);

        let delete_uri = relative_url.replacen("/static/", "/pricing/", 1);
        let delete_response = app
            .clone()
            .oneshot(Request::builder().method("DELETE").uri(&delete_uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(delete_response.status(), StatusCode::NO_CONTENT);

        let missing_response = app
            .oneshot(Request::builder().uri(&relative_url).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing_response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chat_rejects_empty_question() {
        let (state, _dir) = test_state().await;
        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&serde_json::json!({"question": ""})).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

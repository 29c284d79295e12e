use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use tracing::info;

use crate::AppState;

pub const MAX_URL_LEN: usize = 2048;

#[derive(Deserialize)]
pub struct ExtractAvatarRequest {
    website_url: String,
}

fn bad_request(message: &str) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

/// `POST /extract_avatar`: `{website_url}` in, `{avatar_url}` out.
///
/// Anything that goes wrong inside the pipeline is reported as a null
/// `avatar_url`, never as an error status.
pub async fn extract_avatar(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExtractAvatarRequest>,
) -> impl IntoResponse {
    let url = body.website_url.trim();
    if url.is_empty() {
        return bad_request("website_url is required");
    }
    if url.len() > MAX_URL_LEN {
        return bad_request("URL too long (max 2048 characters)");
    }

    let result = state.discovery.discover_avatar(url).await;
    info!(found = result.avatar_url.is_some(), "Avatar extraction finished");

    Json(result).into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    use avatar_core::{AppConfig, AvatarDiscovery, DiscoveryConfig};

    use super::*;
    use crate::router;

    fn app() -> axum::Router {
        let config = AppConfig {
            ollama_url: "http://127.0.0.1:1".to_string(),
            vision_model: "test-vision".to_string(),
            api_host: "127.0.0.1".to_string(),
            api_port: 0,
            discovery: DiscoveryConfig::default(),
        };
        router(Arc::new(AppState {
            discovery: AvatarDiscovery::from_config(&config),
        }))
    }

    async fn post_json(body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let request = Request::post("/extract_avatar")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_says_ok() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn empty_url_is_rejected() {
        let (status, body) = post_json(serde_json::json!({ "website_url": "  " })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn overlong_url_is_rejected() {
        let url = format!("https://example.com/{}", "a".repeat(MAX_URL_LEN));
        let (status, _) = post_json(serde_json::json!({ "website_url": url })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unsafe_url_yields_null_avatar() {
        let (status, body) =
            post_json(serde_json::json!({ "website_url": "http://127.0.0.1/admin" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "avatar_url": null }));
    }
}

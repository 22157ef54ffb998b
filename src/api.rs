//! Unified API router for factkeeper
//!
//! Merges the review router with the health probe and CORS.
//!
//! ## Endpoint Map
//!
//! | Prefix              | Module | Description                       |
//! |---------------------|--------|-----------------------------------|
//! | `/health`           | api    | Health probe with store status    |
//! | `/api/v1/users/*`   | review | Users, summaries, facts, markers  |
//! | `/api/v1/facts/*`   | review | Review queue, approve, reject     |
//! | `/api/v1/reprocess*`| review | Reprocessing of rejected facts    |
//! | `/api/v1/process*`  | review | Pipeline runs, single and batch   |
//! | `/api/v1/stats`     | review | Store-wide statistics             |

use crate::review::{review_router, ReviewState};
use crate::store::FactStore;
use axum::{
    extract::State,
    http::{header, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the complete factkeeper HTTP application
pub fn build_app(review_state: ReviewState, cors_origins: &[String]) -> Router {
    let health = Router::new()
        .route("/health", get(health_check))
        .with_state(review_state.store.clone());

    Router::new()
        .merge(health)
        .merge(review_router(review_state))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors(cors_origins))
}

// =============================================================================
// Root handlers
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    store: String,
}

async fn health_check(State(store): State<Arc<dyn FactStore>>) -> impl IntoResponse {
    let store_status = if store.ping().await { "ok" } else { "unreachable" };
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: store_status.to_string(),
    })
}

// =============================================================================
// CORS
// =============================================================================

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FactKeeperConfig;
    use crate::extraction::testing::ScriptedExtractionClient;
    use crate::pipeline::Pipeline;
    use crate::store::InMemoryFactStore;
    use crate::transcript::MemorySource;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn make_app() -> Router {
        let pipeline = Pipeline::new(
            Arc::new(ScriptedExtractionClient::from_replies(vec![])),
            Arc::new(InMemoryFactStore::new()),
            &FactKeeperConfig::default(),
        )
        .unwrap();
        let state = ReviewState::new(Arc::new(pipeline), Arc::new(MemorySource::new()));
        build_app(state, &[])
    }

    #[tokio::test]
    async fn test_health_check() {
        let resp = make_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["store"], "ok");
    }

    #[tokio::test]
    async fn test_review_routes_mounted() {
        let resp = make_app()
            .oneshot(Request::builder().uri("/api/v1/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn test_build_cors_empty_origins() {
        let _cors = build_cors(&[]);
    }

    #[test]
    fn test_build_cors_with_origins() {
        let _cors = build_cors(&[
            "http://localhost:5173".to_string(),
            "https://review.example.com".to_string(),
        ]);
    }
}

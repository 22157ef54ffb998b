//! HTTP handlers for the review API
//!
//! Endpoints:
//! - GET    /api/v1/users                      list users with facts
//! - GET    /api/v1/users/:user_id/summary     status breakdown
//! - GET    /api/v1/users/:user_id/facts       facts, optional `?layer=`
//! - DELETE /api/v1/users/:user_id/marker      mark a user unprocessed
//! - GET    /api/v1/facts/pending              review queue
//! - POST   /api/v1/facts/:id/approve          approve a fact
//! - POST   /api/v1/facts/:id/reject           reject and flag for reprocessing
//! - POST   /api/v1/facts/:id/reprocess        reprocess one rejected fact
//! - GET    /api/v1/reprocess/candidates       flagged facts
//! - POST   /api/v1/reprocess                  reprocess the flagged queue
//! - POST   /api/v1/process/:user_id           run the pipeline for one user
//! - POST   /api/v1/process                    batch run
//! - GET    /api/v1/stats                      store-wide statistics

use super::types::*;
use crate::error::{Error, Result};
use crate::extraction::Layer;
use crate::pipeline::{BatchRunner, Pipeline, Reprocessor};
use crate::store::{FactQuery, FactStatus, FactStore};
use crate::transcript::TranscriptSource;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

const DEFAULT_PENDING_LIMIT: usize = 50;
const DEFAULT_REPROCESS_LIMIT: usize = 10;
const DEFAULT_REVIEWER: &str = "reviewer";

/// Shared state for review handlers
#[derive(Clone)]
pub struct ReviewState {
    pub store: Arc<dyn FactStore>,
    pub source: Arc<dyn TranscriptSource>,
    pub pipeline: Arc<Pipeline>,
    pub reprocessor: Arc<Reprocessor>,
    pub batch: Arc<BatchRunner>,
}

impl ReviewState {
    pub fn new(pipeline: Arc<Pipeline>, source: Arc<dyn TranscriptSource>) -> Self {
        Self {
            store: pipeline.store().clone(),
            reprocessor: Arc::new(Reprocessor::new(pipeline.clone(), source.clone())),
            batch: Arc::new(BatchRunner::new(pipeline.clone(), source.clone())),
            source,
            pipeline,
        }
    }
}

/// Create the review router
pub fn review_router(state: ReviewState) -> Router {
    Router::new()
        .route("/api/v1/users", get(list_users))
        .route("/api/v1/users/:user_id/summary", get(user_summary))
        .route("/api/v1/users/:user_id/facts", get(user_facts))
        .route("/api/v1/users/:user_id/marker", delete(mark_unprocessed))
        .route("/api/v1/facts/pending", get(pending_facts))
        .route("/api/v1/facts/:id/approve", post(approve_fact))
        .route("/api/v1/facts/:id/reject", post(reject_fact))
        .route("/api/v1/facts/:id/reprocess", post(reprocess_fact))
        .route("/api/v1/reprocess/candidates", get(reprocess_candidates))
        .route("/api/v1/reprocess", post(reprocess_pending))
        .route("/api/v1/process/:user_id", post(process_user))
        .route("/api/v1/process", post(process_batch))
        .route("/api/v1/stats", get(system_stats))
        .with_state(state)
}

fn respond<T: Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(err) => error_response(&err),
    }
}

fn error_response(err: &Error) -> Response {
    if status_for(err).is_server_error() {
        tracing::warn!(error = %err, "Review request failed");
    }
    (status_for(err), Json(ApiError::from(err))).into_response()
}

fn parse_layer(raw: Option<&str>) -> Result<Option<Layer>> {
    raw.filter(|s| !s.trim().is_empty())
        .map(str::parse)
        .transpose()
}

fn views(records: Vec<crate::store::FactRecord>) -> Vec<FactView> {
    records.into_iter().map(FactView::from).collect()
}

// =============================================================================
// Users
// =============================================================================

/// GET /api/v1/users
async fn list_users(State(state): State<ReviewState>) -> Response {
    respond(state.store.list_users().await)
}

/// GET /api/v1/users/:user_id/summary
async fn user_summary(
    State(state): State<ReviewState>,
    Path(user_id): Path<String>,
) -> Response {
    respond(state.store.user_summary(&user_id).await)
}

/// GET /api/v1/users/:user_id/facts?layer=Layer1
async fn user_facts(
    State(state): State<ReviewState>,
    Path(user_id): Path<String>,
    Query(params): Query<LayerParams>,
) -> Response {
    let result = async {
        let layer = parse_layer(params.layer.as_deref())?;
        let records = state
            .store
            .query_facts(&FactQuery::for_user(user_id).with_layer(layer))
            .await?;
        Ok::<_, Error>(views(records))
    }
    .await;
    respond(result)
}

/// DELETE /api/v1/users/:user_id/marker
async fn mark_unprocessed(
    State(state): State<ReviewState>,
    Path(user_id): Path<String>,
) -> Response {
    respond(
        state
            .store
            .delete_marker(&user_id)
            .await
            .map(|removed| serde_json::json!({ "userId": user_id, "removed": removed })),
    )
}

// =============================================================================
// Review actions
// =============================================================================

/// GET /api/v1/facts/pending?limit=&layer=
async fn pending_facts(
    State(state): State<ReviewState>,
    Query(params): Query<PendingParams>,
) -> Response {
    let result = async {
        let layer = parse_layer(params.layer.as_deref())?;
        let query = FactQuery::default()
            .with_status(FactStatus::Pending)
            .with_layer(layer)
            .with_limit(params.limit.unwrap_or(DEFAULT_PENDING_LIMIT));
        Ok::<_, Error>(views(state.store.query_facts(&query).await?))
    }
    .await;
    respond(result)
}

async fn review(
    state: &ReviewState,
    id: &str,
    status: FactStatus,
    request: Option<Json<ReviewRequest>>,
) -> Response {
    let reviewer = request
        .and_then(|Json(r)| r.reviewed_by)
        .unwrap_or_else(|| DEFAULT_REVIEWER.to_string());
    let result = state.store.update_status(id, status, &reviewer).await;
    if result.is_ok() {
        tracing::info!(fact_id = %id, status = %status, reviewer = %reviewer, "Fact reviewed");
    }
    respond(result.map(FactView::from))
}

/// POST /api/v1/facts/:id/approve
async fn approve_fact(
    State(state): State<ReviewState>,
    Path(id): Path<String>,
    request: Option<Json<ReviewRequest>>,
) -> Response {
    review(&state, &id, FactStatus::Approved, request).await
}

/// POST /api/v1/facts/:id/reject
async fn reject_fact(
    State(state): State<ReviewState>,
    Path(id): Path<String>,
    request: Option<Json<ReviewRequest>>,
) -> Response {
    review(&state, &id, FactStatus::Rejected, request).await
}

// =============================================================================
// Reprocessing
// =============================================================================

/// POST /api/v1/facts/:id/reprocess
async fn reprocess_fact(State(state): State<ReviewState>, Path(id): Path<String>) -> Response {
    respond(state.reprocessor.reprocess(&id).await)
}

/// GET /api/v1/reprocess/candidates?limit=
async fn reprocess_candidates(
    State(state): State<ReviewState>,
    Query(params): Query<LimitParams>,
) -> Response {
    let limit = params.limit.unwrap_or(DEFAULT_PENDING_LIMIT);
    respond(state.store.rejected_for_reprocessing(limit).await.map(views))
}

/// POST /api/v1/reprocess?limit=
async fn reprocess_pending(
    State(state): State<ReviewState>,
    Query(params): Query<LimitParams>,
) -> Response {
    let limit = params.limit.unwrap_or(DEFAULT_REPROCESS_LIMIT);
    respond(state.reprocessor.reprocess_pending(limit).await)
}

// =============================================================================
// Processing
// =============================================================================

/// POST /api/v1/process/:user_id?force=
async fn process_user(
    State(state): State<ReviewState>,
    Path(user_id): Path<String>,
    Query(params): Query<ForceParams>,
) -> Response {
    let result = async {
        let conversations = state.source.load(&user_id).await?;
        state
            .pipeline
            .process(&user_id, &conversations, params.force)
            .await
    }
    .await;
    respond(result)
}

/// POST /api/v1/process?force=
async fn process_batch(
    State(state): State<ReviewState>,
    Query(params): Query<ForceParams>,
    request: Option<Json<BatchRequest>>,
) -> Response {
    let users = request.and_then(|Json(r)| r.users);
    respond(state.batch.run(users, params.force).await)
}

/// GET /api/v1/stats
async fn system_stats(State(state): State<ReviewState>) -> Response {
    respond(state.store.system_stats().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FactKeeperConfig;
    use crate::extraction::testing::ScriptedExtractionClient;
    use crate::extraction::Evidence;
    use crate::store::{ExtractionMethod, InMemoryFactStore, NewFact};
    use crate::transcript::{Conversation, MemorySource, RawEntry};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    const REPLY: &str = r#"{"Layer1": [{"detail": {"type": "email", "value": "asha@example.com"},
        "confidence": 0.92, "evidence": [{"message_id": "u1", "message_snippet": "mail me at asha@example.com"}]}]}"#;

    async fn make_app() -> (Router, Arc<InMemoryFactStore>) {
        let store = Arc::new(InMemoryFactStore::new());
        let client = ScriptedExtractionClient::routed(REPLY, Err(Error::Extraction("down".into())));
        let pipeline = Arc::new(
            Pipeline::new(Arc::new(client), store.clone(), &FactKeeperConfig::default()).unwrap(),
        );
        let source = Arc::new(MemorySource::new());
        source
            .insert(
                "asha",
                vec![Conversation {
                    user_queries: vec![RawEntry::new("u1", "Please mail me at asha@example.com")],
                    team_replies: vec![],
                }],
            )
            .await;
        (review_router(ReviewState::new(pipeline, source)), store)
    }

    async fn seed(store: &InMemoryFactStore, user: &str, layer: Layer, confidence: f64) -> String {
        store
            .insert_fact(NewFact {
                user_id: user.to_string(),
                layer,
                fact_type: "habit".to_string(),
                content: "morning runs".to_string(),
                conclusion: format!("{user} has a habit of morning runs"),
                confidence,
                evidence: vec![Evidence::new("u1", "I run every morning")],
                ownership_reason: None,
                timestamp: None,
                extraction_method: ExtractionMethod::Initial,
                parent_update_id: None,
            })
            .await
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 64)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_req(uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder().method("POST").uri(uri);
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_process_then_list() {
        let (app, _store) = make_app().await;

        let resp = app
            .clone()
            .oneshot(post_req("/api/v1/process/asha", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "completed");
        assert_eq!(json["store"]["stats"]["stored"], 1);

        let resp = app.clone().oneshot(get_req("/api/v1/users")).await.unwrap();
        assert_eq!(body_json(resp).await, serde_json::json!(["asha"]));

        let resp = app
            .clone()
            .oneshot(get_req("/api/v1/users/asha/facts?layer=Layer1"))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json[0]["content"], "asha@example.com");
        assert_eq!(json[0]["confidenceLevel"], "high");

        let resp = app
            .oneshot(post_req("/api/v1/process/asha", None))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["status"], "skipped");
    }

    #[tokio::test]
    async fn test_process_unknown_user() {
        let (app, _store) = make_app().await;
        let resp = app
            .oneshot(post_req("/api/v1/process/ghost", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_pending_filters_and_limit() {
        let (app, store) = make_app().await;
        seed(&store, "asha", Layer::Preferences, 0.8).await;
        seed(&store, "asha", Layer::Preferences, 0.6).await;
        seed(&store, "ravi", Layer::Identity, 0.95).await;

        let resp = app
            .clone()
            .oneshot(get_req("/api/v1/facts/pending?layer=Layer4"))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[0]["confidenceLevel"], "low");
        assert_eq!(json[1]["confidenceLevel"], "medium");

        let resp = app
            .clone()
            .oneshot(get_req("/api/v1/facts/pending?limit=1"))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await.as_array().unwrap().len(), 1);

        let resp = app
            .oneshot(get_req("/api/v1/facts/pending?layer=Layer9"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_reject_flags_for_reprocessing() {
        let (app, store) = make_app().await;
        let id = seed(&store, "asha", Layer::Preferences, 0.9).await;

        let resp = app
            .clone()
            .oneshot(post_req(
                &format!("/api/v1/facts/{id}/reject"),
                Some(serde_json::json!({"reviewedBy": "meera"})),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["reviewedBy"], "meera");
        assert_eq!(json["needsReprocess"], true);

        let resp = app
            .oneshot(get_req("/api/v1/reprocess/candidates"))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json[0]["id"], id.as_str());
    }

    #[tokio::test]
    async fn test_approve_without_body_uses_default_reviewer() {
        let (app, store) = make_app().await;
        let id = seed(&store, "asha", Layer::Preferences, 0.9).await;

        let resp = app
            .oneshot(post_req(&format!("/api/v1/facts/{id}/approve"), None))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["status"], "approved");
        assert_eq!(json["reviewedBy"], "reviewer");
    }

    #[tokio::test]
    async fn test_approve_unknown_fact() {
        let (app, _store) = make_app().await;
        let resp = app
            .oneshot(post_req("/api/v1/facts/ghost/approve", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_summary_and_stats() {
        let (app, store) = make_app().await;
        let approved = seed(&store, "asha", Layer::Preferences, 0.9).await;
        let rejected = seed(&store, "asha", Layer::Preferences, 0.9).await;
        seed(&store, "ravi", Layer::Identity, 0.9).await;
        store
            .update_status(&approved, FactStatus::Approved, "r")
            .await
            .unwrap();
        store
            .update_status(&rejected, FactStatus::Rejected, "r")
            .await
            .unwrap();

        let resp = app
            .clone()
            .oneshot(get_req("/api/v1/users/asha/summary"))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["total"], 2);
        assert_eq!(json["approved"], 1);
        assert_eq!(json["rejected"], 1);

        let resp = app.oneshot(get_req("/api/v1/stats")).await.unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["totalUsers"], 2);
        assert_eq!(json["totalFacts"], 3);
        assert_eq!(json["acceptanceRate"], 50.0);
    }

    #[tokio::test]
    async fn test_mark_unprocessed_allows_rerun() {
        let (app, store) = make_app().await;
        app.clone()
            .oneshot(post_req("/api/v1/process/asha", None))
            .await
            .unwrap();
        assert!(store.is_processed("asha").await.unwrap());

        let resp = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/v1/users/asha/marker")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["removed"], true);
        assert!(!store.is_processed("asha").await.unwrap());
    }

    #[tokio::test]
    async fn test_batch_endpoint() {
        let (app, _store) = make_app().await;
        let resp = app
            .oneshot(post_req(
                "/api/v1/process?force=true",
                Some(serde_json::json!({"users": ["asha", "ghost"]})),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["results"]["asha"]["status"], "success");
        assert_eq!(json["results"]["ghost"]["status"], "error");
    }
}

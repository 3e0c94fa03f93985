//! HTTP surface over the in-memory pipeline

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use cinebase_server::features::{self, FeatureState};
use cinebase_server::notify::BroadcastNotifier;
use common::TestPipeline;

fn app(pipeline: &TestPipeline) -> Router {
    features::router(FeatureState {
        services: pipeline.services.clone(),
        events: BroadcastNotifier::new(16),
    })
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_backfill_start_then_conflict() {
    let pipeline = TestPipeline::new();
    let app = app(&pipeline);

    let response = app
        .clone()
        .oneshot(post_json("/backfill/start", json!({"batch_size": 25})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "running");
    assert_eq!(body["data"]["batch_size"], 25);

    let response = app
        .clone()
        .oneshot(Request::builder().method("POST").uri("/backfill/start").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"]["status"], 409);

    let response = app.oneshot(get("/backfill")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_resume_without_run_is_conflict() {
    let pipeline = TestPipeline::new();
    let response = app(&pipeline)
        .oneshot(Request::builder().method("POST").uri("/backfill/resume").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_list_import_is_accepted() {
    let pipeline = TestPipeline::new();
    let app = app(&pipeline);

    let response = app
        .clone()
        .oneshot(post_json("/imports/lists", json!({"list_key": "criterion", "list_id": "8250"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["data"]["already_queued"], false);

    let response = app
        .oneshot(post_json("/imports/lists", json!({"list_key": "bad key!", "list_id": "8250"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_list_import_reports_not_started() {
    let pipeline = TestPipeline::new();
    let response = app(&pipeline).oneshot(get("/imports/lists/sight-and-sound")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["display"], "not_started");
}

#[tokio::test]
async fn test_festival_and_movie_validation() {
    let pipeline = TestPipeline::new();
    let app = app(&pipeline);

    let response = app
        .clone()
        .oneshot(post_json("/imports/festivals/nowhere", json!({"years": [2020]})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(post_json("/imports/festivals/cannes", json!({"years": [1900]})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post_json("/imports/movies", json!({"tmdb_id": 0})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_job_queries() {
    let pipeline = TestPipeline::new();
    let app = app(&pipeline);

    let response = app.clone().oneshot(get("/jobs?state=bogus")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.clone().oneshot(get("/jobs/999")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.clone()
        .oneshot(post_json("/imports/movies", json!({"tmdb_id": 603})))
        .await
        .unwrap();
    let response = app.oneshot(get("/jobs?worker=fetch_movie")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["count"], 1);
}

#[tokio::test]
async fn test_gap_count() {
    let pipeline = TestPipeline::new();
    pipeline.seed_movie(1, "Known", 2000).await;
    pipeline.universe.set_ids(1..=4);

    let response = app(&pipeline).oneshot(get("/gap/count")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

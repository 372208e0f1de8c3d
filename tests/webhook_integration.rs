// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Integration tests for the HTTP surface.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use ride_ledger::config::MAINTENANCE_QUEUE_NAME;
use ride_ledger::models::ParentKind;
use ride_ledger::routes::webhook::{sign, SIGNATURE_HEADER};
use serde_json::json;
use tower::ServiceExt;

mod common;
use common::{create_test_app, legacy_track, road_ride_payload};

const SECRET: &[u8] = b"test_signing_secret"; // Matches Config::test_default()

fn signed_webhook(body: &serde_json::Value) -> Request<Body> {
    let bytes = serde_json::to_vec(body).unwrap();
    let signature = sign(SECRET, chrono::Utc::now().timestamp(), &bytes).unwrap();
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(bytes))
        .unwrap()
}

fn migration_trigger(queue: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/tasks/migrate-gps-logs");
    if let Some(queue) = queue {
        builder = builder.header("x-cloudtasks-queuename", queue);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _, _) = create_test_app();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_signed_webhook_is_stored() {
    let (app, _, db) = create_test_app();

    let response = app
        .oneshot(signed_webhook(&road_ride_payload("ride-1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(db.activities().unwrap().len(), 1);
    assert_eq!(db.all_logs(ParentKind::Activity).unwrap().len(), 3);
}

#[tokio::test]
async fn test_unsigned_webhook_is_rejected() {
    let (app, _, db) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("content-type", "application/json")
                .body(Body::from(road_ride_payload("ride-1").to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(db.activities().unwrap().is_empty());
}

#[tokio::test]
async fn test_signature_over_different_body_is_rejected() {
    let (app, _, db) = create_test_app();

    let signature = sign(SECRET, 1714545600, b"{}").unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header(SIGNATURE_HEADER, signature)
                .body(Body::from(road_ride_payload("ride-1").to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(db.activities().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_envelope_returns_bad_request() {
    let (app, _, _) = create_test_app();

    let response = app
        .oneshot(signed_webhook(&json!({"type": "activity", "data": "nope"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "bad_request");
}

#[tokio::test]
async fn test_dropped_content_is_acknowledged() {
    let (app, _, db) = create_test_app();

    let mut body = road_ride_payload("ride-1");
    body["user"]["user_id"] = json!("unknown-user");

    let response = app.oneshot(signed_webhook(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(db.activities().unwrap().is_empty());
}

#[tokio::test]
async fn test_write_failure_asks_for_redelivery() {
    let (app, _, db) = create_test_app();
    db.set_fail_writes(true);

    let response = app
        .oneshot(signed_webhook(&road_ride_payload("ride-1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "database_error");
    assert!(json.get("details").is_none());
}

#[tokio::test]
async fn test_migration_trigger_requires_queue_header() {
    let (app, state, _) = create_test_app();

    let response = app.clone().oneshot(migration_trigger(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(migration_trigger(Some("some-other-queue")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(!state.migration.is_running());
}

#[tokio::test]
async fn test_migration_trigger_starts_job() {
    let (app, state, db) = create_test_app();
    db.seed_logs(legacy_track(ParentKind::Route, 9, 3)).unwrap();

    let response = app
        .oneshot(migration_trigger(Some(MAINTENANCE_QUEUE_NAME)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // The job runs in the background; wait for it to release the engine.
    for _ in 0..100 {
        if !state.migration.is_running() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(!state.migration.is_running());

    let rows = db.all_logs(ParentKind::Route).unwrap();
    assert!(rows.iter().all(|row| !row.has_plaintext_latitude()));
}

#[tokio::test]
async fn test_migration_trigger_conflicts_with_running_job() {
    let (app, state, _) = create_test_app();

    let _run = state.migration.begin().unwrap();
    let response = app
        .oneshot(migration_trigger(Some(MAINTENANCE_QUEUE_NAME)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_offline_store_returns_server_error() {
    use ride_ledger::config::Config;
    use ride_ledger::db::FirestoreDb;
    use ride_ledger::routes::create_router;
    use ride_ledger::AppState;
    use std::sync::Arc;

    let state = Arc::new(AppState::new(Config::test_default(), FirestoreDb::new_mock()));
    let app = create_router(state);

    let response = app
        .oneshot(signed_webhook(&road_ride_payload("ride-1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::{DateTime, Utc};
use ride_ledger::config::Config;
use ride_ledger::db::{FirestoreDb, MemoryDb};
use ride_ledger::models::{ParentKind, ProviderConnection, StoredGpsLog, User};
use ride_ledger::routes::create_router;
use ride_ledger::AppState;
use std::sync::Arc;

/// Internal user every test payload maps to.
#[allow(dead_code)]
pub const TEST_USER_ID: u64 = 42;

/// Provider-side ID linked to [`TEST_USER_ID`].
#[allow(dead_code)]
pub const TEST_EXTERNAL_USER: &str = "provider-user-1";

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// In-memory store with the test user and its provider connection.
#[allow(dead_code)]
pub fn memory_db_with_user() -> MemoryDb {
    let db = MemoryDb::new();
    db.add_user(User {
        id: TEST_USER_ID,
        display_name: "Test Rider".to_string(),
        created_at: "2024-01-01T00:00:00Z".to_string(),
    })
    .unwrap();
    db.add_connection(ProviderConnection {
        external_user_id: TEST_EXTERNAL_USER.to_string(),
        user_id: TEST_USER_ID,
        provider: Some("GARMIN".to_string()),
        connected_at: "2024-01-01T00:00:00Z".to_string(),
    })
    .unwrap();
    db
}

/// Shared state over the given store with the test config.
#[allow(dead_code)]
pub fn test_state(db: MemoryDb) -> Arc<AppState<MemoryDb>> {
    test_state_with_config(Config::test_default(), db)
}

#[allow(dead_code)]
pub fn test_state_with_config(config: Config, db: MemoryDb) -> Arc<AppState<MemoryDb>> {
    Arc::new(AppState::new(config, db))
}

/// Create a test app over an in-memory store.
/// Returns the router, the shared state and the store.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState<MemoryDb>>, MemoryDb) {
    let db = memory_db_with_user();
    let state = test_state(db.clone());
    (create_router(state.clone()), state, db)
}

/// Helper to parse RFC3339 timestamps in tests.
#[allow(dead_code)]
pub fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .unwrap()
        .with_timezone(&Utc)
}

/// A row as written before coordinates were encrypted.
#[allow(dead_code)]
pub fn legacy_row(
    kind: ParentKind,
    parent_id: u64,
    seq: u32,
    latitude: &str,
    longitude: &str,
    elevation: Option<&str>,
) -> StoredGpsLog {
    StoredGpsLog {
        parent_kind: kind,
        parent_id,
        seq,
        log_time: parse_time("2024-05-01T06:00:00Z") + chrono::Duration::seconds(seq as i64),
        latitude: Some(latitude.to_string()),
        longitude: Some(longitude.to_string()),
        elevation: elevation.map(str::to_string),
        speed: Some(4.5),
        distance: Some(seq as f64 * 4.5),
        heart_rate: None,
        cadence: None,
    }
}

/// A simple legacy track of `points` rows.
#[allow(dead_code)]
pub fn legacy_track(kind: ParentKind, parent_id: u64, points: u32) -> Vec<StoredGpsLog> {
    (0..points)
        .map(|seq| {
            legacy_row(
                kind,
                parent_id,
                seq,
                &format!("{:.5}", 37.4 + seq as f64 * 0.0001),
                &format!("{:.5}", -122.1 - seq as f64 * 0.0001),
                Some("12.5"),
            )
        })
        .collect()
}

/// Webhook body with one Road Biking activity for the test user.
///
/// Positions at t=0,1,2s; elevation at t=0.4s (50 m) and t=1.6s (55 m);
/// no speed or distance samples.
#[allow(dead_code)]
pub fn road_ride_payload(summary_id: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "activity",
        "user": {"user_id": TEST_EXTERNAL_USER, "provider": "GARMIN"},
        "data": [{
            "metadata": {
                "type": 16,
                "name": "Skyline loop",
                "summary_id": summary_id,
                "start_time": "2024-05-01T06:00:00Z",
                "end_time": "2024-05-01T06:00:02Z"
            },
            "position_data": {"position_samples": [
                {"timestamp": "2024-05-01T06:00:00Z", "coords_lat_lng_deg": [37.3861, -122.0839]},
                {"timestamp": "2024-05-01T06:00:01Z", "coords_lat_lng_deg": [37.3862, -122.0840]},
                {"timestamp": "2024-05-01T06:00:02Z", "coords_lat_lng_deg": [37.3863, -122.0841]}
            ]},
            "distance_data": {"detailed": {"elevation_samples": [
                {"timestamp": "2024-05-01T06:00:00.400Z", "elev_meters": 50.0},
                {"timestamp": "2024-05-01T06:00:01.600Z", "elev_meters": 55.0}
            ]}}
        }]
    })
}

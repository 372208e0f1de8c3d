// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Task handler routes for Cloud Tasks callbacks.
//!
//! These endpoints are called by Cloud Tasks, not directly by users.

use crate::db::GpsLogStore;
use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use std::sync::Arc;

/// Task handler routes (called by Cloud Tasks).
pub fn routes<S: GpsLogStore>() -> Router<Arc<AppState<S>>> {
    Router::new().route("/tasks/migrate-gps-logs", post(migrate_gps_logs::<S>))
}

/// Start re-encrypting plaintext GPS logs in the background.
async fn migrate_gps_logs<S: GpsLogStore>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    // Cloud Run strips this header from external requests, so its presence
    // guarantees internal origin.
    let queue_name_header = headers.get("x-cloudtasks-queuename");
    let is_valid_queue = queue_name_header
        .and_then(|h| h.to_str().ok())
        .map(|name| name == crate::config::MAINTENANCE_QUEUE_NAME)
        .unwrap_or(false);

    if !is_valid_queue {
        tracing::warn!(
            header = ?queue_name_header,
            "Security Alert: Blocked unauthorized access to migrate_gps_logs"
        );
        return Ok(StatusCode::FORBIDDEN);
    }

    let run = state.migration.begin().inspect_err(|_| {
        tracing::info!("GPS log migration already running, ignoring trigger");
    })?;

    tokio::spawn(async move {
        let report = run.execute().await;
        for collection in &report.collections {
            if let Some(reason) = &collection.aborted {
                tracing::error!(
                    parent_kind = %collection.kind,
                    reason = %reason,
                    "GPS log migration left collection unfinished"
                );
            }
        }
    });

    tracing::info!("GPS log migration started");
    Ok(StatusCode::ACCEPTED)
}

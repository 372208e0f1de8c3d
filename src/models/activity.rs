// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Ingested ride model for storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored activity record in Firestore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Internal activity ID (also used as document ID)
    pub id: u64,
    /// Owning internal user
    pub user_id: u64,
    /// Provider summary ID, used to skip redelivered payloads
    pub external_id: Option<String>,
    /// Activity title
    pub title: String,
    /// Provider activity-type code
    pub activity_type: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Total distance in meters
    pub distance_meters: f64,
    /// Total duration in seconds
    pub duration_seconds: f64,
    /// Elevation gain in meters
    pub elevation_gain_meters: Option<f64>,
    /// Number of GPS log rows stored with the activity
    pub point_count: u32,
    /// When this activity was ingested (ISO 8601)
    pub created_at: String,
}

/// An activity that has not been assigned an ID yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub user_id: u64,
    pub external_id: Option<String>,
    pub title: String,
    pub activity_type: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub distance_meters: f64,
    pub duration_seconds: f64,
    pub elevation_gain_meters: Option<f64>,
}

impl NewActivity {
    /// Attach the ID allocated by the store.
    pub fn into_activity(self, id: u64, point_count: u32, created_at: String) -> Activity {
        Activity {
            id,
            user_id: self.user_id,
            external_id: self.external_id,
            title: self.title,
            activity_type: self.activity_type,
            start_time: self.start_time,
            end_time: self.end_time,
            distance_meters: self.distance_meters,
            duration_seconds: self.duration_seconds,
            elevation_gain_meters: self.elevation_gain_meters,
            point_count,
            created_at,
        }
    }
}

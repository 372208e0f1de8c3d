// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Inbound fitness-data webhook payload.
//!
//! Every stream array is optional; a missing array means "no data for
//! this stream" and deserializes to an empty vector.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Top-level webhook envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    /// Event type ("activity" for ride uploads)
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    pub user: ExternalUserRef,
    #[serde(default)]
    pub data: Vec<ActivityRecord>,
}

/// Provider-side reference to a user.
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalUserRef {
    /// Provider user ID
    pub user_id: String,
    /// Reference we handed the provider when the user connected
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
}

/// One recorded activity with its sample streams.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ActivityRecord {
    pub metadata: ActivityMetadata,
    pub position_data: PositionData,
    pub distance_data: DistanceData,
    pub movement_data: MovementData,
    pub heart_rate_data: HeartRateData,
    pub active_durations_data: ActiveDurationsData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ActivityMetadata {
    /// Activity-type code
    #[serde(rename = "type")]
    pub activity_type: Option<i64>,
    pub name: Option<String>,
    pub summary_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PositionData {
    pub position_samples: Vec<PositionSample>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DistanceData {
    pub summary: DistanceSummary,
    pub detailed: DistanceDetailed,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DistanceSummary {
    pub distance_meters: Option<f64>,
    pub elevation: ElevationSummary,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ElevationSummary {
    pub gain_actual_meters: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DistanceDetailed {
    pub elevation_samples: Vec<ValueSample>,
    pub distance_samples: Vec<ValueSample>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MovementData {
    pub speed_samples: Vec<ValueSample>,
    pub cadence_samples: Vec<ValueSample>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HeartRateData {
    pub detailed: HeartRateDetailed,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HeartRateDetailed {
    pub hr_samples: Vec<ValueSample>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ActiveDurationsData {
    pub activity_seconds: Option<f64>,
}

/// A position fix: `coords` is `[lat, lon]`.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionSample {
    pub timestamp: DateTime<Utc>,
    #[serde(default, alias = "coords_lat_lng_deg")]
    pub coords: Vec<f64>,
}

/// A timestamped scalar. The value field name differs per stream.
#[derive(Debug, Clone, Deserialize)]
pub struct ValueSample {
    pub timestamp: DateTime<Utc>,
    #[serde(
        default,
        alias = "elev_meters",
        alias = "distance_meters",
        alias = "speed_meters_per_second",
        alias = "bpm",
        alias = "cadence"
    )]
    pub value: Option<f64>,
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook ingestion service.
//!
//! Handles the core workflow:
//! 1. Parse the envelope and map the provider user to an internal user
//! 2. Keep only cycling activity records
//! 3. Reconcile each record's sample streams into GPS log entries
//! 4. Store the activity and its encrypted track as one unit
//!
//! Unknown users and non-cycling records are dropped and logged; they are
//! not errors, so the provider does not redeliver them.

use crate::db::{GpsLogRepository, GpsLogStore};
use crate::error::{AppError, Result};
use crate::models::{Activity, ActivityRecord, GpsLogEntry, NewActivity, WebhookPayload};
use crate::services::reconcile::{reconcile, ActivityStreams};
use chrono::{DateTime, Utc};

/// Activity-type codes accepted as cycling: biking, hand biking, mountain
/// biking, road biking, spinning, stationary biking and utility biking.
pub const CYCLING_ACTIVITY_TYPES: [i64; 7] = [1, 14, 15, 16, 17, 18, 19];

/// Envelope `type` carrying ride uploads.
const ACTIVITY_EVENT_TYPE: &str = "activity";

pub fn is_cycling(activity_type: i64) -> bool {
    CYCLING_ACTIVITY_TYPES.contains(&activity_type)
}

/// What happened to one webhook delivery.
#[derive(Debug)]
pub enum IngestOutcome {
    /// The envelope is not an activity event.
    IgnoredEvent(String),
    /// The provider user is not linked to anyone.
    UnknownUser,
    Processed(IngestSummary),
}

#[derive(Debug, Default)]
pub struct IngestSummary {
    pub user_id: u64,
    pub created: Vec<Activity>,
    /// Records dropped for a missing or non-cycling type
    pub skipped: usize,
    /// Records already ingested by an earlier delivery
    pub duplicates: usize,
}

#[derive(Clone)]
pub struct IngestionService<S> {
    repo: GpsLogRepository<S>,
}

impl<S: GpsLogStore> IngestionService<S> {
    pub fn new(repo: GpsLogRepository<S>) -> Self {
        Self { repo }
    }

    /// Parse a raw body and ingest it. A body that is not a valid envelope
    /// is a `BadRequest`.
    pub async fn ingest_raw(&self, body: &[u8]) -> Result<IngestOutcome> {
        let payload: WebhookPayload = serde_json::from_slice(body).map_err(|e| {
            tracing::error!(error = %e, "Failed to parse webhook payload");
            AppError::BadRequest(format!("Malformed webhook payload: {}", e))
        })?;
        self.ingest(payload).await
    }

    /// Ingest a parsed payload.
    ///
    /// Returns an error only when an activity could not be stored; records
    /// stored before the failure stay stored and are skipped as duplicates
    /// on redelivery.
    pub async fn ingest(&self, payload: WebhookPayload) -> Result<IngestOutcome> {
        if let Some(event_type) = payload
            .event_type
            .as_deref()
            .filter(|t| *t != ACTIVITY_EVENT_TYPE)
        {
            tracing::info!(event_type, "Ignoring non-activity webhook event");
            return Ok(IngestOutcome::IgnoredEvent(event_type.to_string()));
        }

        let Some(user_id) = self.repo.store().find_user_id(&payload.user).await? else {
            tracing::warn!(
                external_user_id = %payload.user.user_id,
                reference_id = ?payload.user.reference_id,
                "Dropping webhook for unmapped user"
            );
            return Ok(IngestOutcome::UnknownUser);
        };

        let mut summary = IngestSummary {
            user_id,
            ..Default::default()
        };

        for (index, record) in payload.data.iter().enumerate() {
            let Some(activity_type) = record.metadata.activity_type.filter(|t| is_cycling(*t))
            else {
                tracing::info!(
                    user_id,
                    record_index = index,
                    activity_type = ?record.metadata.activity_type,
                    "Skipping non-cycling activity"
                );
                summary.skipped += 1;
                continue;
            };

            if let Some(external_id) = record.metadata.summary_id.as_deref() {
                if let Some(existing) = self
                    .repo
                    .store()
                    .find_activity_by_external_id(user_id, external_id)
                    .await?
                {
                    tracing::debug!(
                        user_id,
                        external_id,
                        activity_id = existing.id,
                        "Activity already ingested (idempotent skip)"
                    );
                    summary.duplicates += 1;
                    continue;
                }
            }

            // A concurrent delivery can pass the check above; the insert's
            // claim on the summary ID settles which one stores it.
            match self.ingest_record(user_id, activity_type, record).await? {
                Some(activity) => summary.created.push(activity),
                None => summary.duplicates += 1,
            }
        }

        tracing::info!(
            user_id,
            created = summary.created.len(),
            skipped = summary.skipped,
            duplicates = summary.duplicates,
            "Webhook processed"
        );

        Ok(IngestOutcome::Processed(summary))
    }

    async fn ingest_record(
        &self,
        user_id: u64,
        activity_type: i64,
        record: &ActivityRecord,
    ) -> Result<Option<Activity>> {
        let streams = ActivityStreams::from_record(record);
        let entries = reconcile(&streams);

        if entries.is_empty() {
            tracing::info!(
                user_id,
                summary_id = ?record.metadata.summary_id,
                "Activity has no GPS samples"
            );
        }

        let new_activity = summarize(user_id, activity_type, record, &streams, &entries);
        let activity = self
            .repo
            .create_activity(new_activity, &entries)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    user_id,
                    summary_id = ?record.metadata.summary_id,
                    error = %e,
                    "Failed to store activity"
                );
            })?;

        let Some(activity) = activity else {
            tracing::info!(
                user_id,
                summary_id = ?record.metadata.summary_id,
                "Activity stored by a concurrent delivery (idempotent skip)"
            );
            return Ok(None);
        };

        tracing::info!(
            user_id,
            activity_id = activity.id,
            points = entries.len(),
            "Activity ingested"
        );
        Ok(Some(activity))
    }
}

/// Derive the activity summary, preferring provider-reported figures.
fn summarize(
    user_id: u64,
    activity_type: i64,
    record: &ActivityRecord,
    streams: &ActivityStreams,
    entries: &[GpsLogEntry],
) -> NewActivity {
    let metadata = &record.metadata;

    let start_time = metadata
        .start_time
        .or_else(|| entries.first().map(|e| e.log_time))
        .or_else(|| earliest(streams))
        .unwrap_or_else(Utc::now);
    let end_time = metadata
        .end_time
        .or_else(|| entries.last().map(|e| e.log_time))
        .unwrap_or(start_time)
        .max(start_time);

    let distance_meters = record
        .distance_data
        .summary
        .distance_meters
        .or_else(|| {
            streams
                .distance
                .iter()
                .map(|s| s.value)
                .reduce(f64::max)
        })
        .unwrap_or(0.0);

    let duration_seconds = record
        .active_durations_data
        .activity_seconds
        .unwrap_or_else(|| (end_time - start_time).num_milliseconds() as f64 / 1000.0);

    let title = metadata
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("Ride {}", start_time.format("%Y-%m-%d")));

    NewActivity {
        user_id,
        external_id: metadata.summary_id.clone(),
        title,
        activity_type,
        start_time,
        end_time,
        distance_meters,
        duration_seconds,
        elevation_gain_meters: record.distance_data.summary.elevation.gain_actual_meters,
    }
}

/// Earliest timestamp across the auxiliary streams.
fn earliest(streams: &ActivityStreams) -> Option<DateTime<Utc>> {
    [
        &streams.elevation,
        &streams.speed,
        &streams.distance,
        &streams.heart_rate,
        &streams.cadence,
    ]
    .into_iter()
    .flat_map(|samples| samples.iter().map(|s| s.timestamp))
    .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> ActivityRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_cycling_allow_list() {
        assert!(is_cycling(1));
        assert!(is_cycling(16));
        assert!(!is_cycling(8)); // running
        assert!(!is_cycling(0));
    }

    #[test]
    fn test_summary_prefers_provider_figures() {
        let record = record(json!({
            "metadata": {
                "type": 16,
                "name": "Morning Ride",
                "summary_id": "s-1",
                "start_time": "2024-05-01T06:00:00Z",
                "end_time": "2024-05-01T07:00:00Z"
            },
            "distance_data": {
                "summary": {"distance_meters": 25000.0, "elevation": {"gain_actual_meters": 310.0}},
                "detailed": {"distance_samples": [{"timestamp": "2024-05-01T06:30:00Z", "distance_meters": 9.0}]}
            },
            "active_durations_data": {"activity_seconds": 3300.0}
        }));
        let streams = ActivityStreams::from_record(&record);

        let summary = summarize(7, 16, &record, &streams, &[]);
        assert_eq!(summary.title, "Morning Ride");
        assert_eq!(summary.external_id.as_deref(), Some("s-1"));
        assert_eq!(summary.distance_meters, 25000.0);
        assert_eq!(summary.duration_seconds, 3300.0);
        assert_eq!(summary.elevation_gain_meters, Some(310.0));
    }

    #[test]
    fn test_summary_falls_back_to_samples() {
        let record = record(json!({
            "metadata": {"type": 1},
            "position_data": {"position_samples": [
                {"timestamp": "2024-05-01T06:00:00Z", "coords": [1.0, 2.0]},
                {"timestamp": "2024-05-01T06:00:30Z", "coords": [1.1, 2.1]}
            ]},
            "distance_data": {"detailed": {"distance_samples": [
                {"timestamp": "2024-05-01T06:00:00Z", "distance_meters": 0.0},
                {"timestamp": "2024-05-01T06:00:30Z", "distance_meters": 140.0}
            ]}}
        }));
        let streams = ActivityStreams::from_record(&record);
        let entries = reconcile(&streams);

        let summary = summarize(7, 1, &record, &streams, &entries);
        assert_eq!(summary.title, "Ride 2024-05-01");
        assert_eq!(summary.distance_meters, 140.0);
        assert_eq!(summary.duration_seconds, 30.0);
        assert_eq!(summary.elevation_gain_meters, None);
    }
}

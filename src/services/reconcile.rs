// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Temporal reconciliation of independently sampled sensor streams.
//!
//! Position samples are the anchor: every valid position fix yields one
//! [`GpsLogEntry`], and each auxiliary stream contributes the value whose
//! timestamp is nearest to the fix. On an exact tie between the entry
//! before and the entry after, the later one wins.

use crate::models::webhook::{ActivityRecord, PositionSample, ValueSample};
use crate::models::GpsLogEntry;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// A timestamped value from one stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample<T> {
    pub timestamp: DateTime<Utc>,
    pub value: T,
}

/// Ordered, timestamp-keyed lookup over one auxiliary stream.
///
/// Built once per stream per reconciliation. On duplicate timestamps the
/// first sample encountered is kept.
#[derive(Debug, Clone)]
pub struct SampleStreamIndex<T> {
    entries: BTreeMap<DateTime<Utc>, T>,
}

impl<T> Default for SampleStreamIndex<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T: Copy> SampleStreamIndex<T> {
    pub fn build(samples: impl IntoIterator<Item = Sample<T>>) -> Self {
        let mut entries = BTreeMap::new();
        for sample in samples {
            entries.entry(sample.timestamp).or_insert(sample.value);
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Latest entry at or before `at`.
    pub fn floor(&self, at: DateTime<Utc>) -> Option<(DateTime<Utc>, T)> {
        self.entries
            .range(..=at)
            .next_back()
            .map(|(t, v)| (*t, *v))
    }

    /// Earliest entry at or after `at`.
    pub fn ceiling(&self, at: DateTime<Utc>) -> Option<(DateTime<Utc>, T)> {
        self.entries.range(at..).next().map(|(t, v)| (*t, *v))
    }

    /// Value nearest in time to `at`; ties go to the later entry.
    pub fn nearest(&self, at: DateTime<Utc>) -> Option<T> {
        match (self.floor(at), self.ceiling(at)) {
            (None, None) => None,
            (Some((_, v)), None) | (None, Some((_, v))) => Some(v),
            (Some((before, below)), Some((after, above))) => {
                if at - before < after - at {
                    Some(below)
                } else {
                    Some(above)
                }
            }
        }
    }
}

/// The raw streams of one activity.
#[derive(Debug, Clone, Default)]
pub struct ActivityStreams {
    pub positions: Vec<PositionSample>,
    pub elevation: Vec<Sample<f64>>,
    pub speed: Vec<Sample<f64>>,
    pub distance: Vec<Sample<f64>>,
    pub heart_rate: Vec<Sample<f64>>,
    pub cadence: Vec<Sample<f64>>,
}

impl ActivityStreams {
    /// Pull the streams out of a webhook activity record. Samples with no
    /// value are skipped.
    pub fn from_record(record: &ActivityRecord) -> Self {
        Self {
            positions: record.position_data.position_samples.clone(),
            elevation: values(&record.distance_data.detailed.elevation_samples),
            speed: values(&record.movement_data.speed_samples),
            distance: values(&record.distance_data.detailed.distance_samples),
            heart_rate: values(&record.heart_rate_data.detailed.hr_samples),
            cadence: values(&record.movement_data.cadence_samples),
        }
    }
}

fn values(samples: &[ValueSample]) -> Vec<Sample<f64>> {
    samples
        .iter()
        .filter_map(|s| {
            s.value.map(|value| Sample {
                timestamp: s.timestamp,
                value,
            })
        })
        .collect()
}

/// Merges auxiliary streams onto position fixes.
#[derive(Debug, Clone, Default)]
pub struct TemporalReconciler {
    elevation: SampleStreamIndex<f64>,
    speed: SampleStreamIndex<f64>,
    distance: SampleStreamIndex<f64>,
    heart_rate: SampleStreamIndex<f64>,
    cadence: SampleStreamIndex<f64>,
}

impl TemporalReconciler {
    pub fn new(streams: &ActivityStreams) -> Self {
        Self {
            elevation: SampleStreamIndex::build(streams.elevation.iter().copied()),
            speed: SampleStreamIndex::build(streams.speed.iter().copied()),
            distance: SampleStreamIndex::build(streams.distance.iter().copied()),
            heart_rate: SampleStreamIndex::build(streams.heart_rate.iter().copied()),
            cadence: SampleStreamIndex::build(streams.cadence.iter().copied()),
        }
    }

    /// One entry per valid position sample, in input order.
    ///
    /// Position samples with fewer than two coordinates are dropped.
    pub fn reconcile(&self, positions: &[PositionSample]) -> Vec<GpsLogEntry> {
        let mut entries = Vec::with_capacity(positions.len());

        for (index, position) in positions.iter().enumerate() {
            let (latitude, longitude) = match position.coords.as_slice() {
                [lat, lon, ..] => (*lat, *lon),
                _ => {
                    tracing::warn!(
                        sample_index = index,
                        components = position.coords.len(),
                        timestamp = %position.timestamp,
                        "Dropping position sample without lat/lon"
                    );
                    continue;
                }
            };

            let at = position.timestamp;
            entries.push(GpsLogEntry {
                log_time: at,
                latitude,
                longitude,
                elevation: self.elevation.nearest(at),
                speed: self.speed.nearest(at),
                distance: self.distance.nearest(at),
                heart_rate: self.heart_rate.nearest(at),
                cadence: self.cadence.nearest(at),
            });
        }

        entries
    }
}

/// Build the indexes for `streams` and reconcile them in one call.
pub fn reconcile(streams: &ActivityStreams) -> Vec<GpsLogEntry> {
    // Without anchors the auxiliary indexes are never queried; skip building them.
    if streams.positions.is_empty() {
        return Vec::new();
    }
    TemporalReconciler::new(streams).reconcile(&streams.positions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 7, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn s(seconds: i64, value: f64) -> Sample<f64> {
        Sample {
            timestamp: t(seconds),
            value,
        }
    }

    fn position(seconds: i64) -> PositionSample {
        PositionSample {
            timestamp: t(seconds),
            coords: vec![37.0, -122.0],
        }
    }

    #[test]
    fn test_index_keeps_first_duplicate() {
        let index = SampleStreamIndex::build([s(10, 1.0), s(10, 2.0), s(5, 3.0)]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.floor(t(10)), Some((t(10), 1.0)));
        assert_eq!(index.floor(t(7)), Some((t(5), 3.0)));
        assert_eq!(index.ceiling(t(11)), None);
    }

    #[test]
    fn test_nearest_prefers_smaller_delta() {
        let index = SampleStreamIndex::build([s(90, 10.0), s(115, 20.0)]);
        assert_eq!(index.nearest(t(100)), Some(10.0));
    }

    #[test]
    fn test_nearest_tie_goes_to_ceiling() {
        let index = SampleStreamIndex::build([s(95, 10.0), s(105, 20.0)]);
        assert_eq!(index.nearest(t(100)), Some(20.0));
    }

    #[test]
    fn test_nearest_one_sided_and_empty() {
        let index = SampleStreamIndex::build([s(50, 1.5)]);
        assert_eq!(index.nearest(t(0)), Some(1.5));
        assert_eq!(index.nearest(t(100)), Some(1.5));
        assert_eq!(SampleStreamIndex::<f64>::default().nearest(t(0)), None);
    }

    #[test]
    fn test_exact_match_wins() {
        let index = SampleStreamIndex::build([s(99, 1.0), s(100, 2.0), s(101, 3.0)]);
        assert_eq!(index.nearest(t(100)), Some(2.0));
    }

    #[test]
    fn test_reconcile_anchors_on_positions() {
        let streams = ActivityStreams {
            positions: vec![position(0), position(10), position(20)],
            elevation: vec![s(1, 100.0), s(19, 110.0)],
            speed: vec![s(10, 5.0)],
            ..Default::default()
        };

        let entries = reconcile(&streams);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].elevation, Some(100.0));
        assert_eq!(entries[1].elevation, Some(110.0)); // 9s vs 9s: later wins
        assert_eq!(entries[2].elevation, Some(110.0));
        assert!(entries.iter().all(|e| e.speed == Some(5.0)));
        assert!(entries.iter().all(|e| e.distance.is_none()));
        assert!(entries.iter().all(|e| e.heart_rate.is_none()));
    }

    #[test]
    fn test_reconcile_drops_short_coordinates() {
        let mut bad = position(5);
        bad.coords = vec![37.0];
        let streams = ActivityStreams {
            positions: vec![position(0), bad, position(10)],
            ..Default::default()
        };

        let entries = reconcile(&streams);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].log_time, t(0));
        assert_eq!(entries[1].log_time, t(10));
    }

    #[test]
    fn test_reconcile_empty_positions() {
        let streams = ActivityStreams {
            elevation: vec![s(0, 1.0)],
            ..Default::default()
        };
        assert!(reconcile(&streams).is_empty());
    }
}

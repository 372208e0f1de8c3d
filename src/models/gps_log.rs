// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! GPS log rows, in memory and at rest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which kind of entity owns a set of GPS log rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentKind {
    Activity,
    Route,
}

impl ParentKind {
    /// Every kind, in the order the migration job walks them.
    pub const ALL: [ParentKind; 2] = [ParentKind::Activity, ParentKind::Route];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParentKind::Activity => "activity",
            ParentKind::Route => "route",
        }
    }
}

impl fmt::Display for ParentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reconciled track point with plaintext coordinates.
///
/// This type never crosses the persistence boundary; see [`StoredGpsLog`].
#[derive(Debug, Clone, PartialEq)]
pub struct GpsLogEntry {
    pub log_time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
    /// Meters per second
    pub speed: Option<f64>,
    /// Cumulative meters
    pub distance: Option<f64>,
    pub heart_rate: Option<f64>,
    pub cadence: Option<f64>,
}

/// A GPS log row as stored.
///
/// `latitude`, `longitude` and `elevation` are opaque strings: ciphertext
/// for everything written through the codec, decimal text for rows that
/// predate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredGpsLog {
    pub parent_kind: ParentKind,
    pub parent_id: u64,
    /// Position within the parent's track, starting at 0
    pub seq: u32,
    pub log_time: DateTime<Utc>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub elevation: Option<String>,
    pub speed: Option<f64>,
    pub distance: Option<f64>,
    pub heart_rate: Option<f64>,
    pub cadence: Option<f64>,
}

impl StoredGpsLog {
    /// Document ID within the parent kind's collection.
    pub fn document_id(&self) -> String {
        format!("{}_{:06}", self.parent_id, self.seq)
    }

    /// Whether this row still holds a decimal (pre-encryption) latitude.
    pub fn has_plaintext_latitude(&self) -> bool {
        self.latitude.as_deref().is_some_and(looks_like_plaintext)
    }
}

/// Decimal text contains no letters; base64 ciphertext of a 12-byte
/// nonce plus a tag virtually always does.
pub fn looks_like_plaintext(stored: &str) -> bool {
    !stored.chars().any(|c| c.is_ascii_alphabetic())
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Read/write adapter for GPS logs.
//!
//! The single place where plaintext track points meet the store. Every
//! write encodes through [`EncryptedFieldCodec`] and every read decodes
//! through it.

use super::GpsLogStore;
use crate::error::{AppError, Result};
use crate::models::{Activity, GpsLogEntry, NewActivity, ParentKind, StoredGpsLog};
use crate::services::codec::EncryptedFieldCodec;
use chrono::{SecondsFormat, Utc};

#[derive(Clone)]
pub struct GpsLogRepository<S> {
    store: S,
    codec: EncryptedFieldCodec,
}

impl<S: GpsLogStore> GpsLogRepository<S> {
    pub fn new(store: S, codec: EncryptedFieldCodec) -> Self {
        Self { store, codec }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn codec(&self) -> &EncryptedFieldCodec {
        &self.codec
    }

    /// Encrypt a track for storage under `parent_id`.
    pub fn encode(
        &self,
        kind: ParentKind,
        parent_id: u64,
        entries: &[GpsLogEntry],
    ) -> Result<Vec<StoredGpsLog>> {
        let mut rows = Vec::with_capacity(entries.len());
        for (seq, entry) in entries.iter().enumerate() {
            rows.push(self.codec.encode_entry(kind, parent_id, seq as u32, entry)?);
        }
        Ok(rows)
    }

    /// Decrypt stored rows. The first corrupted value fails the read.
    pub fn decode(&self, rows: &[StoredGpsLog]) -> Result<Vec<GpsLogEntry>> {
        rows.iter()
            .map(|row| self.codec.decode_row(row).map_err(AppError::from))
            .collect()
    }

    /// Create an activity and its track as one unit. Returns `None` when
    /// the same provider summary was already stored for this user.
    pub async fn create_activity(
        &self,
        activity: NewActivity,
        entries: &[GpsLogEntry],
    ) -> Result<Option<Activity>> {
        let id = self.store.allocate_activity_id().await?;
        let rows = self.encode(ParentKind::Activity, id, entries)?;
        let activity = activity.into_activity(
            id,
            rows.len() as u32,
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        );

        let inserted = self.store.insert_activity_with_logs(&activity, &rows).await?;
        Ok(inserted.then_some(activity))
    }

    /// Load and decrypt the track of one activity or route.
    pub async fn load_track(&self, kind: ParentKind, parent_id: u64) -> Result<Vec<GpsLogEntry>> {
        let rows = self.store.load_logs(kind, parent_id).await?;
        self.decode(&rows)
    }
}

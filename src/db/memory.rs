// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store for tests and offline development.
//!
//! Every operation runs under one lock, so inserts and page rewrites are
//! trivially atomic. Write failures can be injected to exercise the
//! error paths of ingestion and migration.

use super::GpsLogStore;
use crate::error::{AppError, Result};
use crate::models::{Activity, ExternalUserRef, ParentKind, ProviderConnection, StoredGpsLog, User};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct MemoryState {
    users: HashMap<u64, User>,
    connections: HashMap<String, ProviderConnection>,
    activities: BTreeMap<u64, Activity>,
    /// Keyed by (parent_id, seq) so iteration follows parent ID order.
    logs: HashMap<ParentKind, BTreeMap<(u64, u32), StoredGpsLog>>,
    last_activity_id: u64,
}

#[derive(Clone, Default)]
pub struct MemoryDb {
    state: Arc<Mutex<MemoryState>>,
    fail_writes: Arc<AtomicBool>,
    rewrite_calls: Arc<AtomicU64>,
    /// 1-based `rewrite_logs` call to fail; 0 disables
    fail_rewrite_call: Arc<AtomicU64>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| AppError::Database("memory store lock poisoned".to_string()))
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database(
                "Database unavailable (injected failure)".to_string(),
            ));
        }
        Ok(())
    }

    /// Make every subsequent write fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail only the `n`th `rewrite_logs` call from now on (1-based).
    pub fn fail_nth_rewrite(&self, n: u64) {
        self.rewrite_calls.store(0, Ordering::SeqCst);
        self.fail_rewrite_call.store(n, Ordering::SeqCst);
    }

    pub fn add_user(&self, user: User) -> Result<()> {
        self.state()?.users.insert(user.id, user);
        Ok(())
    }

    pub fn add_connection(&self, connection: ProviderConnection) -> Result<()> {
        self.state()?
            .connections
            .insert(connection.external_user_id.clone(), connection);
        Ok(())
    }

    /// Insert rows as-is, bypassing the codec. Models rows written before
    /// coordinates were encrypted, and route imports.
    pub fn seed_logs(&self, rows: impl IntoIterator<Item = StoredGpsLog>) -> Result<()> {
        let mut state = self.state()?;
        for row in rows {
            state
                .logs
                .entry(row.parent_kind)
                .or_default()
                .insert((row.parent_id, row.seq), row);
        }
        Ok(())
    }

    pub fn activities(&self) -> Result<Vec<Activity>> {
        Ok(self.state()?.activities.values().cloned().collect())
    }

    /// Every row of a parent kind in (parent_id, seq) order.
    pub fn all_logs(&self, kind: ParentKind) -> Result<Vec<StoredGpsLog>> {
        Ok(self
            .state()?
            .logs
            .get(&kind)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }
}

impl GpsLogStore for MemoryDb {
    async fn find_user_id(&self, user: &ExternalUserRef) -> Result<Option<u64>> {
        let state = self.state()?;
        if let Some(connection) = state.connections.get(&user.user_id) {
            return Ok(Some(connection.user_id));
        }
        Ok(user
            .reference_id
            .as_deref()
            .and_then(|r| r.parse::<u64>().ok())
            .filter(|id| state.users.contains_key(id)))
    }

    async fn find_activity_by_external_id(
        &self,
        user_id: u64,
        external_id: &str,
    ) -> Result<Option<Activity>> {
        Ok(self
            .state()?
            .activities
            .values()
            .find(|a| a.user_id == user_id && a.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn allocate_activity_id(&self) -> Result<u64> {
        let mut state = self.state()?;
        state.last_activity_id += 1;
        Ok(state.last_activity_id)
    }

    async fn insert_activity_with_logs(
        &self,
        activity: &Activity,
        rows: &[StoredGpsLog],
    ) -> Result<bool> {
        self.check_writable()?;
        let mut state = self.state()?;

        if state.activities.contains_key(&activity.id) {
            return Err(AppError::Database(format!(
                "activity {} already exists",
                activity.id
            )));
        }
        if let Some(external_id) = activity.external_id.as_deref() {
            let claimed = state.activities.values().any(|a| {
                a.user_id == activity.user_id && a.external_id.as_deref() == Some(external_id)
            });
            if claimed {
                return Ok(false);
            }
        }

        let logs = state.logs.entry(ParentKind::Activity).or_default();
        for row in rows {
            logs.insert((row.parent_id, row.seq), row.clone());
        }
        state.activities.insert(activity.id, activity.clone());
        Ok(true)
    }

    async fn load_logs(&self, kind: ParentKind, parent_id: u64) -> Result<Vec<StoredGpsLog>> {
        let state = self.state()?;
        Ok(state
            .logs
            .get(&kind)
            .map(|rows| {
                rows.range((parent_id, 0)..=(parent_id, u32::MAX))
                    .map(|(_, row)| row.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count_pending_parents(&self, kind: ParentKind) -> Result<u64> {
        let ids = self.pending_parent_ids(kind, 0, usize::MAX).await?;
        Ok(ids.len() as u64)
    }

    async fn pending_parent_ids(
        &self,
        kind: ParentKind,
        after: u64,
        limit: usize,
    ) -> Result<Vec<u64>> {
        let state = self.state()?;
        let mut ids: Vec<u64> = Vec::new();
        let Some(rows) = state.logs.get(&kind) else {
            return Ok(ids);
        };

        for row in rows
            .range((after.saturating_add(1), 0)..)
            .map(|(_, row)| row)
        {
            if !row.has_plaintext_latitude() || ids.last() == Some(&row.parent_id) {
                continue;
            }
            if ids.len() >= limit {
                break;
            }
            ids.push(row.parent_id);
        }
        Ok(ids)
    }

    async fn plaintext_logs(
        &self,
        kind: ParentKind,
        parent_ids: &[u64],
    ) -> Result<Vec<StoredGpsLog>> {
        let state = self.state()?;
        let Some(rows) = state.logs.get(&kind) else {
            return Ok(Vec::new());
        };

        Ok(parent_ids
            .iter()
            .flat_map(|id| rows.range((*id, 0)..=(*id, u32::MAX)))
            .map(|(_, row)| row)
            .filter(|row| row.has_plaintext_latitude())
            .cloned()
            .collect())
    }

    async fn rewrite_logs(&self, kind: ParentKind, rows: &[StoredGpsLog]) -> Result<()> {
        self.check_writable()?;
        let call = self.rewrite_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_rewrite_call.load(Ordering::SeqCst) {
            return Err(AppError::Database(format!(
                "Database unavailable (injected failure on rewrite {})",
                call
            )));
        }
        let mut state = self.state()?;
        let logs = state.logs.entry(kind).or_default();

        // Validate first so a bad row leaves the page untouched.
        if let Some(missing) = rows
            .iter()
            .find(|row| !logs.contains_key(&(row.parent_id, row.seq)))
        {
            return Err(AppError::NotFound(format!(
                "{} log {}",
                kind,
                missing.document_id()
            )));
        }

        for row in rows {
            logs.insert((row.parent_id, row.seq), row.clone());
        }
        Ok(())
    }
}

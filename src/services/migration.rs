// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Re-encryption of GPS log rows stored before coordinates were encrypted.
//!
//! The job walks one parent kind at a time. Each page selects the next
//! `page_size` parent IDs above the cursor that still have a plaintext
//! row, re-encrypts all of their plaintext rows and writes them back in
//! one isolated unit. The cursor then moves to the largest ID selected.
//! A page whose read or write fails is logged and skipped; its rows stay
//! plaintext and later pages still run. Only a failed page selection, or
//! [`MAX_CONSECUTIVE_PAGE_FAILURES`] failed pages in a row, abandons the
//! collection for the run.
//!
//! Whether a row needs work is derived from its current stored value, so
//! the job keeps no state between runs: a crash or cancellation leaves a
//! mix of encrypted and plaintext rows that the next run picks up.

use crate::db::GpsLogStore;
use crate::error::{AppError, Result};
use crate::models::gps_log::looks_like_plaintext;
use crate::models::{ParentKind, StoredGpsLog};
use crate::services::cipher::CipherError;
use crate::services::codec::EncryptedFieldCodec;
use futures_util::{stream, TryStreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Failed pages in a row after which the store is treated as down.
pub const MAX_CONSECUTIVE_PAGE_FAILURES: u64 = 3;

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// Parents per page
    pub page_size: usize,
    /// Pages migrated concurrently
    pub concurrency: usize,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            concurrency: 1,
        }
    }
}

/// Why a single row could not be upgraded.
#[derive(Debug, thiserror::Error)]
pub enum RowError {
    #[error("Stored value is not a number: {0:?}")]
    NotNumeric(String),

    #[error(transparent)]
    Cipher(#[from] CipherError),
}

/// Shared tallies for one collection; pages may update them concurrently.
#[derive(Debug, Default)]
struct MigrationCounters {
    processed: AtomicU64,
    failed: AtomicU64,
    pages: AtomicU64,
    parents: AtomicU64,
    failed_pages: AtomicU64,
    failure_streak: AtomicU64,
    /// Set when page selection stopped on the cancel flag
    cancelled: AtomicBool,
}

/// Outcome for one parent kind.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionReport {
    pub kind: ParentKind,
    /// Parents with plaintext rows when the run started
    pub pending_at_start: u64,
    pub parents: u64,
    pub pages: u64,
    /// Rows re-encrypted and written back
    pub processed: u64,
    /// Rows that could not be re-encrypted
    pub failed: u64,
    /// Pages skipped because their read or write failed
    pub failed_pages: u64,
    /// Set when the collection was abandoned for this run
    pub aborted: Option<String>,
    /// Set when the cancel flag stopped page selection early
    pub cancelled: bool,
}

impl CollectionReport {
    fn new(kind: ParentKind) -> Self {
        Self {
            kind,
            pending_at_start: 0,
            parents: 0,
            pages: 0,
            processed: 0,
            failed: 0,
            failed_pages: 0,
            aborted: None,
            cancelled: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub collections: Vec<CollectionReport>,
    pub elapsed: Duration,
}

impl MigrationReport {
    pub fn processed(&self) -> u64 {
        self.collections.iter().map(|c| c.processed).sum()
    }

    pub fn failed(&self) -> u64 {
        self.collections.iter().map(|c| c.failed).sum()
    }

    pub fn failed_pages(&self) -> u64 {
        self.collections.iter().map(|c| c.failed_pages).sum()
    }
}

/// Batch re-encryption job. Cloning shares the running/cancel state.
#[derive(Clone)]
pub struct MigrationEngine<S> {
    store: S,
    codec: EncryptedFieldCodec,
    options: MigrationOptions,
    running: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
}

/// An exclusive claim on the engine; released on drop.
pub struct MigrationRun<S> {
    engine: MigrationEngine<S>,
}

impl<S> Drop for MigrationRun<S> {
    fn drop(&mut self) {
        self.engine.running.store(false, Ordering::SeqCst);
    }
}

impl<S: GpsLogStore> MigrationRun<S> {
    pub async fn execute(self) -> MigrationReport {
        self.engine.execute().await
    }
}

impl<S: GpsLogStore> MigrationEngine<S> {
    pub fn new(store: S, codec: EncryptedFieldCodec, options: MigrationOptions) -> Self {
        Self {
            store,
            codec,
            options: MigrationOptions {
                page_size: options.page_size.max(1),
                concurrency: options.concurrency.max(1),
            },
            running: Arc::new(AtomicBool::new(false)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask a running job to stop after the pages in flight.
    pub fn cancel(&self) {
        if self.is_running() {
            tracing::info!("GPS log migration cancellation requested");
        }
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Claim the engine for one run. Fails with `Conflict` if a run is
    /// already in progress.
    pub fn begin(&self) -> Result<MigrationRun<S>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AppError::Conflict(
                "GPS log migration already running".to_string(),
            ));
        }
        self.cancelled.store(false, Ordering::SeqCst);
        Ok(MigrationRun {
            engine: self.clone(),
        })
    }

    /// Claim the engine and run to completion.
    pub async fn run(&self) -> Result<MigrationReport> {
        Ok(self.begin()?.execute().await)
    }

    async fn execute(&self) -> MigrationReport {
        let started = Instant::now();
        let mut collections = Vec::with_capacity(ParentKind::ALL.len());

        for kind in ParentKind::ALL {
            if self.cancelled.load(Ordering::SeqCst) {
                break;
            }
            collections.push(self.migrate_collection(kind, started).await);
        }

        let report = MigrationReport {
            collections,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            processed = report.processed(),
            failed = report.failed(),
            failed_pages = report.failed_pages(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "GPS log migration finished"
        );
        report
    }

    /// Migrate every pending parent of one kind.
    pub async fn migrate_collection(&self, kind: ParentKind, started: Instant) -> CollectionReport {
        let mut report = CollectionReport::new(kind);

        report.pending_at_start = match self.store.count_pending_parents(kind).await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(parent_kind = %kind, error = %e, "Failed to count pending parents");
                report.aborted = Some(e.to_string());
                return report;
            }
        };

        tracing::info!(
            parent_kind = %kind,
            pending_parents = report.pending_at_start,
            "Starting GPS log migration"
        );

        let counters = MigrationCounters::default();
        let counters = &counters;
        let pending = report.pending_at_start;

        let pages = stream::try_unfold(0u64, move |cursor| self.next_page(kind, cursor, counters));
        let outcome = pages
            .try_for_each_concurrent(self.options.concurrency, move |parent_ids| {
                self.isolate_page(kind, parent_ids, counters, pending, started)
            })
            .await;

        report.parents = counters.parents.load(Ordering::Relaxed);
        report.pages = counters.pages.load(Ordering::Relaxed);
        report.processed = counters.processed.load(Ordering::Relaxed);
        report.failed = counters.failed.load(Ordering::Relaxed);
        report.failed_pages = counters.failed_pages.load(Ordering::Relaxed);
        report.cancelled = counters.cancelled.load(Ordering::SeqCst);

        if let Err(e) = outcome {
            tracing::error!(
                parent_kind = %kind,
                error = %e,
                "Abandoning GPS log collection for this run"
            );
            report.aborted = Some(e.to_string());
        }

        tracing::info!(
            parent_kind = %kind,
            parents = report.parents,
            processed = report.processed,
            failed = report.failed,
            failed_pages = report.failed_pages,
            cancelled = report.cancelled,
            "GPS log collection migrated"
        );
        report
    }

    /// Select the page after `cursor`. The next cursor is the largest ID
    /// selected, so parents are never skipped whatever the ID spacing.
    async fn next_page(
        &self,
        kind: ParentKind,
        cursor: u64,
        counters: &MigrationCounters,
    ) -> Result<Option<(Vec<u64>, u64)>> {
        if self.cancelled.load(Ordering::SeqCst) {
            counters.cancelled.store(true, Ordering::SeqCst);
            return Ok(None);
        }
        let parent_ids = self
            .store
            .pending_parent_ids(kind, cursor, self.options.page_size)
            .await?;
        Ok(parent_ids.last().copied().map(|last| (parent_ids, last)))
    }

    /// Run one page, absorbing its failure unless the failure streak says
    /// the store is down.
    async fn isolate_page(
        &self,
        kind: ParentKind,
        parent_ids: Vec<u64>,
        counters: &MigrationCounters,
        pending_at_start: u64,
        started: Instant,
    ) -> Result<()> {
        match self
            .migrate_page(kind, &parent_ids, counters, pending_at_start, started)
            .await
        {
            Ok(()) => {
                counters.failure_streak.store(0, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                let failed_pages = counters.failed_pages.fetch_add(1, Ordering::Relaxed) + 1;
                let streak = counters.failure_streak.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::error!(
                    parent_kind = %kind,
                    parent_ids = ?parent_ids,
                    failed_pages,
                    error = %e,
                    "GPS log migration page failed, its rows stay pending"
                );
                if streak >= MAX_CONSECUTIVE_PAGE_FAILURES {
                    return Err(e);
                }
                Ok(())
            }
        }
    }

    async fn migrate_page(
        &self,
        kind: ParentKind,
        parent_ids: &[u64],
        counters: &MigrationCounters,
        pending_at_start: u64,
        started: Instant,
    ) -> Result<()> {
        let rows = self.store.plaintext_logs(kind, parent_ids).await?;

        let mut upgraded = Vec::with_capacity(rows.len());
        let mut failed = 0u64;
        for row in &rows {
            match self.upgrade_row(row) {
                Ok(new_row) => upgraded.push(new_row),
                Err(e) => {
                    tracing::warn!(
                        parent_kind = %kind,
                        parent_id = row.parent_id,
                        seq = row.seq,
                        error = %e,
                        "Failed to re-encrypt GPS log row"
                    );
                    failed += 1;
                }
            }
        }

        self.store.rewrite_logs(kind, &upgraded).await?;

        let processed =
            counters.processed.fetch_add(upgraded.len() as u64, Ordering::Relaxed) + upgraded.len() as u64;
        let failed = counters.failed.fetch_add(failed, Ordering::Relaxed) + failed;
        let pages = counters.pages.fetch_add(1, Ordering::Relaxed) + 1;
        let parents =
            counters.parents.fetch_add(parent_ids.len() as u64, Ordering::Relaxed) + parent_ids.len() as u64;

        tracing::info!(
            parent_kind = %kind,
            pages,
            processed,
            failed,
            remaining_parents = pending_at_start.saturating_sub(parents),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "GPS log migration progress"
        );
        Ok(())
    }

    /// Encrypt whichever protected fields of a row are still plaintext.
    pub fn upgrade_row(&self, row: &StoredGpsLog) -> std::result::Result<StoredGpsLog, RowError> {
        Ok(StoredGpsLog {
            latitude: self.upgrade_field(row.latitude.as_deref())?,
            longitude: self.upgrade_field(row.longitude.as_deref())?,
            elevation: self.upgrade_field(row.elevation.as_deref())?,
            ..row.clone()
        })
    }

    fn upgrade_field(&self, stored: Option<&str>) -> std::result::Result<Option<String>, RowError> {
        match stored {
            Some(text) if looks_like_plaintext(text) => {
                let value: f64 = text
                    .trim()
                    .parse()
                    .map_err(|_| RowError::NotNumeric(text.to_string()))?;
                Ok(self.codec.to_storage(Some(value))?)
            }
            other => Ok(other.map(str::to_string)),
        }
    }
}

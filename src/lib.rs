// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Ride-Ledger: ride ingestion with encrypted GPS tracks
//!
//! This crate receives cycling activities from a fitness-data provider
//! webhook, aligns their sample streams into per-point GPS logs and stores
//! the coordinates encrypted at rest. It also carries the batch job that
//! re-encrypts rows written before encryption was introduced.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::{GpsLogRepository, GpsLogStore};
use services::{
    CoordinateCipher, EncryptedFieldCodec, IngestionService, MigrationEngine, MigrationOptions,
};

/// Shared application state.
pub struct AppState<S> {
    pub config: Config,
    pub repo: GpsLogRepository<S>,
    pub ingestion: IngestionService<S>,
    pub migration: MigrationEngine<S>,
}

impl<S: GpsLogStore> AppState<S> {
    /// Wire the services around one store and the configured key.
    pub fn new(config: Config, store: S) -> Self {
        let codec = EncryptedFieldCodec::new(CoordinateCipher::new(&config.gps_encryption_key));
        let repo = GpsLogRepository::new(store.clone(), codec.clone());
        let migration = MigrationEngine::new(
            store,
            codec,
            MigrationOptions {
                page_size: config.migration_page_size,
                concurrency: config.migration_concurrency,
            },
        );

        Self {
            ingestion: IngestionService::new(repo.clone()),
            repo,
            migration,
            config,
        }
    }
}

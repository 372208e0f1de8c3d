// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod cipher;
pub mod codec;
pub mod ingest;
pub mod migration;
pub mod reconcile;

pub use cipher::{CipherError, CoordinateCipher, DecryptionError, EncryptionKey, KeyError};
pub use codec::EncryptedFieldCodec;
pub use ingest::{IngestOutcome, IngestSummary, IngestionService};
pub use migration::{MigrationEngine, MigrationOptions, MigrationReport};
pub use reconcile::{ActivityStreams, SampleStreamIndex, TemporalReconciler};

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users and provider connections (webhook user mapping)
//! - Activities (ingested rides)
//! - GPS logs (one collection per parent kind, one document per point)

use super::{collections, GpsLogStore};
use crate::error::{AppError, Result};
use crate::models::{Activity, ExternalUserRef, ParentKind, ProviderConnection, StoredGpsLog, User};
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};

const MAX_CONCURRENT_DB_OPS: usize = 50;
// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;
/// Attempts at claiming a fresh activity ID before giving up.
const MAX_ID_ATTEMPTS: usize = 16;

/// Create-only marker document that claims an activity ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IdReservation {
    reserved_at: String,
}

/// Create-only marker document that claims a provider summary for a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ActivityClaim {
    activity_id: u64,
    claimed_at: String,
}

/// Claim document ID for a user's provider summary. The summary ID is
/// hex-encoded since provider IDs may contain `/`.
fn claim_document_id(user_id: u64, external_id: &str) -> String {
    format!("{}_{}", user_id, hex::encode(external_id))
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user by internal ID.
    pub async fn get_user(&self, user_id: u64) -> Result<Option<User>> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(&user_id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a user.
    pub async fn upsert_user(&self, user: &User) -> Result<()> {
        let _: User = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(user.id.to_string())
            .object(user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Get the connection for a provider user ID.
    pub async fn get_connection(&self, external_user_id: &str) -> Result<Option<ProviderConnection>> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PROVIDER_CONNECTIONS)
            .obj()
            .one(external_user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a provider connection.
    pub async fn upsert_connection(&self, connection: &ProviderConnection) -> Result<()> {
        let _: ProviderConnection = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::PROVIDER_CONNECTIONS)
            .document_id(&connection.external_user_id)
            .object(connection)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Activity Claims ─────────────────────────────────────────

    /// Create the claim document. Returns `false` if it already exists.
    async fn claim_activity(&self, claim_id: &str, activity_id: u64) -> Result<bool> {
        let claim = ActivityClaim {
            activity_id,
            claimed_at: chrono::Utc::now().to_rfc3339(),
        };

        let result: std::result::Result<ActivityClaim, _> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::ACTIVITY_CLAIMS)
            .document_id(claim_id)
            .object(&claim)
            .execute()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(firestore::errors::FirestoreError::DataConflictError(_)) => Ok(false),
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    async fn release_claim(&self, claim_id: &str) -> Result<()> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::ACTIVITY_CLAIMS)
            .document_id(claim_id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── GPS Log Helpers ─────────────────────────────────────────

    /// Write rows in chunks, one transaction per chunk.
    async fn write_logs(&self, collection: &str, rows: &[StoredGpsLog]) -> Result<()> {
        let client = self.get_client()?;

        for chunk in rows.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for row in chunk {
                client
                    .fluent()
                    .update()
                    .in_col(collection)
                    .document_id(row.document_id())
                    .object(row)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!("Failed to add log row to transaction: {}", e))
                    })?;
            }

            transaction
                .commit()
                .await
                .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;
        }

        Ok(())
    }

    /// Helper to batch delete documents using transactions.
    async fn batch_delete<T, F>(&self, items: &[T], collection: &str, id_extractor: F) -> Result<()>
    where
        F: Fn(&T) -> String,
    {
        let client = self.get_client()?;

        for chunk in items.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for item in chunk {
                let doc_id = id_extractor(item);
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(&doc_id)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Database(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }

    /// Walk a GPS log collection in parent ID order and collect distinct
    /// parents that still hold a plaintext latitude.
    async fn scan_plaintext_parents(
        &self,
        kind: ParentKind,
        after: u64,
        limit: Option<usize>,
    ) -> Result<Vec<u64>> {
        let mut rows = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::gps_logs(kind))
            .filter(move |q| q.field("parent_id").greater_than(after))
            .order_by([
                ("parent_id", firestore::FirestoreQueryDirection::Ascending),
                ("seq", firestore::FirestoreQueryDirection::Ascending),
            ])
            .obj::<StoredGpsLog>()
            .stream_query_with_errors()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let mut ids: Vec<u64> = Vec::new();
        while let Some(row) = rows.next().await {
            let row = row.map_err(|e| AppError::Database(e.to_string()))?;
            if !row.has_plaintext_latitude() || ids.last() == Some(&row.parent_id) {
                continue;
            }
            if limit.is_some_and(|l| ids.len() >= l) {
                break;
            }
            ids.push(row.parent_id);
        }

        Ok(ids)
    }
}

impl GpsLogStore for FirestoreDb {
    async fn find_user_id(&self, user: &ExternalUserRef) -> Result<Option<u64>> {
        if let Some(connection) = self.get_connection(&user.user_id).await? {
            return Ok(Some(connection.user_id));
        }

        let Some(reference) = user
            .reference_id
            .as_deref()
            .and_then(|r| r.parse::<u64>().ok())
        else {
            return Ok(None);
        };

        Ok(self.get_user(reference).await?.map(|u| u.id))
    }

    async fn find_activity_by_external_id(
        &self,
        user_id: u64,
        external_id: &str,
    ) -> Result<Option<Activity>> {
        let external_id = external_id.to_string();
        let found: Vec<Activity> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::ACTIVITIES)
            .filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user_id),
                    q.field("external_id").eq(external_id.clone()),
                ])
            })
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(found.into_iter().next())
    }

    async fn allocate_activity_id(&self) -> Result<u64> {
        let client = self.get_client()?;
        let now = chrono::Utc::now();
        let mut candidate = now.timestamp_micros().max(1) as u64;

        for _ in 0..MAX_ID_ATTEMPTS {
            let reservation = IdReservation {
                reserved_at: now.to_rfc3339(),
            };

            let result: std::result::Result<IdReservation, _> = client
                .fluent()
                .insert()
                .into(collections::ACTIVITY_IDS)
                .document_id(candidate.to_string())
                .object(&reservation)
                .execute()
                .await;

            match result {
                Ok(_) => return Ok(candidate),
                Err(firestore::errors::FirestoreError::DataConflictError(_)) => {
                    tracing::debug!(candidate, "Activity ID already claimed, trying next");
                    candidate += 1;
                }
                Err(e) => return Err(AppError::Database(e.to_string())),
            }
        }

        Err(AppError::Database(
            "Could not claim a free activity ID".to_string(),
        ))
    }

    async fn insert_activity_with_logs(
        &self,
        activity: &Activity,
        rows: &[StoredGpsLog],
    ) -> Result<bool> {
        let collection = collections::gps_logs(ParentKind::Activity);

        let claim_id = activity
            .external_id
            .as_deref()
            .map(|external_id| claim_document_id(activity.user_id, external_id));
        if let Some(claim_id) = &claim_id {
            if !self.claim_activity(claim_id, activity.id).await? {
                tracing::debug!(
                    activity_id = activity.id,
                    user_id = activity.user_id,
                    external_id = ?activity.external_id,
                    "Provider summary already claimed (idempotent skip)"
                );
                return Ok(false);
            }
        }

        // Rows first, activity last: the activity document is what makes
        // the unit visible.
        let written = match self.write_logs(collection, rows).await {
            Ok(()) => self
                .get_client()?
                .fluent()
                .update()
                .in_col(collections::ACTIVITIES)
                .document_id(activity.id.to_string())
                .object(activity)
                .execute::<Activity>()
                .await
                .map(|_| ())
                .map_err(|e| AppError::Database(e.to_string())),
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            if let Err(cleanup) = self
                .batch_delete(rows, collection, StoredGpsLog::document_id)
                .await
            {
                tracing::warn!(
                    activity_id = activity.id,
                    error = %cleanup,
                    "Failed to clean up GPS logs of unfinished activity"
                );
            }
            // Release the claim so the provider's redelivery can retry.
            if let Some(claim_id) = &claim_id {
                if let Err(cleanup) = self.release_claim(claim_id).await {
                    tracing::warn!(
                        activity_id = activity.id,
                        error = %cleanup,
                        "Failed to release claim of unfinished activity"
                    );
                }
            }
            return Err(e);
        }

        tracing::info!(
            activity_id = activity.id,
            user_id = activity.user_id,
            points = rows.len(),
            "Activity stored"
        );
        Ok(true)
    }

    async fn load_logs(&self, kind: ParentKind, parent_id: u64) -> Result<Vec<StoredGpsLog>> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::gps_logs(kind))
            .filter(move |q| q.field("parent_id").eq(parent_id))
            .order_by([("seq", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn count_pending_parents(&self, kind: ParentKind) -> Result<u64> {
        let ids = self.scan_plaintext_parents(kind, 0, None).await?;
        Ok(ids.len() as u64)
    }

    async fn pending_parent_ids(
        &self,
        kind: ParentKind,
        after: u64,
        limit: usize,
    ) -> Result<Vec<u64>> {
        self.scan_plaintext_parents(kind, after, Some(limit)).await
    }

    async fn plaintext_logs(
        &self,
        kind: ParentKind,
        parent_ids: &[u64],
    ) -> Result<Vec<StoredGpsLog>> {
        let per_parent = stream::iter(parent_ids.to_vec())
            .map(|parent_id| async move { self.load_logs(kind, parent_id).await })
            .buffered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<Vec<StoredGpsLog>>>>()
            .await;

        let mut rows = Vec::new();
        for result in per_parent {
            rows.extend(result?.into_iter().filter(|r| r.has_plaintext_latitude()));
        }
        Ok(rows)
    }

    async fn rewrite_logs(&self, kind: ParentKind, rows: &[StoredGpsLog]) -> Result<()> {
        self.write_logs(collections::gps_logs(kind), rows).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_document_id_is_path_safe() {
        let id = claim_document_id(42, "garmin/ride 1");
        assert!(id.starts_with("42_"));
        assert!(!id.contains('/'));
        assert_ne!(id, claim_document_id(43, "garmin/ride 1"));
        assert_ne!(id, claim_document_id(42, "garmin/ride 2"));
    }
}

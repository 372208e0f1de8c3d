//! Database layer.
//!
//! [`GpsLogStore`] is the persistence contract the core relies on. It
//! only ever sees [`StoredGpsLog`] rows; turning them into plaintext
//! [`crate::models::GpsLogEntry`] values is [`GpsLogRepository`]'s job.

pub mod firestore;
pub mod memory;
pub mod repository;

pub use self::firestore::FirestoreDb;
pub use memory::MemoryDb;
pub use repository::GpsLogRepository;

use crate::error::Result;
use crate::models::{Activity, ExternalUserRef, ParentKind, StoredGpsLog};
use std::future::Future;

/// Collection names as constants.
pub mod collections {
    use crate::models::ParentKind;

    pub const USERS: &str = "users";
    /// Provider accounts, keyed by provider user ID
    pub const PROVIDER_CONNECTIONS: &str = "provider_connections";
    pub const ACTIVITIES: &str = "activities";
    /// Claimed activity IDs (create-only documents)
    pub const ACTIVITY_IDS: &str = "activity_ids";
    /// Claimed provider summaries, keyed by user and summary ID (create-only)
    pub const ACTIVITY_CLAIMS: &str = "activity_claims";
    pub const ACTIVITY_GPS_LOGS: &str = "activity_gps_logs";
    pub const ROUTE_GPS_LOGS: &str = "route_gps_logs";

    /// GPS log collection for a parent kind.
    pub fn gps_logs(kind: ParentKind) -> &'static str {
        match kind {
            ParentKind::Activity => ACTIVITY_GPS_LOGS,
            ParentKind::Route => ROUTE_GPS_LOGS,
        }
    }
}

/// Storage operations behind ingestion, track reads and migration.
pub trait GpsLogStore: Clone + Send + Sync + 'static {
    /// Map a provider user to an internal user ID.
    fn find_user_id(
        &self,
        user: &ExternalUserRef,
    ) -> impl Future<Output = Result<Option<u64>>> + Send;

    fn find_activity_by_external_id(
        &self,
        user_id: u64,
        external_id: &str,
    ) -> impl Future<Output = Result<Option<Activity>>> + Send;

    /// Claim a fresh activity ID. IDs are never reused, even when the
    /// insert that follows fails.
    fn allocate_activity_id(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Store an activity together with its GPS log rows. The activity is
    /// only visible once every row has been written.
    ///
    /// An activity with an `external_id` atomically claims
    /// `(user_id, external_id)` first. Returns `false` without writing
    /// anything when another insert already holds that claim.
    fn insert_activity_with_logs(
        &self,
        activity: &Activity,
        rows: &[StoredGpsLog],
    ) -> impl Future<Output = Result<bool>> + Send;

    /// All rows of one parent, ordered by `seq`.
    fn load_logs(
        &self,
        kind: ParentKind,
        parent_id: u64,
    ) -> impl Future<Output = Result<Vec<StoredGpsLog>>> + Send;

    /// Number of distinct parents with at least one plaintext row.
    fn count_pending_parents(&self, kind: ParentKind) -> impl Future<Output = Result<u64>> + Send;

    /// Up to `limit` parent IDs greater than `after`, ascending, each with
    /// at least one plaintext row.
    fn pending_parent_ids(
        &self,
        kind: ParentKind,
        after: u64,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<u64>>> + Send;

    /// The plaintext rows of the given parents.
    fn plaintext_logs(
        &self,
        kind: ParentKind,
        parent_ids: &[u64],
    ) -> impl Future<Output = Result<Vec<StoredGpsLog>>> + Send;

    /// Overwrite existing rows in place.
    fn rewrite_logs(
        &self,
        kind: ParentKind,
        rows: &[StoredGpsLog],
    ) -> impl Future<Output = Result<()>> + Send;
}

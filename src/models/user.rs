//! User and provider connection models.

use serde::{Deserialize, Serialize};

/// Internal user profile stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Internal user ID (also used as document ID)
    pub id: u64,
    /// Display name
    pub display_name: String,
    /// When the user signed up
    pub created_at: String,
}

/// Link between a fitness-data provider account and an internal user.
///
/// Keyed by the provider's user ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConnection {
    /// Provider-side user ID (also used as document ID)
    pub external_user_id: String,
    /// Internal user ID
    pub user_id: u64,
    /// Provider name (e.g. "GARMIN")
    pub provider: Option<String>,
    /// When the connection was made
    pub connected_at: String,
}

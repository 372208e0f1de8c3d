//! Application configuration loaded from environment variables.
//!
//! Secrets are read once at startup. Cloud Run injects them as
//! environment variables via secret bindings.

use crate::services::cipher::{EncryptionKey, KeyError, KEY_LEN};
use crate::services::migration::DEFAULT_PAGE_SIZE;
use std::env;
use std::str::FromStr;

/// Cloud Tasks queue allowed to trigger maintenance jobs.
pub const MAINTENANCE_QUEUE_NAME: &str = "maintenance-queue";

/// Application configuration, loaded once at startup.
#[derive(Clone)]
pub struct Config {
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Key for GPS coordinate encryption
    pub gps_encryption_key: EncryptionKey,
    /// Shared secret for inbound webhook signatures
    pub webhook_signing_secret: String,
    /// Parent entities per migration page
    pub migration_page_size: usize,
    /// Migration pages processed concurrently
    pub migration_concurrency: usize,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("gcp_project_id", &self.gcp_project_id)
            .field("port", &self.port)
            .field("gps_encryption_key", &self.gps_encryption_key)
            .field("webhook_signing_secret", &"<redacted>")
            .field("migration_page_size", &self.migration_page_size)
            .field("migration_concurrency", &self.migration_concurrency)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let key = env::var("GPS_ENCRYPTION_KEY")
            .map_err(|_| ConfigError::Missing("GPS_ENCRYPTION_KEY"))?;

        Ok(Self {
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: parse_or("PORT", 8080)?,
            gps_encryption_key: EncryptionKey::from_base64(&key)?,
            webhook_signing_secret: env::var("WEBHOOK_SIGNING_SECRET")
                .map(|v| v.trim().to_string())
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing("WEBHOOK_SIGNING_SECRET"))?,
            migration_page_size: parse_or("MIGRATION_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            migration_concurrency: parse_or("MIGRATION_CONCURRENCY", 1)?,
        })
    }

    /// Deterministic config for testing only.
    pub fn test_default() -> Self {
        Self {
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            gps_encryption_key: EncryptionKey::from_bytes(&[7u8; KEY_LEN])
                .unwrap_or_else(|_| unreachable!("fixed test key has the right length")),
            webhook_signing_secret: "test_signing_secret".to_string(),
            migration_page_size: DEFAULT_PAGE_SIZE,
            migration_concurrency: 1,
        }
    }
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("Invalid GPS_ENCRYPTION_KEY: {0}")]
    InvalidKey(#[from] KeyError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine};

    // One test touches the process environment so runs cannot interleave.
    #[test]
    fn test_config_from_env() {
        env::set_var("WEBHOOK_SIGNING_SECRET", "test_secret");
        env::set_var("MIGRATION_PAGE_SIZE", "25");
        env::remove_var("PORT");

        env::set_var("GPS_ENCRYPTION_KEY", STANDARD.encode([1u8; 16]));
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidKey(KeyError::Length { .. }))
        ));

        env::set_var("GPS_ENCRYPTION_KEY", STANDARD.encode([1u8; KEY_LEN]));
        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.webhook_signing_secret, "test_secret");
        assert_eq!(config.port, 8080);
        assert_eq!(config.migration_page_size, 25);
        assert_eq!(config.migration_concurrency, 1);

        let debug = format!("{:?}", config);
        assert!(!debug.contains("test_secret"));
    }
}

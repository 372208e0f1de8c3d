// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Column-level transform for the encrypted GPS fields.
//!
//! Latitude, longitude and elevation cross the persistence boundary only
//! through [`EncryptedFieldCodec`]. Absent values stay absent; everything
//! else is ciphertext at rest.

use crate::models::{GpsLogEntry, ParentKind, StoredGpsLog};
use crate::services::cipher::{CipherError, CoordinateCipher, DecryptionError};

#[derive(Debug, Clone)]
pub struct EncryptedFieldCodec {
    cipher: CoordinateCipher,
}

impl EncryptedFieldCodec {
    pub fn new(cipher: CoordinateCipher) -> Self {
        Self { cipher }
    }

    pub fn to_storage(&self, value: Option<f64>) -> Result<Option<String>, CipherError> {
        value.map(|v| self.cipher.encrypt(v)).transpose()
    }

    pub fn from_storage(&self, stored: Option<&str>) -> Result<Option<f64>, DecryptionError> {
        stored.map(|s| self.cipher.decrypt(s)).transpose()
    }

    /// Build the at-rest row for one track point.
    pub fn encode_entry(
        &self,
        parent_kind: ParentKind,
        parent_id: u64,
        seq: u32,
        entry: &GpsLogEntry,
    ) -> Result<StoredGpsLog, CipherError> {
        Ok(StoredGpsLog {
            parent_kind,
            parent_id,
            seq,
            log_time: entry.log_time,
            latitude: self.to_storage(Some(entry.latitude))?,
            longitude: self.to_storage(Some(entry.longitude))?,
            elevation: self.to_storage(entry.elevation)?,
            speed: entry.speed,
            distance: entry.distance,
            heart_rate: entry.heart_rate,
            cadence: entry.cadence,
        })
    }

    /// Open an at-rest row. A row without coordinates is corrupt.
    pub fn decode_row(&self, row: &StoredGpsLog) -> Result<GpsLogEntry, DecryptionError> {
        let latitude = self
            .from_storage(row.latitude.as_deref())?
            .ok_or_else(|| DecryptionError::Payload("row has no latitude".to_string()))?;
        let longitude = self
            .from_storage(row.longitude.as_deref())?
            .ok_or_else(|| DecryptionError::Payload("row has no longitude".to_string()))?;

        Ok(GpsLogEntry {
            log_time: row.log_time,
            latitude,
            longitude,
            elevation: self.from_storage(row.elevation.as_deref())?,
            speed: row.speed,
            distance: row.distance,
            heart_rate: row.heart_rate,
            cadence: row.cadence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cipher::{EncryptionKey, KEY_LEN};
    use chrono::{TimeZone, Utc};

    fn codec() -> EncryptedFieldCodec {
        let key = EncryptionKey::from_bytes(&[3u8; KEY_LEN]).unwrap();
        EncryptedFieldCodec::new(CoordinateCipher::new(&key))
    }

    #[test]
    fn test_absent_values_bypass_cipher() {
        let codec = codec();
        assert_eq!(codec.to_storage(None).unwrap(), None);
        assert_eq!(codec.from_storage(None).unwrap(), None);
    }

    #[test]
    fn test_entry_is_encrypted_at_rest() {
        let codec = codec();
        let entry = GpsLogEntry {
            log_time: Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap(),
            latitude: 37.5665,
            longitude: 126.978,
            elevation: None,
            speed: Some(4.2),
            distance: Some(12.0),
            heart_rate: None,
            cadence: Some(88.0),
        };

        let row = codec
            .encode_entry(ParentKind::Activity, 9, 3, &entry)
            .unwrap();
        assert_eq!(row.parent_id, 9);
        assert_eq!(row.seq, 3);
        assert!(!row.has_plaintext_latitude());
        assert_ne!(row.latitude.as_deref(), Some("37.5665"));
        assert_eq!(row.elevation, None);
        assert_eq!(row.speed, Some(4.2));

        assert_eq!(codec.decode_row(&row).unwrap(), entry);
    }

    #[test]
    fn test_corrupt_value_is_not_missing() {
        let codec = codec();
        let result = codec.from_storage(Some("A".repeat(44).as_str()));
        assert!(matches!(result, Err(DecryptionError::Authentication)));
    }
}

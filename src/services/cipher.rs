// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Field-level authenticated encryption for GPS coordinates.
//!
//! Each value is rendered as its shortest round-trip decimal string and
//! sealed with AES-256-GCM under a fresh random 96-bit nonce. The stored
//! form is `base64(nonce || ciphertext || tag)`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt;
use std::sync::Arc;

/// Raw key length for AES-256.
pub const KEY_LEN: usize = 32;

/// Authentication tag length appended by AES-GCM.
const TAG_LEN: usize = 16;

/// A 256-bit symmetric key, decoded once at start-up.
#[derive(Clone)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Decode a base64 key. The decoded value must be exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| KeyError::Encoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| KeyError::Length {
            expected: KEY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(key))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Authenticated encryption of single numeric values.
///
/// Constructed explicitly from an [`EncryptionKey`] and passed to whoever
/// needs it; cloning shares the same key schedule.
#[derive(Clone)]
pub struct CoordinateCipher {
    key: Arc<LessSafeKey>,
    rng: SystemRandom,
}

impl fmt::Debug for CoordinateCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinateCipher")
            .field("algorithm", &"AES-256-GCM")
            .finish_non_exhaustive()
    }
}

impl CoordinateCipher {
    pub fn new(key: &EncryptionKey) -> Self {
        // AES_256_GCM only rejects keys of the wrong length, which the
        // EncryptionKey type already rules out.
        let unbound = match UnboundKey::new(&AES_256_GCM, &key.0) {
            Ok(k) => k,
            Err(_) => unreachable!("EncryptionKey is always {} bytes", KEY_LEN),
        };
        Self {
            key: Arc::new(LessSafeKey::new(unbound)),
            rng: SystemRandom::new(),
        }
    }

    /// Encrypt a finite value. Two calls with the same input never
    /// produce the same output.
    pub fn encrypt(&self, value: f64) -> Result<String, CipherError> {
        if !value.is_finite() {
            return Err(CipherError::Validation(value));
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CipherError::Encryption("random source unavailable".to_string()))?;

        let mut in_out = value.to_string().into_bytes();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| CipherError::Encryption("seal failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&in_out);
        Ok(BASE64.encode(sealed))
    }

    /// Decrypt a value produced by [`CoordinateCipher::encrypt`].
    pub fn decrypt(&self, stored: &str) -> Result<f64, DecryptionError> {
        let sealed = BASE64
            .decode(stored)
            .map_err(|e| DecryptionError::Encoding(e.to_string()))?;

        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(DecryptionError::Truncated(sealed.len()));
        }

        let (nonce_bytes, body) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| DecryptionError::Truncated(sealed.len()))?;

        let mut in_out = body.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| DecryptionError::Authentication)?;

        let text = std::str::from_utf8(plaintext)
            .map_err(|_| DecryptionError::Payload("not UTF-8".to_string()))?;
        let value: f64 = text
            .parse()
            .map_err(|_| DecryptionError::Payload(format!("not a number: {:?}", text)))?;
        if !value.is_finite() {
            return Err(DecryptionError::Payload(format!("not finite: {}", text)));
        }
        Ok(value)
    }
}

/// Key decoding errors. Fatal at start-up.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Encryption key is not valid base64: {0}")]
    Encoding(String),

    #[error("Encryption key must be {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

/// Errors raised while encrypting.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Cannot encrypt non-finite value: {0}")]
    Validation(f64),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error(transparent)]
    Decryption(#[from] DecryptionError),
}

/// A stored value that could not be opened.
///
/// Never interpreted as "no value": callers see this as corruption.
#[derive(Debug, thiserror::Error)]
pub enum DecryptionError {
    #[error("Ciphertext is not valid base64: {0}")]
    Encoding(String),

    #[error("Ciphertext too short ({0} bytes)")]
    Truncated(usize),

    #[error("Ciphertext failed authentication")]
    Authentication,

    #[error("Decrypted payload is invalid: {0}")]
    Payload(String),
}

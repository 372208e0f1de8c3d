// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook route for provider activity uploads.
//!
//! The provider signs every delivery with
//! `terra-signature: t=<unix>,v1=<hex>`, an HMAC-SHA256 of `"<t>.<body>"`
//! under the shared signing secret. The body is only parsed once the
//! signature checks out.

use crate::db::GpsLogStore;
use crate::error::AppError;
use crate::services::IngestOutcome;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "terra-signature";

/// Webhook routes.
pub fn routes<S: GpsLogStore>() -> Router<Arc<AppState<S>>> {
    Router::new().route("/webhook", post(handle_event::<S>))
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature header missing")]
    Missing,

    #[error("signature header malformed")]
    Malformed,

    #[error("signature mismatch")]
    Mismatch,
}

fn mac_for(secret: &[u8], timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::Malformed)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

/// Build a signature header value for `body`.
pub fn sign(secret: &[u8], timestamp: i64, body: &[u8]) -> Result<String, SignatureError> {
    let timestamp = timestamp.to_string();
    let mac = mac_for(secret, &timestamp, body)?;
    Ok(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Check a signature header against `body`.
pub fn verify_signature(
    secret: &[u8],
    header: Option<&str>,
    body: &[u8],
) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::Missing)?;

    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signature = Some(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .filter(|t| t.parse::<i64>().is_ok())
        .ok_or(SignatureError::Malformed)?;
    let provided = signature
        .and_then(|s| hex::decode(s).ok())
        .ok_or(SignatureError::Malformed)?;

    let expected = mac_for(secret, timestamp, body)?.finalize().into_bytes();
    if bool::from(expected.as_slice().ct_eq(&provided)) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Handle an incoming delivery (POST).
///
/// Dropped content (unknown user, non-cycling records, other event types)
/// still returns 200 so the provider does not redeliver it. A failed
/// activity write returns 500 so it does.
async fn handle_event<S: GpsLogStore>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|h| h.to_str().ok());
    if let Err(e) = verify_signature(
        state.config.webhook_signing_secret.as_bytes(),
        signature,
        &body,
    ) {
        tracing::warn!(
            reason = %e,
            "Security Alert: Rejected webhook with invalid signature"
        );
        return Err(AppError::Unauthorized);
    }

    match state.ingestion.ingest_raw(&body).await? {
        IngestOutcome::IgnoredEvent(event_type) => {
            tracing::debug!(event_type = %event_type, "Webhook event ignored");
        }
        IngestOutcome::UnknownUser => {
            tracing::debug!("Webhook for unknown user acknowledged");
        }
        IngestOutcome::Processed(summary) => {
            tracing::debug!(
                user_id = summary.user_id,
                created = summary.created.len(),
                "Webhook delivery stored"
            );
        }
    }

    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_round_trip() {
        let secret = b"secret_key";
        let body = br#"{"type":"activity"}"#;

        let header = sign(secret, 1714545600, body).unwrap();
        assert!(header.starts_with("t=1714545600,v1="));
        assert_eq!(verify_signature(secret, Some(&header), body), Ok(()));
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let secret = b"secret_key";
        let header = sign(secret, 1714545600, b"original").unwrap();

        assert_eq!(
            verify_signature(secret, Some(&header), b"modified"),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_signature(b"wrong_key", Some(&header), b"original"),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_signature_header_shape() {
        let secret = b"secret_key";
        assert_eq!(
            verify_signature(secret, None, b"x"),
            Err(SignatureError::Missing)
        );
        assert_eq!(
            verify_signature(secret, Some("v1=abcd"), b"x"),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify_signature(secret, Some("t=1,v1=not-hex"), b"x"),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify_signature(secret, Some("t=1,v1=abcd"), b"x"),
            Err(SignatureError::Mismatch)
        );
    }
}

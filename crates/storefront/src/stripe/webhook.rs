//! Stripe webhook signature verification.
//!
//! The `Stripe-Signature` header looks like `t=1700000000,v1=<hex>,v1=<hex>`.
//! Each `v1` value is an HMAC-SHA256 of `"{t}.{raw body}"` keyed with the
//! endpoint's signing secret. Several `v1` values appear while a secret is
//! being rolled.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use tracing::debug;

use super::error::WebhookError;
use super::types::{Event, WebhookEvent};

/// Name of the signature header.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

const SIGNATURE_SCHEME: &str = "v1";

/// Parsed `Stripe-Signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

impl SignatureHeader {
    /// Parse a header value. Unknown schemes (e.g. `v0`) are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::MalformedHeader`] if the timestamp is missing
    /// or invalid, or no `v1` signature is present.
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    timestamp = Some(
                        value
                            .parse::<i64>()
                            .map_err(|_| WebhookError::MalformedHeader("invalid timestamp"))?,
                    );
                }
                SIGNATURE_SCHEME => signatures.push(value.to_owned()),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(WebhookError::MalformedHeader("missing timestamp"))?;
        if signatures.is_empty() {
            return Err(WebhookError::MalformedHeader("no v1 signature"));
        }
        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

/// Compute the hex `v1` signature of `payload` signed at `timestamp`.
///
/// # Errors
///
/// Returns [`WebhookError::SignatureMismatch`] if the secret cannot key an HMAC.
pub fn compute_signature(
    secret: &str,
    timestamp: i64,
    payload: &[u8],
) -> Result<String, WebhookError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::SignatureMismatch)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a delivery's signature as of `now` (unix seconds).
///
/// # Errors
///
/// Returns an error if the header is malformed, the timestamp is more than
/// `tolerance_secs` away from `now`, or no signature matches.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &SecretString,
    tolerance_secs: u64,
    now: i64,
) -> Result<(), WebhookError> {
    let header = SignatureHeader::parse(header)?;

    let tolerance = i64::try_from(tolerance_secs).unwrap_or(i64::MAX);
    if now.saturating_sub(header.timestamp).abs() > tolerance {
        return Err(WebhookError::TimestampOutOfTolerance);
    }

    let expected = compute_signature(secret.expose_secret(), header.timestamp, payload)?;
    if !header
        .signatures
        .iter()
        .any(|candidate| constant_time_compare(&expected, candidate))
    {
        return Err(WebhookError::SignatureMismatch);
    }

    debug!("Stripe signature verified");
    Ok(())
}

/// Verify a delivery and decode its event.
///
/// # Errors
///
/// Returns an error if verification fails or the body is not a valid event.
pub fn construct_event(
    payload: &[u8],
    header: Option<&str>,
    secret: &SecretString,
    tolerance_secs: u64,
) -> Result<WebhookEvent, WebhookError> {
    let header = header.ok_or(WebhookError::MissingSignature)?;
    verify_signature(
        payload,
        header,
        secret,
        tolerance_secs,
        chrono::Utc::now().timestamp(),
    )?;

    let event: Event = serde_json::from_slice(payload)
        .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
    debug!(event_id = %event.id, event_type = %event.kind, "Stripe event decoded");
    WebhookEvent::try_from(event).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
}

/// Constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

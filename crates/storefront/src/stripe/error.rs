//! Stripe-related errors.

use thiserror::Error;

/// Errors that can occur when calling the Stripe API.
#[derive(Debug, Error)]
pub enum StripeError {
    /// A key needed for this call is not configured.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    /// HTTP request failed.
    #[error("Stripe request failed: {0}")]
    Request(String),

    /// Failed to parse response.
    #[error("Stripe response error: {0}")]
    Response(String),

    /// Stripe rejected the request. `message` is Stripe's own wording.
    #[error("{message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// A client secret does not embed a payment intent id.
    #[error("malformed client secret")]
    InvalidClientSecret,
}

/// Errors raised while authenticating and decoding a webhook delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("No signature provided")]
    MissingSignature,

    #[error("Malformed Stripe-Signature header: {0}")]
    MalformedHeader(&'static str),

    #[error("Timestamp outside the tolerance zone")]
    TimestampOutOfTolerance,

    #[error("No signatures found matching the expected signature for payload")]
    SignatureMismatch,

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),
}

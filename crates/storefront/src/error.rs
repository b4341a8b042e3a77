//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server errors to Sentry
//! before responding to the client. All route handlers return
//! `Result<T, AppError>`; the body is always `{"error": "<message>"}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use oceane_core::cart::CartError;
use oceane_core::checkout::FlowError;

use crate::db::RepositoryError;
use crate::services::checkout::CheckoutError;
use crate::services::materializer::MaterializeError;
use crate::services::payment_intent::PaymentIntentError;
use crate::stripe::{StripeError, WebhookError};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Session store failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Payment intent creation failed.
    #[error(transparent)]
    PaymentIntent(#[from] PaymentIntentError),

    /// Stripe call failed outside intent creation.
    #[error("Stripe error: {0}")]
    Stripe(#[from] StripeError),

    /// Webhook signature or payload rejected.
    #[error("Webhook Error: {0}")]
    Webhook(#[from] WebhookError),

    /// Order could not be materialized from an event.
    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    /// A required setting is missing.
    #[error("{0}")]
    Configuration(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("{0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Session(_) | Self::Internal(_) | Self::Configuration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::PaymentIntent(err) => match err {
                PaymentIntentError::Stripe(stripe) => stripe_status(stripe, StatusCode::BAD_REQUEST),
                _ => StatusCode::BAD_REQUEST,
            },
            Self::Stripe(err) => stripe_status(err, StatusCode::BAD_GATEWAY),
            Self::Webhook(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Materialize(err) => match err {
                MaterializeError::Metadata(_) => StatusCode::BAD_REQUEST,
                MaterializeError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Cart(err) | Self::Checkout(CheckoutError::Cart(err)) => cart_status(err),
            Self::Checkout(CheckoutError::Flow(_)) => StatusCode::CONFLICT,
            Self::Checkout(CheckoutError::NotStarted) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Checkout(CheckoutError::Processor(err)) => stripe_status(err, StatusCode::BAD_GATEWAY),
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                "Internal server error".to_owned()
            }
            Self::Materialize(MaterializeError::Persistence(_)) => "Failed to create order".to_owned(),
            Self::Stripe(StripeError::Request(_) | StripeError::Response(_))
            | Self::Checkout(CheckoutError::Processor(
                StripeError::Request(_) | StripeError::Response(_),
            )) => {
                "Payment service unavailable".to_owned()
            }
            _ => self.to_string(),
        }
    }
}

/// Processor errors answer with `api_status`; a missing key is a deployment
/// defect and transport failures are upstream outages.
const fn stripe_status(err: &StripeError, api_status: StatusCode) -> StatusCode {
    match err {
        StripeError::NotConfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
        StripeError::Request(_) | StripeError::Response(_) => StatusCode::BAD_GATEWAY,
        StripeError::Api { .. } => api_status,
        StripeError::InvalidClientSecret => StatusCode::BAD_REQUEST,
    }
}

const fn cart_status(err: &CartError) -> StatusCode {
    match err {
        CartError::StaleShipping => StatusCode::CONFLICT,
        CartError::NoSuchLine(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    }
}

impl From<FlowError> for AppError {
    fn from(err: FlowError) -> Self {
        Self::Checkout(CheckoutError::Flow(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Add a breadcrumb for checkout actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("checkout", "Payment intent created", Some(&[("payment_intent_id", "pi_123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

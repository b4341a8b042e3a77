//! `POST /stripe-webhook`.
//!
//! The raw body is needed for signature verification, so it is taken as
//! bytes and decoded only after the signature checks out.

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use serde_json::{Value, json};
use tracing::{info, instrument};

use crate::error::{AppError, Result};
use crate::services::materializer::MaterializeOutcome;
use crate::state::AppState;
use crate::stripe::webhook::{SIGNATURE_HEADER, construct_event};

#[instrument(skip_all)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let stripe = &state.config().stripe;
    let secret = stripe
        .webhook_secret
        .as_ref()
        .ok_or_else(|| AppError::Configuration("STRIPE_WEBHOOK_SECRET is not configured".to_owned()))?;

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let event = construct_event(&body, signature, secret, stripe.webhook_tolerance_secs)?;

    match state.materializer().handle(event).await? {
        MaterializeOutcome::Created {
            order_id,
            items,
            email_sent,
        } => info!(%order_id, items, email_sent, "Order materialized"),
        outcome => info!(?outcome, "Webhook handled"),
    }

    Ok(Json(json!({ "received": true })))
}

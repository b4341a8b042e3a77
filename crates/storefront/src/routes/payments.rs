//! `POST /create-payment-intent`.
//!
//! Accepts the client's cart as JSON and creates a Stripe intent carrying the
//! order snapshot in its metadata. The webhook later rebuilds the order from
//! that snapshot.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use tracing::instrument;

use crate::error::{AppError, Result, add_breadcrumb};
use crate::services::payment_intent::{self, PaymentIntentCreated, PaymentIntentRequest};
use crate::state::AppState;

#[instrument(skip_all)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    payload: std::result::Result<Json<PaymentIntentRequest>, JsonRejection>,
) -> Result<Json<PaymentIntentCreated>> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let created = payment_intent::create_payment_intent(
        state.gateway().as_ref(),
        request,
        state.config().shipping.currency,
    )
    .await?;

    add_breadcrumb(
        "checkout",
        "Payment intent created",
        Some(&[("payment_intent_id", created.payment_intent_id.as_str())]),
    );
    Ok(Json(created))
}

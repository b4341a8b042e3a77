//! Order lookup for the payment confirmation page.

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::models::OrderWithItems;
use crate::state::AppState;

/// The order written for a payment intent. Answers 404 until the webhook
/// has been processed, so the client polls.
#[instrument(skip(state))]
pub async fn by_payment_intent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OrderWithItems>> {
    state
        .orders()
        .find_by_payment_intent(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("order for {id}")))
}

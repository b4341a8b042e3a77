//! Cart route handlers.
//!
//! The cart lives in the session. Every mutation answers with the full
//! [`CartSummary`] so the client never recomputes totals itself.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use oceane_core::cart::{Cart, CartLine};
use oceane_core::checkout::FlowError;
use oceane_core::shipping::{Destination, RateEngine, ShippingOptions, ShippingSelection};
use oceane_core::{CountryCode, CurrencyCode, Money};

use crate::error::{AppError, Result};
use crate::middleware::session::{clear_checkout, load_cart, load_checkout, save_cart};
use crate::state::AppState;

// =============================================================================
// Views
// =============================================================================

/// Everything the cart page shows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    pub lines: Vec<CartLine>,
    pub item_count: usize,
    pub currency: CurrencyCode,
    pub subtotal: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<Destination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_options: Option<ShippingOptions>,
    /// Only present while it matches the current destination and subtotal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<ShippingSelection>,
    pub shipping_cost: Money,
    pub total: Money,
    /// Formatted total, e.g. `"20 500 XPF"`.
    pub total_display: String,
    pub ready_for_payment: bool,
}

impl CartSummary {
    #[must_use]
    pub fn new(cart: &Cart, engine: &RateEngine, currency: CurrencyCode) -> Self {
        Self {
            lines: cart.lines().to_vec(),
            item_count: cart.len(),
            currency,
            subtotal: cart.subtotal(),
            destination: cart.destination().cloned(),
            shipping_options: cart.shipping_options(engine),
            selection: cart.selection().cloned(),
            shipping_cost: cart.shipping_cost(),
            total: cart.total(),
            total_display: cart.total().display(currency),
            ready_for_payment: cart.is_ready_for_payment(),
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationRequest {
    pub country: String,
    #[serde(default)]
    pub city: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingChoice {
    /// `None` for free local delivery.
    #[serde(default)]
    pub carrier_id: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Show the cart.
#[instrument(skip_all)]
pub async fn show(State(state): State<AppState>, session: Session) -> Result<Json<CartSummary>> {
    let cart = load_cart(&session).await?;
    Ok(Json(summary(&state, &cart)))
}

/// Add one unit of a product.
#[instrument(skip_all, fields(product_id = %line.product_id))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Json(line): Json<CartLine>,
) -> Result<Json<CartSummary>> {
    let mut cart = load_cart(&session).await?;
    release_checkout(&session).await?;
    cart.add(line, state.rates())?;
    save_cart(&session, &cart).await?;
    Ok(Json(summary(&state, &cart)))
}

/// Remove the line at `index`.
#[instrument(skip_all, fields(index))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    Path(index): Path<usize>,
) -> Result<Json<CartSummary>> {
    let mut cart = load_cart(&session).await?;
    release_checkout(&session).await?;
    cart.remove(index, state.rates())?;
    save_cart(&session, &cart).await?;
    Ok(Json(summary(&state, &cart)))
}

/// Set where the order ships. Drops a carrier choice the new destination
/// does not offer.
#[instrument(skip_all, fields(country = %request.country))]
pub async fn set_destination(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<DestinationRequest>,
) -> Result<Json<CartSummary>> {
    let country = CountryCode::parse(&request.country)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut cart = load_cart(&session).await?;
    release_checkout(&session).await?;
    cart.set_destination(Destination::new(country, request.city), state.rates());
    save_cart(&session, &cart).await?;
    Ok(Json(summary(&state, &cart)))
}

/// Choose a carrier for the current destination.
#[instrument(skip_all, fields(carrier_id = ?choice.carrier_id))]
pub async fn select_shipping(
    State(state): State<AppState>,
    session: Session,
    Json(choice): Json<ShippingChoice>,
) -> Result<Json<CartSummary>> {
    let mut cart = load_cart(&session).await?;
    release_checkout(&session).await?;
    cart.select_shipping(choice.carrier_id.as_deref(), state.rates())?;
    save_cart(&session, &cart).await?;
    Ok(Json(summary(&state, &cart)))
}

fn summary(state: &AppState, cart: &Cart) -> CartSummary {
    CartSummary::new(cart, state.rates(), state.config().shipping.currency)
}

/// A cart change invalidates the amounts of an open checkout, so the
/// checkout is discarded. Refused while a confirmation is in flight.
async fn release_checkout(session: &Session) -> Result<()> {
    let Some(checkout) = load_checkout(session).await? else {
        return Ok(());
    };
    if checkout.flow.is_in_flight() {
        return Err(FlowError::InvalidTransition {
            state: checkout.flow.state().name(),
            event: "cart_changed",
        }
        .into());
    }
    clear_checkout(session).await?;
    Ok(())
}

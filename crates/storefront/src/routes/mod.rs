//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                         - Health check
//! GET  /health/ready                   - Readiness (database)
//!
//! # Payments
//! POST /create-payment-intent          - Create a Stripe payment intent
//! POST /stripe-webhook                 - Stripe events (signed, not rate limited)
//!
//! # Cart (session)
//! GET    /cart                         - Cart summary with shipping options
//! POST   /cart/items                   - Add one unit of a product
//! DELETE /cart/items/{index}           - Remove a line
//! PUT    /cart/destination             - Set the shipping destination
//! PUT    /cart/shipping                - Select a carrier
//!
//! # Checkout (session)
//! GET  /checkout                       - Current checkout state
//! POST /checkout/start                 - Create the intent for the cart
//! POST /checkout/confirm               - Confirm the payment
//! POST /checkout/refresh               - Read the payment back from Stripe
//! POST /checkout/retry                 - Start over after a failure
//! POST /checkout/cancel                - Abandon the checkout
//!
//! # Shipping
//! GET  /api/shipping/quote             - Options for a destination and subtotal
//! GET  /api/shipping/zones             - Zone table
//! PUT  /api/shipping/zones/{key}       - Edit a zone (admin token)
//! POST /api/shipping/zones/reset       - Restore default zones (admin token)
//!
//! # Orders
//! GET  /api/orders/by-payment-intent/{id} - Order written by the webhook
//!
//! # Location
//! GET  /api/location/reverse           - Reverse geocode coordinates
//! GET  /api/location/country           - Visitor country from IP
//! ```

pub mod cart;
pub mod checkout;
pub mod location;
pub mod orders;
pub mod payments;
pub mod shipping;
pub mod webhooks;

use axum::{
    Router,
    routing::{delete, get, post, put},
};

use crate::middleware::{api_rate_limiter, payment_rate_limiter};
use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/items", post(cart::add))
        .route("/items/{index}", delete(cart::remove))
        .route("/destination", put(cart::set_destination))
        .route("/shipping", put(cart::select_shipping))
}

/// Create the checkout action routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/start", post(checkout::start))
        .route("/confirm", post(checkout::confirm))
        .route("/refresh", post(checkout::refresh))
        .route("/retry", post(checkout::retry))
        .route("/cancel", post(checkout::cancel))
}

/// Create the shipping API routes router.
pub fn shipping_routes() -> Router<AppState> {
    Router::new()
        .route("/quote", get(shipping::quote))
        .route("/zones", get(shipping::zones))
        .route("/zones/reset", post(shipping::reset_zones))
        .route("/zones/{key}", put(shipping::update_zone))
}

/// Create the location API routes router.
pub fn location_routes() -> Router<AppState> {
    Router::new()
        .route("/reverse", get(location::reverse))
        .route("/country", get(location::country))
}

/// Routes that create or confirm payments.
fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/create-payment-intent", post(payments::create_payment_intent))
        .nest("/checkout", checkout_routes())
        .layer(payment_rate_limiter())
}

/// Read-mostly routes under the general API limit.
fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/cart", cart_routes())
        .route("/checkout", get(checkout::show))
        .nest("/api/shipping", shipping_routes())
        .nest("/api/location", location_routes())
        .route(
            "/api/orders/by-payment-intent/{id}",
            get(orders::by_payment_intent),
        )
        .layer(api_rate_limiter())
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(payment_routes())
        .merge(api_routes())
        // Stripe retries on failure; never throttle it
        .route("/stripe-webhook", post(webhooks::stripe_webhook))
}

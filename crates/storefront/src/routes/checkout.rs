//! Checkout route handlers.
//!
//! The flow itself lives in [`CheckoutDriver`](crate::services::CheckoutDriver);
//! these handlers move it in and out of the session.

use axum::{Json, extract::State};
use chrono::Utc;
use tower_sessions::Session;
use tracing::{info, instrument};

use oceane_core::checkout::{FlowEffect, FlowError};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::session::{flush, load_cart, load_checkout, save_cart, save_checkout};
use crate::services::checkout::{
    CheckoutError, CheckoutSession, CheckoutView, Confirmation, CustomerDetails,
};
use crate::state::AppState;
use crate::stripe::ConfirmPayment;

async fn require_checkout(session: &Session) -> Result<CheckoutSession> {
    load_checkout(session)
        .await?
        .ok_or(AppError::Checkout(CheckoutError::NotStarted))
}

/// Current checkout state. A succeeded checkout closes once its display
/// window has passed.
#[instrument(skip_all)]
pub async fn show(session: Session) -> Result<Json<CheckoutView>> {
    let mut checkout = require_checkout(&session).await?;
    if checkout.flow.close_if_due(Utc::now()) {
        save_checkout(&session, &checkout).await?;
    }
    Ok(Json(checkout.view(None)))
}

/// Start a checkout for the session cart.
///
/// Replaces an earlier checkout unless that one is mid-confirmation.
#[instrument(skip_all)]
pub async fn start(
    State(state): State<AppState>,
    session: Session,
    Json(customer): Json<CustomerDetails>,
) -> Result<Json<CheckoutView>> {
    if let Some(previous) = load_checkout(&session).await?
        && previous.flow.is_in_flight()
    {
        return Err(FlowError::InvalidTransition {
            state: previous.flow.state().name(),
            event: "start",
        }
        .into());
    }

    let cart = load_cart(&session).await?;
    let checkout = state.checkout().start(&cart, customer).await?;
    if let Some(intent) = checkout.flow.current_intent() {
        add_breadcrumb("checkout", "Payment intent created", Some(&[("payment_intent_id", intent)]));
    }
    save_checkout(&session, &checkout).await?;
    Ok(Json(checkout.view(None)))
}

/// Confirm the payment with the method collected by the payment form.
///
/// The in-flight state is flushed before calling the processor so a second
/// submit or a cancel from another tab is refused. The settled flow is saved
/// before the cart is touched.
#[instrument(skip_all)]
pub async fn confirm(
    State(state): State<AppState>,
    session: Session,
    Json(params): Json<ConfirmPayment>,
) -> Result<Json<CheckoutView>> {
    let driver = state.checkout();
    let mut checkout = require_checkout(&session).await?;

    let client_secret = driver.submit(&mut checkout, Utc::now())?;
    save_checkout(&session, &checkout).await?;
    flush(&session).await?;

    let confirmation = driver
        .complete(&mut checkout, &client_secret, &params, Utc::now())
        .await?;
    settle(&session, &checkout, &confirmation).await?;
    Ok(Json(checkout.view(confirmation.redirect_url)))
}

/// Read the payment back from the processor.
///
/// Called when the customer returns from an out-of-band step, while a payment
/// is processing, or to recover a confirmation that never answered.
#[instrument(skip_all)]
pub async fn refresh(State(state): State<AppState>, session: Session) -> Result<Json<CheckoutView>> {
    let mut checkout = require_checkout(&session).await?;
    let confirmation = state.checkout().refresh(&mut checkout, Utc::now()).await?;
    settle(&session, &checkout, &confirmation).await?;
    Ok(Json(checkout.view(confirmation.redirect_url)))
}

async fn settle(session: &Session, checkout: &CheckoutSession, confirmation: &Confirmation) -> Result<()> {
    save_checkout(session, checkout).await?;
    if confirmation.effect == FlowEffect::ClearCart {
        let mut cart = load_cart(session).await?;
        cart.clear();
        save_cart(session, &cart).await?;
        if let Some(intent) = checkout.flow.current_intent() {
            info!(payment_intent_id = intent, "Checkout succeeded, cart cleared");
        }
    }
    Ok(())
}

/// Start over with a fresh intent after a failure.
#[instrument(skip_all)]
pub async fn retry(State(state): State<AppState>, session: Session) -> Result<Json<CheckoutView>> {
    let mut checkout = require_checkout(&session).await?;
    let cart = load_cart(&session).await?;
    state.checkout().retry(&mut checkout, &cart).await?;
    save_checkout(&session, &checkout).await?;
    Ok(Json(checkout.view(None)))
}

/// Abandon the checkout. The cart is kept.
#[instrument(skip_all)]
pub async fn cancel(State(state): State<AppState>, session: Session) -> Result<Json<CheckoutView>> {
    let mut checkout = require_checkout(&session).await?;
    state.checkout().cancel(&mut checkout)?;
    save_checkout(&session, &checkout).await?;
    Ok(Json(checkout.view(None)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};

    use oceane_core::IntentStatus;

    use crate::config::tests::test_config;
    use crate::routes::test_support::TestApp;
    use crate::testing::FakeGateway;

    /// One pearl shipping to Papeete, free local delivery selected.
    async fn fill_cart(app: &mut TestApp) {
        app.json(
            "POST",
            "/cart/items",
            &json!({"productId": "perle-1", "name": "Perle de Tahiti", "unitPrice": 12_000}),
        )
        .await;
        app.json("PUT", "/cart/destination", &json!({"country": "PF", "city": "Papeete"}))
            .await;
        let (status, _) = app.json("PUT", "/cart/shipping", &json!({})).await;
        assert_eq!(status, StatusCode::OK);
    }

    async fn start(app: &mut TestApp) -> (StatusCode, Value) {
        app.json(
            "POST",
            "/checkout/start",
            &json!({"email": "hina@example.pf", "name": "Hina"}),
        )
        .await
    }

    async fn confirm(app: &mut TestApp) -> (StatusCode, Value) {
        app.json("POST", "/checkout/confirm", &json!({"paymentMethod": "pm_card_visa"}))
            .await
    }

    #[tokio::test]
    async fn test_no_checkout_is_not_found() {
        let mut app = TestApp::new();
        let (status, _) = app.get("/checkout").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_start_requires_ready_cart() {
        let mut app = TestApp::new();
        let (status, body) = start(&mut app).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "cart is empty");
    }

    #[tokio::test]
    async fn test_successful_checkout_clears_cart() {
        let mut app = TestApp::new();
        fill_cart(&mut app).await;

        let (status, body) = start(&mut app).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"]["state"], "awaiting_confirmation");
        assert_eq!(body["amounts"]["total"], 12_000);
        assert!(body["clientSecret"].as_str().unwrap().ends_with("_secret_test"));

        let (status, body) = confirm(&mut app).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"]["state"], "succeeded");

        let (_, cart) = app.get("/cart").await;
        assert_eq!(cart["itemCount"], 0);
    }

    #[tokio::test]
    async fn test_customer_action_returns_redirect() {
        let mut app = TestApp::with(test_config(), FakeGateway::confirming_with(IntentStatus::RequiresAction));
        fill_cart(&mut app).await;
        start(&mut app).await;

        let (status, body) = confirm(&mut app).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"]["state"], "awaiting_confirmation");
        assert!(body["redirectUrl"].is_string());

        let (_, cart) = app.get("/cart").await;
        assert_eq!(cart["itemCount"], 1);
    }

    #[tokio::test]
    async fn test_failed_intent_can_be_retried() {
        let mut app = TestApp::with(test_config(), FakeGateway::failing_with("Invalid API Key provided"));
        fill_cart(&mut app).await;

        let (status, body) = start(&mut app).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"]["state"], "failed");

        let (status, body) = app.json("POST", "/checkout/retry", &json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["attempts"], 2);
    }

    #[tokio::test]
    async fn test_confirm_twice_is_refused() {
        let mut app = TestApp::new();
        fill_cart(&mut app).await;
        start(&mut app).await;
        confirm(&mut app).await;

        let (status, _) = confirm(&mut app).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_cancel_keeps_cart() {
        let mut app = TestApp::new();
        fill_cart(&mut app).await;
        start(&mut app).await;

        let (status, body) = app.json("POST", "/checkout/cancel", &json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"]["state"], "closed");

        let (_, cart) = app.get("/cart").await;
        assert_eq!(cart["readyForPayment"], true);
    }

    #[tokio::test]
    async fn test_refresh_after_redirect_completes_without_new_intent() {
        let mut app = TestApp::with(test_config(), FakeGateway::confirming_with(IntentStatus::RequiresAction));
        fill_cart(&mut app).await;
        start(&mut app).await;
        confirm(&mut app).await;

        app.gateway.settle(IntentStatus::Succeeded);
        let (status, body) = app.json("POST", "/checkout/refresh", &json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"]["state"], "succeeded");
        assert_eq!(body["attempts"], 1);
        assert_eq!(app.gateway.created().len(), 1);

        let (_, cart) = app.get("/cart").await;
        assert_eq!(cart["itemCount"], 0);
    }

    #[tokio::test]
    async fn test_dropped_confirmation_recovers_once_stalled() {
        let mut app = TestApp::with(test_config(), FakeGateway::hanging_confirm());
        fill_cart(&mut app).await;
        start(&mut app).await;

        let request = Request::post("/checkout/confirm")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"paymentMethod": "pm_card_visa"}).to_string()))
            .unwrap();
        let dropped = tokio::time::timeout(Duration::from_millis(200), app.send(request)).await;
        assert!(dropped.is_err());

        let (_, body) = app.get("/checkout").await;
        assert_eq!(body["state"]["submitting"], true);
        for (method, uri) in [
            ("POST", "/checkout/cancel"),
            ("POST", "/checkout/retry"),
            ("POST", "/checkout/start"),
            ("POST", "/checkout/refresh"),
        ] {
            let (status, _) = app.json(method, uri, &json!({})).await;
            assert_eq!(status, StatusCode::CONFLICT, "{uri}");
        }

        app.edit_session("checkout", |checkout| {
            let submitted = chrono::Utc::now() - chrono::Duration::minutes(5);
            checkout["flow"]["submitted_at"] = json!(submitted);
        })
        .await;
        app.gateway.settle(IntentStatus::Succeeded);

        let (status, body) = app.json("POST", "/checkout/refresh", &json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"]["state"], "succeeded");
        assert_eq!(app.gateway.created().len(), 1);
        let (_, cart) = app.get("/cart").await;
        assert_eq!(cart["itemCount"], 0);
    }

    #[tokio::test]
    async fn test_stalled_unpaid_confirmation_can_be_cancelled_after_refresh() {
        let mut app = TestApp::with(test_config(), FakeGateway::hanging_confirm());
        fill_cart(&mut app).await;
        start(&mut app).await;
        let request = Request::post("/checkout/confirm")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"paymentMethod": "pm_card_visa"}).to_string()))
            .unwrap();
        let _ = tokio::time::timeout(Duration::from_millis(200), app.send(request)).await;

        app.edit_session("checkout", |checkout| {
            checkout["flow"]
                .as_object_mut()
                .unwrap()
                .remove("submitted_at");
        })
        .await;

        let (status, body) = app.json("POST", "/checkout/refresh", &json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"]["submitting"], false);

        let (status, _) = app.json("POST", "/checkout/cancel", &json!({})).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app
            .json("POST", "/cart/items", &json!({"productId": "perle-2", "name": "Keshi", "unitPrice": 4_000}))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_processing_payment_stays_awaiting() {
        let mut app = TestApp::with(test_config(), FakeGateway::confirming_with(IntentStatus::Processing));
        fill_cart(&mut app).await;
        start(&mut app).await;

        let (status, body) = confirm(&mut app).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"]["state"], "awaiting_confirmation");
        let (_, cart) = app.get("/cart").await;
        assert_eq!(cart["itemCount"], 1);
    }
}

//! Checkout orchestration.
//!
//! [`PaymentFlow`] decides what may happen next; this driver performs the
//! processor calls and feeds their outcomes back in. A [`CheckoutSession`]
//! lives in the HTTP session next to the cart.
//!
//! Confirmation is split in two so the route can persist the in-flight state
//! before calling the processor: [`CheckoutDriver::submit`] marks the flow as
//! submitting, [`CheckoutDriver::complete`] performs the confirmation.
//!
//! The processor stays the source of truth for an intent. When a
//! confirmation errors, or the customer comes back from an out-of-band step,
//! [`CheckoutDriver::refresh`] and [`CheckoutDriver::complete`] read the
//! intent back instead of guessing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use oceane_core::cart::{Cart, CartError, CheckoutAmounts};
use oceane_core::checkout::{FlowEffect, FlowError, PaymentEvent, PaymentFlow, PaymentState};
use oceane_core::{CurrencyCode, IntentStatus};

use crate::models::order::ShippingAddress;
use crate::services::payment_intent::{PaymentIntentRequest, RequestItem, create_payment_intent};
use crate::stripe::{ConfirmPayment, PaymentGateway, StripeError};

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error("no checkout in progress")]
    NotStarted,

    /// The processor could not be reached to settle the payment's state.
    #[error("payment status unavailable: {0}")]
    Processor(#[source] StripeError),
}

/// Customer details captured when checkout starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub shipping_address: Option<ShippingAddress>,
}

/// Checkout state persisted in the HTTP session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub flow: PaymentFlow,
    /// Amounts the current intent was created for.
    pub amounts: CheckoutAmounts,
    pub customer: CustomerDetails,
}

/// Client-facing view of a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutView {
    pub state: PaymentState,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    pub amounts: CheckoutAmounts,
}

impl CheckoutSession {
    #[must_use]
    pub fn view(&self, redirect_url: Option<String>) -> CheckoutView {
        CheckoutView {
            state: self.flow.state().clone(),
            attempts: self.flow.attempts(),
            client_secret: self.flow.client_secret().map(str::to_owned),
            redirect_url,
            amounts: self.amounts.clone(),
        }
    }
}

/// Result of a confirmation round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub effect: FlowEffect,
    /// Where to send the customer for an out-of-band step.
    pub redirect_url: Option<String>,
}

#[derive(Clone)]
pub struct CheckoutDriver {
    gateway: Arc<dyn PaymentGateway>,
    currency: CurrencyCode,
}

impl CheckoutDriver {
    #[must_use]
    pub fn new(gateway: Arc<dyn PaymentGateway>, currency: CurrencyCode) -> Self {
        Self { gateway, currency }
    }

    /// Begin a checkout for `cart` and create its first intent.
    ///
    /// An intent creation failure leaves the returned session in the failed
    /// state rather than erroring.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Cart`] unless the cart is ready for payment.
    #[instrument(skip_all)]
    pub async fn start(
        &self,
        cart: &Cart,
        customer: CustomerDetails,
    ) -> Result<CheckoutSession, CheckoutError> {
        let amounts = cart.checkout_amounts()?;
        let mut session = CheckoutSession {
            flow: PaymentFlow::new(),
            amounts,
            customer,
        };
        self.create_intent(&mut session, cart).await?;
        Ok(session)
    }

    /// Start over with a fresh intent after a failure. The cart is re-checked
    /// so a retry never charges stale amounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the flow is not failed or the cart is not ready.
    #[instrument(skip_all)]
    pub async fn retry(&self, session: &mut CheckoutSession, cart: &Cart) -> Result<(), CheckoutError> {
        let amounts = cart.checkout_amounts()?;
        if session.flow.apply(PaymentEvent::Retry)? == FlowEffect::CreateIntent {
            session.amounts = amounts;
            self.create_intent(session, cart).await?;
        }
        Ok(())
    }

    async fn create_intent(&self, session: &mut CheckoutSession, cart: &Cart) -> Result<(), CheckoutError> {
        let request = PaymentIntentRequest {
            amount: Some(session.amounts.total.minor()),
            currency: Some(self.currency.as_str().to_owned()),
            items: cart.lines().iter().map(RequestItem::from).collect(),
            shipping_cost: Some(session.amounts.shipping.minor()),
            customer_email: session.customer.email.clone(),
            customer_name: session.customer.name.clone(),
            user_id: session.customer.user_id.clone(),
            shipping_address: session.customer.shipping_address.clone(),
        };

        let event = match create_payment_intent(self.gateway.as_ref(), request, self.currency).await {
            Ok(created) => PaymentEvent::IntentCreated {
                client_secret: created.client_secret,
                payment_intent_id: created.payment_intent_id,
            },
            Err(e) => {
                warn!(error = %e, attempt = session.flow.attempts(), "Payment intent creation failed");
                PaymentEvent::IntentFailed {
                    message: e.to_string(),
                }
            }
        };
        session.flow.apply(event)?;
        Ok(())
    }

    /// Mark the payment form as submitted. Returns the client secret to
    /// confirm with.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Flow`] unless the flow awaits confirmation
    /// and nothing is in flight.
    pub fn submit(
        &self,
        session: &mut CheckoutSession,
        now: DateTime<Utc>,
    ) -> Result<String, CheckoutError> {
        let client_secret = session
            .flow
            .client_secret()
            .map(str::to_owned)
            .ok_or(FlowError::InvalidTransition {
                state: session.flow.state().name(),
                event: "confirmation_submitted",
            })?;
        session
            .flow
            .apply(PaymentEvent::ConfirmationSubmitted { at: now })?;
        Ok(client_secret)
    }

    /// Confirm a submitted payment with the processor.
    ///
    /// A rejected confirmation is checked against the intent itself: an
    /// intent that already succeeded (a repeated confirmation after an
    /// out-of-band step) or is still settling keeps the flow on it.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Flow`] if the flow was not submitted, and
    /// [`CheckoutError::Processor`] if neither the confirmation nor the read
    /// back got an answer. The flow stays submitting in that case.
    /// Otherwise processor errors move the flow to failed.
    #[instrument(skip_all)]
    pub async fn complete(
        &self,
        session: &mut CheckoutSession,
        client_secret: &str,
        params: &ConfirmPayment,
        now: DateTime<Utc>,
    ) -> Result<Confirmation, CheckoutError> {
        let (event, redirect_url) = match self.gateway.confirm_payment(client_secret, params).await {
            Ok(intent) => {
                info!(payment_intent_id = %intent.id, status = %intent.status, "Payment confirmation answered");
                let redirect = intent.redirect_url().map(str::to_owned);
                (
                    PaymentEvent::Confirmed {
                        status: intent.status,
                        at: now,
                    },
                    redirect,
                )
            }
            Err(e) => {
                warn!(error = %e, "Payment confirmation failed");
                match self.gateway.retrieve_intent(client_secret).await {
                    Ok(intent) if keeps_intent(intent.status) => {
                        info!(payment_intent_id = %intent.id, status = %intent.status, "Confirmation error superseded by intent status");
                        let redirect = intent.redirect_url().map(str::to_owned);
                        (
                            PaymentEvent::Confirmed {
                                status: intent.status,
                                at: now,
                            },
                            redirect,
                        )
                    }
                    Ok(_) => (
                        PaymentEvent::ConfirmationFailed {
                            message: e.to_string(),
                        },
                        None,
                    ),
                    Err(read) => {
                        warn!(error = %read, "Payment intent read back failed");
                        return Err(CheckoutError::Processor(e));
                    }
                }
            }
        };

        let effect = session.flow.apply(event)?;
        Ok(confirmation(effect, redirect_url))
    }

    /// Settle the flow from the intent's current status at the processor.
    ///
    /// Used when the customer returns from an out-of-band step, while a
    /// payment is processing, or once a confirmation has stalled.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Flow`] unless the flow awaits confirmation
    /// (a submitted one only once stalled), and [`CheckoutError::Processor`]
    /// if the intent cannot be read.
    #[instrument(skip_all)]
    pub async fn refresh(
        &self,
        session: &mut CheckoutSession,
        now: DateTime<Utc>,
    ) -> Result<Confirmation, CheckoutError> {
        let refused = FlowError::InvalidTransition {
            state: session.flow.state().name(),
            event: "refreshed",
        };
        let client_secret = session.flow.client_secret().ok_or(refused.clone())?;
        if session.flow.is_in_flight() && !session.flow.is_stalled(now) {
            return Err(refused.into());
        }

        let intent = self
            .gateway
            .retrieve_intent(client_secret)
            .await
            .map_err(CheckoutError::Processor)?;
        info!(payment_intent_id = %intent.id, status = %intent.status, "Payment intent refreshed");

        let effect = session.flow.apply(PaymentEvent::Refreshed {
            status: intent.status,
            at: now,
        })?;
        Ok(confirmation(effect, intent.redirect_url().map(str::to_owned)))
    }

    /// Abandon the checkout. Refused while a confirmation is in flight.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Flow`] if the flow cannot be cancelled now.
    pub fn cancel(&self, session: &mut CheckoutSession) -> Result<(), CheckoutError> {
        session.flow.apply(PaymentEvent::Cancel)?;
        if let Some(intent) = session.flow.current_intent() {
            info!(payment_intent_id = intent, "Checkout cancelled");
        }
        Ok(())
    }
}

/// Statuses that mean the intent is still the customer's payment after a
/// confirmation error.
fn keeps_intent(status: IntentStatus) -> bool {
    status == IntentStatus::Succeeded || status.needs_customer_action() || status.is_pending()
}

fn confirmation(effect: FlowEffect, redirect_url: Option<String>) -> Confirmation {
    Confirmation {
        redirect_url: (effect == FlowEffect::AwaitCustomerAction)
            .then_some(redirect_url)
            .flatten(),
        effect,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{FakeGateway, ready_cart};
    use oceane_core::checkout::CheckoutOutcome;
    use oceane_core::shipping::RatePolicy;
    use oceane_core::{IntentStatus, Money};

    fn driver(gateway: FakeGateway) -> (CheckoutDriver, Arc<FakeGateway>) {
        let gateway = Arc::new(gateway);
        (
            CheckoutDriver::new(gateway.clone(), CurrencyCode::Xpf),
            gateway,
        )
    }

    fn card() -> ConfirmPayment {
        ConfirmPayment {
            payment_method: "pm_card_visa".to_owned(),
            return_url: Some("https://pearl.example/checkout".to_owned()),
        }
    }

    async fn confirm(driver: &CheckoutDriver, session: &mut CheckoutSession) -> Confirmation {
        let secret = driver.submit(session, Utc::now()).unwrap();
        driver.complete(session, &secret, &card(), Utc::now()).await.unwrap()
    }

    #[tokio::test]
    async fn test_start_requires_fresh_shipping() {
        let (driver, gateway) = driver(FakeGateway::default());
        let err = driver
            .start(&Cart::new(), CustomerDetails::default())
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::Cart(CartError::Empty)));
        assert!(gateway.created().is_empty());
    }

    #[tokio::test]
    async fn test_start_creates_intent_for_cart_amounts() {
        let (driver, gateway) = driver(FakeGateway::default());
        let (cart, _) = ready_cart(RatePolicy::ZoneGated);
        let session = driver.start(&cart, CustomerDetails::default()).await.unwrap();

        assert!(matches!(session.flow.state(), PaymentState::AwaitingConfirmation { .. }));
        let created = gateway.created();
        let params = created.first().unwrap();
        assert_eq!(params.amount, cart.total());
        assert_eq!(
            params.metadata.get("shipping_cost").unwrap(),
            &cart.shipping_cost().minor().to_string()
        );
    }

    #[tokio::test]
    async fn test_successful_confirmation_clears_cart() {
        let (driver, _) = driver(FakeGateway::default());
        let (cart, _) = ready_cart(RatePolicy::ZoneGated);
        let mut session = driver.start(&cart, CustomerDetails::default()).await.unwrap();

        let confirmation = confirm(&driver, &mut session).await;
        assert_eq!(confirmation.effect, FlowEffect::ClearCart);
        assert!(matches!(session.flow.state(), PaymentState::Succeeded { .. }));
    }

    #[tokio::test]
    async fn test_required_action_returns_redirect() {
        let (driver, _) = driver(FakeGateway::confirming_with(IntentStatus::RequiresAction));
        let (cart, _) = ready_cart(RatePolicy::ZoneGated);
        let mut session = driver.start(&cart, CustomerDetails::default()).await.unwrap();

        let confirmation = confirm(&driver, &mut session).await;
        assert_eq!(confirmation.effect, FlowEffect::AwaitCustomerAction);
        assert!(confirmation.redirect_url.is_some());
        assert!(session.flow.client_secret().is_some());
    }

    #[tokio::test]
    async fn test_refresh_after_redirect_settles_the_same_intent() {
        let (driver, gateway) = driver(FakeGateway::confirming_with(IntentStatus::RequiresAction));
        let (cart, _) = ready_cart(RatePolicy::ZoneGated);
        let mut session = driver.start(&cart, CustomerDetails::default()).await.unwrap();
        confirm(&driver, &mut session).await;

        gateway.settle(IntentStatus::Succeeded);
        let confirmation = driver.refresh(&mut session, Utc::now()).await.unwrap();

        assert_eq!(confirmation.effect, FlowEffect::ClearCart);
        assert!(matches!(session.flow.state(), PaymentState::Succeeded { .. }));
        assert_eq!(gateway.created().len(), 1);
        assert_eq!(gateway.confirm_count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_confirmation_of_a_succeeded_intent_succeeds() {
        let (driver, gateway) = driver(FakeGateway::rejecting_confirm_with(
            "This PaymentIntent's payment_method could not be updated because it has a status of succeeded.",
        ));
        let (cart, _) = ready_cart(RatePolicy::ZoneGated);
        let mut session = driver.start(&cart, CustomerDetails::default()).await.unwrap();
        gateway.settle(IntentStatus::Succeeded);

        let confirmation = confirm(&driver, &mut session).await;
        assert_eq!(confirmation.effect, FlowEffect::ClearCart);
        assert!(session.flow.abandoned_intents().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_confirmation_of_an_unpaid_intent_fails() {
        let (driver, _) = driver(FakeGateway::rejecting_confirm_with("Your card was declined."));
        let (cart, _) = ready_cart(RatePolicy::ZoneGated);
        let mut session = driver.start(&cart, CustomerDetails::default()).await.unwrap();

        confirm(&driver, &mut session).await;
        assert_eq!(
            session.flow.state(),
            &PaymentState::Failed {
                message: "Your card was declined.".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_processor_keeps_flow_submitting() {
        let (driver, gateway) = driver(FakeGateway::rejecting_confirm_with("timeout"));
        gateway.fail_retrieves();
        let (cart, _) = ready_cart(RatePolicy::ZoneGated);
        let mut session = driver.start(&cart, CustomerDetails::default()).await.unwrap();

        let submitted = Utc::now();
        let secret = driver.submit(&mut session, submitted).unwrap();
        let err = driver
            .complete(&mut session, &secret, &card(), submitted)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Processor(_)));
        assert!(session.flow.is_in_flight());

        // not stalled yet
        let err = driver.refresh(&mut session, submitted).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Flow(_)));
    }

    #[tokio::test]
    async fn test_processing_payment_waits_for_processor() {
        let (driver, gateway) = driver(FakeGateway::confirming_with(IntentStatus::Processing));
        let (cart, _) = ready_cart(RatePolicy::ZoneGated);
        let mut session = driver.start(&cart, CustomerDetails::default()).await.unwrap();

        let confirmation = confirm(&driver, &mut session).await;
        assert_eq!(confirmation.effect, FlowEffect::AwaitProcessor);
        assert_eq!(session.flow.state().name(), "awaiting_confirmation");

        let confirmation = driver.refresh(&mut session, Utc::now()).await.unwrap();
        assert_eq!(confirmation.effect, FlowEffect::AwaitProcessor);

        gateway.settle(IntentStatus::Succeeded);
        let confirmation = driver.refresh(&mut session, Utc::now()).await.unwrap();
        assert_eq!(confirmation.effect, FlowEffect::ClearCart);
    }

    #[tokio::test]
    async fn test_retry_abandons_the_old_intent() {
        let (driver, gateway) = driver(FakeGateway::confirming_with(IntentStatus::Canceled));
        let (cart, _) = ready_cart(RatePolicy::ZoneGated);
        let mut session = driver.start(&cart, CustomerDetails::default()).await.unwrap();
        let first = session.flow.current_intent().unwrap().to_owned();

        confirm(&driver, &mut session).await;
        assert!(matches!(session.flow.state(), PaymentState::Failed { .. }));

        driver.retry(&mut session, &cart).await.unwrap();
        assert_eq!(gateway.created().len(), 2);
        assert_eq!(session.flow.attempts(), 2);
        assert_eq!(session.flow.abandoned_intents(), [first.clone()]);
        assert_ne!(session.flow.current_intent(), Some(first.as_str()));
    }

    #[tokio::test]
    async fn test_intent_failure_is_retryable() {
        let (driver, _) = driver(FakeGateway::failing_with("Invalid API Key provided"));
        let (cart, _) = ready_cart(RatePolicy::ZoneGated);
        let mut session = driver.start(&cart, CustomerDetails::default()).await.unwrap();

        assert_eq!(
            session.flow.state(),
            &PaymentState::Failed {
                message: "Invalid API Key provided".to_owned()
            }
        );
        driver.retry(&mut session, &cart).await.unwrap();
        assert_eq!(session.flow.attempts(), 2);
    }

    #[tokio::test]
    async fn test_cancel_is_refused_while_in_flight() {
        let (driver, _) = driver(FakeGateway::default());
        let (cart, _) = ready_cart(RatePolicy::ZoneGated);
        let mut session = driver.start(&cart, CustomerDetails::default()).await.unwrap();

        driver.submit(&mut session, Utc::now()).unwrap();
        assert!(driver.cancel(&mut session).is_err());
        assert!(driver.submit(&mut session, Utc::now()).is_err());
    }

    #[tokio::test]
    async fn test_cancel_closes_an_idle_checkout() {
        let (driver, _) = driver(FakeGateway::default());
        let (cart, _) = ready_cart(RatePolicy::ZoneGated);
        let mut session = driver.start(&cart, CustomerDetails::default()).await.unwrap();

        driver.cancel(&mut session).unwrap();
        assert_eq!(
            session.flow.state(),
            &PaymentState::Closed {
                outcome: CheckoutOutcome::Cancelled
            }
        );
    }

    #[tokio::test]
    async fn test_view_exposes_client_secret_only_while_awaiting() {
        let (driver, _) = driver(FakeGateway::default());
        let (cart, _) = ready_cart(RatePolicy::ZoneGated);
        let mut session = driver.start(&cart, CustomerDetails::default()).await.unwrap();
        assert!(session.view(None).client_secret.is_some());

        confirm(&driver, &mut session).await;
        let view = session.view(None);
        assert!(view.client_secret.is_none());
        assert_eq!(view.amounts.total, cart.total());
        assert!(view.amounts.total > Money::ZERO);
    }
}

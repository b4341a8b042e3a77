//! Webhook-driven order materialization.
//!
//! A succeeded payment intent becomes exactly one `paid` order plus one item
//! row per distinct product, rebuilt from the intent metadata. Refunds and
//! cancellations move an existing order's status. Nothing else writes orders.

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use oceane_core::{OrderId, OrderStatus};

use crate::db::{OrderStore, RepositoryError, StatusUpdate};
use crate::models::order::{NewOrder, NewOrderItem, Order};
use crate::services::mail::{Mailer, OrderConfirmation};
use crate::stripe::{Charge, MetadataError, OrderMetadata, PaymentIntent, WebhookEvent};

#[derive(Debug, Error)]
pub enum MaterializeError {
    /// The intent's metadata cannot be turned back into an order.
    #[error("Invalid order metadata: {0}")]
    Metadata(#[from] MetadataError),

    /// The order row could not be written or read; the event must be redelivered.
    #[error("Order persistence failed: {0}")]
    Persistence(#[from] RepositoryError),
}

/// What handling an event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterializeOutcome {
    Created {
        order_id: OrderId,
        items: usize,
        email_sent: bool,
    },
    /// An order already exists for the intent.
    Duplicate,
    StatusChanged {
        from: OrderStatus,
        to: OrderStatus,
    },
    /// The order's current status does not allow the transition.
    TransitionRejected {
        current: OrderStatus,
        requested: OrderStatus,
    },
    /// No order matches the intent.
    UnknownIntent,
    PaymentFailed,
    Ignored,
}

#[derive(Clone)]
pub struct OrderMaterializer {
    store: Arc<dyn OrderStore>,
    mailer: Option<Arc<dyn Mailer>>,
}

impl OrderMaterializer {
    #[must_use]
    pub fn new(store: Arc<dyn OrderStore>, mailer: Option<Arc<dyn Mailer>>) -> Self {
        Self { store, mailer }
    }

    /// Apply one verified webhook event.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata is unreadable, the order row cannot
    /// be written, or a status change cannot be looked up or stored. The
    /// webhook answers 500 for the latter two so Stripe redelivers. Item and
    /// email failures are logged only.
    #[instrument(skip_all, fields(event_type = %event.kind()))]
    pub async fn handle(&self, event: WebhookEvent) -> Result<MaterializeOutcome, MaterializeError> {
        match event {
            WebhookEvent::PaymentSucceeded(intent) => self.materialize(&intent).await,
            WebhookEvent::PaymentFailed(intent) => {
                warn!(
                    payment_intent_id = %intent.id,
                    reason = intent
                        .last_payment_error
                        .as_ref()
                        .and_then(|e| e.message.as_deref())
                        .unwrap_or("unknown"),
                    "Payment failed"
                );
                Ok(MaterializeOutcome::PaymentFailed)
            }
            WebhookEvent::PaymentCanceled(intent) => {
                self.transition(&intent.id, OrderStatus::Cancelled).await
            }
            WebhookEvent::ChargeRefunded(charge) => self.refund(&charge).await,
            WebhookEvent::Unhandled(kind) => {
                info!(event_type = %kind, "Unhandled webhook event");
                Ok(MaterializeOutcome::Ignored)
            }
        }
    }

    async fn materialize(&self, intent: &PaymentIntent) -> Result<MaterializeOutcome, MaterializeError> {
        if self.store.exists_by_payment_intent(&intent.id).await? {
            info!(payment_intent_id = %intent.id, "Order already exists");
            return Ok(MaterializeOutcome::Duplicate);
        }

        let metadata = OrderMetadata::decode(&intent.metadata)?;
        let items: Vec<NewOrderItem> = metadata.items.iter().map(NewOrderItem::from).collect();
        let new_order = NewOrder {
            user_id: metadata.user_id,
            stripe_payment_intent_id: intent.id.clone(),
            status: OrderStatus::Paid,
            subtotal: metadata.subtotal,
            shipping_cost: metadata.shipping_cost,
            total: intent.amount,
            currency: intent.currency.clone(),
            customer_email: metadata
                .customer_email
                .or_else(|| intent.receipt_email.clone()),
            customer_name: metadata.customer_name,
            shipping_address: metadata.shipping_address,
            metadata: json!({
                "stripe_payment_method": intent.payment_method_id(),
                "stripe_created": intent.created,
            }),
        };

        // A concurrent delivery may have inserted between the check and here.
        let Some(order) = self.store.insert_order(&new_order).await? else {
            info!(payment_intent_id = %intent.id, "Order created by a concurrent delivery");
            return Ok(MaterializeOutcome::Duplicate);
        };

        let inserted = match self.store.insert_items(order.id, &items).await {
            Ok(rows) => rows.len(),
            Err(e) => {
                error!(order_id = %order.id, error = %e, "Failed to insert order items");
                0
            }
        };

        info!(
            order_id = %order.id,
            payment_intent_id = %intent.id,
            items = inserted,
            total = order.total.minor(),
            "Order created"
        );

        let email_sent = self.send_confirmation(&order, &items).await;
        Ok(MaterializeOutcome::Created {
            order_id: order.id,
            items: inserted,
            email_sent,
        })
    }

    async fn send_confirmation(&self, order: &Order, items: &[NewOrderItem]) -> bool {
        let Some(mailer) = &self.mailer else {
            info!(order_id = %order.id, "Mail not configured, skipping confirmation email");
            return false;
        };
        let Some(to) = order.customer_email.as_deref() else {
            info!(order_id = %order.id, "Order has no email, skipping confirmation email");
            return false;
        };

        let confirmation = OrderConfirmation::new(
            order.id,
            order.customer_name.clone(),
            items,
            order.subtotal,
            order.shipping_cost,
            order.total,
            &order.currency,
            order.shipping_address.as_ref().map(|a| a.0.clone()),
        );
        match mailer.send_order_confirmation(to, &confirmation).await {
            Ok(()) => true,
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "Failed to send confirmation email");
                false
            }
        }
    }

    async fn refund(&self, charge: &Charge) -> Result<MaterializeOutcome, MaterializeError> {
        let Some(intent_id) = charge.payment_intent.as_deref() else {
            warn!(charge_id = %charge.id, "Refunded charge has no payment intent");
            return Ok(MaterializeOutcome::Ignored);
        };
        self.transition(intent_id, OrderStatus::Refunded).await
    }

    async fn transition(
        &self,
        payment_intent_id: &str,
        status: OrderStatus,
    ) -> Result<MaterializeOutcome, MaterializeError> {
        let outcome = match self
            .store
            .update_status_by_payment_intent(payment_intent_id, status)
            .await?
        {
            StatusUpdate::Updated { from } => {
                info!(payment_intent_id, %from, to = %status, "Order status updated");
                MaterializeOutcome::StatusChanged { from, to: status }
            }
            StatusUpdate::Rejected { current } => {
                warn!(payment_intent_id, %current, requested = %status, "Order status transition rejected");
                MaterializeOutcome::TransitionRejected {
                    current,
                    requested: status,
                }
            }
            StatusUpdate::NotFound => {
                warn!(payment_intent_id, requested = %status, "No order for payment intent");
                MaterializeOutcome::UnknownIntent
            }
        };
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{MemoryOrderStore, RecordingMailer, succeeded_intent};
    use oceane_core::Money;

    fn materializer(
        store: &Arc<MemoryOrderStore>,
        mailer: Option<&Arc<RecordingMailer>>,
    ) -> OrderMaterializer {
        OrderMaterializer::new(
            store.clone(),
            mailer.map(|m| m.clone() as Arc<dyn Mailer>),
        )
    }

    #[tokio::test]
    async fn test_succeeded_payment_creates_order_and_items() {
        let store = Arc::new(MemoryOrderStore::default());
        let mailer = Arc::new(RecordingMailer::default());
        let outcome = materializer(&store, Some(&mailer))
            .handle(WebhookEvent::PaymentSucceeded(succeeded_intent("pi_1")))
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            MaterializeOutcome::Created { items: 2, email_sent: true, .. }
        ));
        let found = store.find("pi_1").unwrap();
        assert_eq!(found.order.status, OrderStatus::Paid);
        assert_eq!(found.order.subtotal, Money::from_minor(250));
        assert_eq!(found.order.shipping_cost, Money::from_minor(800));
        assert_eq!(found.order.total, Money::from_minor(1050));
        assert_eq!(found.order.metadata.0["stripe_payment_method"], "pm_card_visa");
        assert_eq!(found.items.len(), 2);

        let sent = mailer.sent();
        let (to, confirmation) = sent.first().unwrap();
        assert_eq!(to, "hina@example.pf");
        assert_eq!(confirmation.order_number, found.order.order_number());
    }

    #[tokio::test]
    async fn test_order_items_keep_the_price_and_name_paid() {
        let store = Arc::new(MemoryOrderStore::default());
        let materializer = materializer(&store, None);
        materializer
            .handle(WebhookEvent::PaymentSucceeded(succeeded_intent("pi_1")))
            .await
            .unwrap();

        // Same product, renamed and repriced before the next sale
        let mut later = succeeded_intent("pi_2");
        let mut metadata = OrderMetadata::decode(&later.metadata).unwrap();
        let pearl = metadata
            .items
            .iter_mut()
            .find(|item| item.id.as_str() == "1")
            .unwrap();
        pearl.name = "Perle de Tahiti AAA".to_owned();
        pearl.price = Money::from_minor(140);
        metadata.subtotal = Money::from_minor(330);
        later.amount = Money::from_minor(1130);
        later.metadata = metadata.encode().unwrap();
        materializer
            .handle(WebhookEvent::PaymentSucceeded(later))
            .await
            .unwrap();

        let first = store.find("pi_1").unwrap();
        let pearl = first
            .items
            .iter()
            .find(|item| item.product_id.as_str() == "1")
            .unwrap();
        assert_eq!(pearl.product_name, "Perle de Tahiti");
        assert_eq!(pearl.product_price, Money::from_minor(100));
        assert_eq!(first.order.subtotal, Money::from_minor(250));

        let second = store.find("pi_2").unwrap();
        let pearl = second
            .items
            .iter()
            .find(|item| item.product_id.as_str() == "1")
            .unwrap();
        assert_eq!(pearl.product_name, "Perle de Tahiti AAA");
        assert_eq!(pearl.product_price, Money::from_minor(140));
    }

    #[tokio::test]
    async fn test_redelivery_is_a_no_op() {
        let store = Arc::new(MemoryOrderStore::default());
        let materializer = materializer(&store, None);
        let event = WebhookEvent::PaymentSucceeded(succeeded_intent("pi_1"));

        materializer.handle(event.clone()).await.unwrap();
        let second = materializer.handle(event).await.unwrap();

        assert_eq!(second, MaterializeOutcome::Duplicate);
        assert_eq!(store.order_count(), 1);
        assert_eq!(store.item_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_insert_is_reported_as_duplicate() {
        let store = Arc::new(MemoryOrderStore::default());
        store.hide_existing_orders();
        let materializer = materializer(&store, None);
        let event = WebhookEvent::PaymentSucceeded(succeeded_intent("pi_1"));

        materializer.handle(event.clone()).await.unwrap();
        assert_eq!(
            materializer.handle(event).await.unwrap(),
            MaterializeOutcome::Duplicate
        );
        assert_eq!(store.order_count(), 1);
    }

    #[tokio::test]
    async fn test_order_insert_failure_is_fatal() {
        let store = Arc::new(MemoryOrderStore::default());
        store.fail_order_inserts();
        let result = materializer(&store, None)
            .handle(WebhookEvent::PaymentSucceeded(succeeded_intent("pi_1")))
            .await;

        assert!(matches!(result, Err(MaterializeError::Persistence(_))));
        assert_eq!(store.order_count(), 0);
    }

    #[tokio::test]
    async fn test_item_insert_failure_keeps_order() {
        let store = Arc::new(MemoryOrderStore::default());
        store.fail_item_inserts();
        let outcome = materializer(&store, None)
            .handle(WebhookEvent::PaymentSucceeded(succeeded_intent("pi_1")))
            .await
            .unwrap();

        assert!(matches!(outcome, MaterializeOutcome::Created { items: 0, .. }));
        assert_eq!(store.order_count(), 1);
        assert_eq!(store.item_count(), 0);
    }

    #[tokio::test]
    async fn test_email_failure_does_not_fail_the_event() {
        let store = Arc::new(MemoryOrderStore::default());
        let mailer = Arc::new(RecordingMailer::failing());
        let outcome = materializer(&store, Some(&mailer))
            .handle(WebhookEvent::PaymentSucceeded(succeeded_intent("pi_1")))
            .await
            .unwrap();

        assert!(matches!(outcome, MaterializeOutcome::Created { email_sent: false, .. }));
        assert_eq!(store.order_count(), 1);
    }

    #[tokio::test]
    async fn test_receipt_email_is_used_when_metadata_has_none() {
        let store = Arc::new(MemoryOrderStore::default());
        let mut intent = succeeded_intent("pi_1");
        intent.metadata.remove("customer_email");
        intent.receipt_email = Some("receipt@example.pf".to_owned());

        materializer(&store, None)
            .handle(WebhookEvent::PaymentSucceeded(intent))
            .await
            .unwrap();
        assert_eq!(
            store.find("pi_1").unwrap().order.customer_email.as_deref(),
            Some("receipt@example.pf")
        );
    }

    #[tokio::test]
    async fn test_unreadable_metadata_is_rejected() {
        let store = Arc::new(MemoryOrderStore::default());
        let mut intent = succeeded_intent("pi_1");
        intent.metadata.insert("items".to_owned(), "[{".to_owned());

        let result = materializer(&store, None)
            .handle(WebhookEvent::PaymentSucceeded(intent))
            .await;
        assert!(matches!(result, Err(MaterializeError::Metadata(_))));
        assert_eq!(store.order_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_payment_creates_nothing() {
        let store = Arc::new(MemoryOrderStore::default());
        let outcome = materializer(&store, None)
            .handle(WebhookEvent::PaymentFailed(succeeded_intent("pi_1")))
            .await
            .unwrap();

        assert_eq!(outcome, MaterializeOutcome::PaymentFailed);
        assert_eq!(store.order_count(), 0);
    }

    #[tokio::test]
    async fn test_refund_and_cancel_transitions() {
        let store = Arc::new(MemoryOrderStore::default());
        let materializer = materializer(&store, None);
        materializer
            .handle(WebhookEvent::PaymentSucceeded(succeeded_intent("pi_1")))
            .await
            .unwrap();

        let refund = WebhookEvent::ChargeRefunded(Charge {
            id: "ch_1".to_owned(),
            payment_intent: Some("pi_1".to_owned()),
            amount_refunded: 1050,
            refunded: true,
        });
        assert_eq!(
            materializer.handle(refund).await.unwrap(),
            MaterializeOutcome::StatusChanged {
                from: OrderStatus::Paid,
                to: OrderStatus::Refunded
            }
        );

        let cancel = WebhookEvent::PaymentCanceled(succeeded_intent("pi_1"));
        assert_eq!(
            materializer.handle(cancel).await.unwrap(),
            MaterializeOutcome::TransitionRejected {
                current: OrderStatus::Refunded,
                requested: OrderStatus::Cancelled
            }
        );
    }

    #[tokio::test]
    async fn test_status_update_failure_is_propagated() {
        let store = Arc::new(MemoryOrderStore::default());
        let materializer = materializer(&store, None);
        materializer
            .handle(WebhookEvent::PaymentSucceeded(succeeded_intent("pi_1")))
            .await
            .unwrap();

        store.fail_status_updates();
        let err = materializer
            .handle(WebhookEvent::PaymentCanceled(succeeded_intent("pi_1")))
            .await
            .unwrap_err();
        assert!(matches!(err, MaterializeError::Persistence(_)));
        assert_eq!(store.find("pi_1").unwrap().order.status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_status_event_for_unknown_intent_is_acknowledged() {
        let store = Arc::new(MemoryOrderStore::default());
        let outcome = materializer(&store, None)
            .handle(WebhookEvent::PaymentCanceled(succeeded_intent("pi_missing")))
            .await
            .unwrap();
        assert_eq!(outcome, MaterializeOutcome::UnknownIntent);
    }
}

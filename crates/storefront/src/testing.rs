//! In-memory stand-ins for the async seams, shared by unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use sqlx::types::Json;

use oceane_core::cart::{Cart, CartLine};
use oceane_core::shipping::{Destination, RateEngine, RatePolicy};
use oceane_core::{CountryCode, IntentStatus, Money, OrderId, OrderItemId, OrderStatus, ProductId};

use crate::db::{OrderStore, RepositoryError, StatusUpdate};
use crate::models::order::{NewOrder, NewOrderItem, Order, OrderItem, OrderWithItems};
use crate::services::mail::{MailError, Mailer, OrderConfirmation};
use crate::stripe::{
    ConfirmPayment, CreateIntent, MetadataItem, NextAction, OrderMetadata, PaymentGateway,
    PaymentIntent, RedirectToUrl, StripeError, intent_id_from_client_secret,
};

fn unavailable() -> RepositoryError {
    RepositoryError::Database(sqlx::Error::PoolTimedOut)
}

#[derive(Default)]
struct Rows {
    orders: Vec<Order>,
    items: Vec<OrderItem>,
}

/// Order store backed by vectors. Enforces the payment intent uniqueness the
/// database constraint provides.
#[derive(Default)]
pub struct MemoryOrderStore {
    rows: Mutex<Rows>,
    hide_existing: AtomicBool,
    fail_orders: AtomicBool,
    fail_items: AtomicBool,
    fail_status: AtomicBool,
}

impl MemoryOrderStore {
    /// Make the existence check always answer `false`, as if a concurrent
    /// delivery inserted right after it.
    pub fn hide_existing_orders(&self) {
        self.hide_existing.store(true, Ordering::SeqCst);
    }

    pub fn fail_order_inserts(&self) {
        self.fail_orders.store(true, Ordering::SeqCst);
    }

    pub fn fail_item_inserts(&self) {
        self.fail_items.store(true, Ordering::SeqCst);
    }

    pub fn fail_status_updates(&self) {
        self.fail_status.store(true, Ordering::SeqCst);
    }

    pub fn order_count(&self) -> usize {
        self.rows.lock().unwrap().orders.len()
    }

    pub fn item_count(&self) -> usize {
        self.rows.lock().unwrap().items.len()
    }

    pub fn find(&self, payment_intent_id: &str) -> Option<OrderWithItems> {
        let rows = self.rows.lock().unwrap();
        let order = rows
            .orders
            .iter()
            .find(|o| o.stripe_payment_intent_id == payment_intent_id)?
            .clone();
        let items = rows
            .items
            .iter()
            .filter(|i| i.order_id == order.id)
            .cloned()
            .collect();
        Some(OrderWithItems { order, items })
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn exists_by_payment_intent(&self, payment_intent_id: &str) -> Result<bool, RepositoryError> {
        if self.hide_existing.load(Ordering::SeqCst) {
            return Ok(false);
        }
        Ok(self.find(payment_intent_id).is_some())
    }

    async fn insert_order(&self, order: &NewOrder) -> Result<Option<Order>, RepositoryError> {
        if self.fail_orders.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut rows = self.rows.lock().unwrap();
        if rows
            .orders
            .iter()
            .any(|o| o.stripe_payment_intent_id == order.stripe_payment_intent_id)
        {
            return Ok(None);
        }
        let now = Utc::now();
        let row = Order {
            id: OrderId::new(uuid::Uuid::new_v4()),
            user_id: order.user_id.clone(),
            stripe_payment_intent_id: order.stripe_payment_intent_id.clone(),
            status: order.status,
            subtotal: order.subtotal,
            shipping_cost: order.shipping_cost,
            total: order.total,
            currency: order.currency.clone(),
            customer_email: order.customer_email.clone(),
            customer_name: order.customer_name.clone(),
            shipping_address: order.shipping_address.clone().map(Json),
            metadata: Json(order.metadata.clone()),
            created_at: now,
            updated_at: now,
        };
        rows.orders.push(row.clone());
        Ok(Some(row))
    }

    async fn insert_items(
        &self,
        order_id: OrderId,
        items: &[NewOrderItem],
    ) -> Result<Vec<OrderItem>, RepositoryError> {
        if self.fail_items.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let rows: Vec<OrderItem> = items
            .iter()
            .map(|item| OrderItem {
                id: OrderItemId::new(uuid::Uuid::new_v4()),
                order_id,
                product_id: item.product_id.clone(),
                product_name: item.product_name.clone(),
                product_price: item.product_price,
                quantity: item.quantity,
                created_at: Utc::now(),
            })
            .collect();
        self.rows.lock().unwrap().items.extend(rows.iter().cloned());
        Ok(rows)
    }

    async fn update_status_by_payment_intent(
        &self,
        payment_intent_id: &str,
        status: OrderStatus,
    ) -> Result<StatusUpdate, RepositoryError> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut rows = self.rows.lock().unwrap();
        let Some(order) = rows
            .orders
            .iter_mut()
            .find(|o| o.stripe_payment_intent_id == payment_intent_id)
        else {
            return Ok(StatusUpdate::NotFound);
        };
        if !order.status.can_transition_to(status) {
            return Ok(StatusUpdate::Rejected {
                current: order.status,
            });
        }
        let from = order.status;
        order.status = status;
        order.updated_at = Utc::now();
        Ok(StatusUpdate::Updated { from })
    }

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<OrderWithItems>, RepositoryError> {
        Ok(self.find(payment_intent_id))
    }
}

/// Payment gateway that answers locally and records intent creations.
///
/// It remembers the status the processor holds for the intents it issued,
/// so a later read answers with whatever the last confirmation (or
/// [`FakeGateway::settle`]) left behind.
pub struct FakeGateway {
    created: Mutex<Vec<CreateIntent>>,
    counter: AtomicU32,
    failure: Option<String>,
    confirm_status: IntentStatus,
    confirm_error: Option<String>,
    hang_confirm: bool,
    remote_status: Mutex<IntentStatus>,
    fail_retrieve: AtomicBool,
    confirms: AtomicU32,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            created: Mutex::new(Vec::new()),
            counter: AtomicU32::new(0),
            failure: None,
            confirm_status: IntentStatus::Succeeded,
            confirm_error: None,
            hang_confirm: false,
            remote_status: Mutex::new(IntentStatus::RequiresPaymentMethod),
            fail_retrieve: AtomicBool::new(false),
            confirms: AtomicU32::new(0),
        }
    }
}

impl FakeGateway {
    /// Every intent creation fails with a processor error carrying `message`.
    pub fn failing_with(message: &str) -> Self {
        Self {
            failure: Some(message.to_owned()),
            ..Self::default()
        }
    }

    /// Confirmations answer with `status`.
    pub fn confirming_with(status: IntentStatus) -> Self {
        Self {
            confirm_status: status,
            ..Self::default()
        }
    }

    /// Confirmations are rejected by the processor with `message`, leaving
    /// the remote status untouched.
    pub fn rejecting_confirm_with(message: &str) -> Self {
        Self {
            confirm_error: Some(message.to_owned()),
            ..Self::default()
        }
    }

    /// Confirmations never answer.
    pub fn hanging_confirm() -> Self {
        Self {
            hang_confirm: true,
            ..Self::default()
        }
    }

    /// Move the remote intent to `status`, as the processor does after an
    /// out-of-band step completes.
    pub fn settle(&self, status: IntentStatus) {
        *self.remote_status.lock().unwrap() = status;
    }

    pub fn fail_retrieves(&self) {
        self.fail_retrieve.store(true, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<CreateIntent> {
        self.created.lock().unwrap().clone()
    }

    pub fn confirm_count(&self) -> u32 {
        self.confirms.load(Ordering::SeqCst)
    }

    fn intent(id: &str, amount: Money, status: IntentStatus) -> PaymentIntent {
        PaymentIntent {
            id: id.to_owned(),
            amount,
            currency: "xpf".to_owned(),
            status,
            client_secret: Some(format!("{id}_secret_test")),
            metadata: std::collections::BTreeMap::new(),
            receipt_email: None,
            payment_method: None,
            created: Utc::now().timestamp(),
            last_payment_error: None,
            next_action: None,
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(&self, params: &CreateIntent) -> Result<PaymentIntent, StripeError> {
        if let Some(message) = &self.failure {
            return Err(StripeError::Api {
                status: 401,
                code: None,
                message: message.clone(),
            });
        }
        self.created.lock().unwrap().push(params.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Self::intent(
            &format!("pi_test{n}"),
            params.amount,
            IntentStatus::RequiresPaymentMethod,
        ))
    }

    async fn confirm_payment(
        &self,
        client_secret: &str,
        _params: &ConfirmPayment,
    ) -> Result<PaymentIntent, StripeError> {
        let id = intent_id_from_client_secret(client_secret)?;
        self.confirms.fetch_add(1, Ordering::SeqCst);
        if self.hang_confirm {
            std::future::pending::<()>().await;
        }
        if let Some(message) = &self.confirm_error {
            return Err(StripeError::Api {
                status: 400,
                code: Some("payment_intent_unexpected_state".to_owned()),
                message: message.clone(),
            });
        }
        *self.remote_status.lock().unwrap() = self.confirm_status;
        let mut intent = Self::intent(id, Money::ZERO, self.confirm_status);
        if self.confirm_status == IntentStatus::RequiresAction {
            intent.next_action = Some(NextAction {
                kind: "redirect_to_url".to_owned(),
                redirect_to_url: Some(RedirectToUrl {
                    url: "https://hooks.stripe.com/redirect/authenticate".to_owned(),
                }),
            });
        }
        Ok(intent)
    }

    async fn retrieve_intent(&self, client_secret: &str) -> Result<PaymentIntent, StripeError> {
        let id = intent_id_from_client_secret(client_secret)?;
        if self.fail_retrieve.load(Ordering::SeqCst) {
            return Err(StripeError::Request("connection reset".to_owned()));
        }
        let status = *self.remote_status.lock().unwrap();
        Ok(Self::intent(id, Money::ZERO, status))
    }
}

/// Mailer that keeps what it was asked to send.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, OrderConfirmation)>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, OrderConfirmation)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_order_confirmation(&self, to: &str, order: &OrderConfirmation) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::Api {
                status: 422,
                message: "domain not verified".to_owned(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_owned(), order.clone()));
        Ok(())
    }
}

/// A succeeded intent for two pearls at 100 and a pendant at 50, shipped for 800.
pub fn succeeded_intent(id: &str) -> PaymentIntent {
    let metadata = OrderMetadata {
        items: vec![
            MetadataItem {
                id: ProductId::new("1"),
                name: "Perle de Tahiti".to_owned(),
                price: Money::from_minor(100),
                quantity: 2,
            },
            MetadataItem {
                id: ProductId::new("2"),
                name: "Pendentif".to_owned(),
                price: Money::from_minor(50),
                quantity: 1,
            },
        ],
        subtotal: Money::from_minor(250),
        shipping_cost: Money::from_minor(800),
        customer_email: Some("hina@example.pf".to_owned()),
        customer_name: Some("Hina Teriitahi".to_owned()),
        user_id: None,
        shipping_address: None,
    };

    PaymentIntent {
        id: id.to_owned(),
        amount: Money::from_minor(1050),
        currency: "xpf".to_owned(),
        status: IntentStatus::Succeeded,
        client_secret: None,
        metadata: metadata.encode().unwrap(),
        receipt_email: None,
        payment_method: Some(json!("pm_card_visa")),
        created: 1_700_000_000,
        last_payment_error: None,
        next_action: None,
    }
}

/// A two-line cart shipping to Paris with the cheapest carrier selected.
pub fn ready_cart(policy: RatePolicy) -> (Cart, RateEngine) {
    let engine = RateEngine::with_default_carriers(policy, None);
    let mut cart = Cart::new();
    for (id, name, price) in [("1", "Perle de Tahiti", 12_000), ("2", "Pendentif", 8_500)] {
        cart.add(
            CartLine {
                product_id: ProductId::new(id),
                name: name.to_owned(),
                unit_price: Money::from_minor(price),
                category: None,
            },
            &engine,
        )
        .unwrap();
    }
    cart.set_destination(
        Destination::new(CountryCode::parse("FR").unwrap(), Some("Paris".to_owned())),
        &engine,
    );
    let carrier = cart
        .shipping_options(&engine)
        .unwrap()
        .cheapest()
        .unwrap()
        .carrier_id
        .clone();
    cart.select_shipping(Some(&carrier), &engine).unwrap();
    (cart, engine)
}

//! Order records written by the Stripe webhook.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

use oceane_core::{Money, OrderId, OrderItemId, OrderStatus, ProductId};

/// Delivery address captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub address: String,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    pub country: String,
}

/// A persisted order.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: Option<String>,
    pub stripe_payment_intent_id: String,
    pub status: OrderStatus,
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub total: Money,
    pub currency: String,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub shipping_address: Option<Json<ShippingAddress>>,
    pub metadata: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Customer-facing order number.
    #[must_use]
    pub fn order_number(&self) -> String {
        self.id.order_number()
    }
}

/// One distinct product of an order, snapshotted at payment time.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_price: Money,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

/// An order with its line items.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Fields of an order about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: Option<String>,
    pub stripe_payment_intent_id: String,
    pub status: OrderStatus,
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub total: Money,
    pub currency: String,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
    pub metadata: serde_json::Value,
}

/// Fields of an order item about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub product_price: Money,
    pub quantity: i32,
}

impl NewOrderItem {
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.product_price * u32::try_from(self.quantity).unwrap_or(0)
    }
}

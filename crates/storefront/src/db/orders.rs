//! Order repository.
//!
//! The `orders.stripe_payment_intent_id` column is UNIQUE; inserts use
//! `ON CONFLICT DO NOTHING` so concurrent deliveries of the same webhook event
//! create at most one order.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;

use oceane_core::{OrderId, OrderStatus};

use super::RepositoryError;
use crate::models::order::{NewOrder, NewOrderItem, Order, OrderItem, OrderWithItems};

const ORDER_COLUMNS: &str = "id, user_id, stripe_payment_intent_id, status, subtotal, \
     shipping_cost, total, currency, customer_email, customer_name, shipping_address, \
     metadata, created_at, updated_at";

const ORDER_ITEM_COLUMNS: &str =
    "id, order_id, product_id, product_name, product_price, quantity, created_at";

/// Outcome of a status transition keyed by payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    Updated { from: OrderStatus },
    /// The order's current status does not allow the transition.
    Rejected { current: OrderStatus },
    NotFound,
}

/// Persistence boundary for orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Whether an order already exists for the payment intent.
    async fn exists_by_payment_intent(&self, payment_intent_id: &str)
    -> Result<bool, RepositoryError>;

    /// Insert an order. Returns `None` if one already exists for the same
    /// payment intent.
    async fn insert_order(&self, order: &NewOrder) -> Result<Option<Order>, RepositoryError>;

    /// Insert the items of an order.
    async fn insert_items(
        &self,
        order_id: OrderId,
        items: &[NewOrderItem],
    ) -> Result<Vec<OrderItem>, RepositoryError>;

    /// Move the order of a payment intent to `status` if its current status allows it.
    async fn update_status_by_payment_intent(
        &self,
        payment_intent_id: &str,
        status: OrderStatus,
    ) -> Result<StatusUpdate, RepositoryError>;

    /// Get an order and its items by payment intent.
    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<OrderWithItems>, RepositoryError>;
}

/// `PostgreSQL` implementation of [`OrderStore`].
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn exists_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<bool, RepositoryError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM storefront.orders WHERE stripe_payment_intent_id = $1)",
        )
        .bind(payment_intent_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn insert_order(&self, order: &NewOrder) -> Result<Option<Order>, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO storefront.orders (
                user_id, stripe_payment_intent_id, status, subtotal, shipping_cost, total,
                currency, customer_email, customer_name, shipping_address, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (stripe_payment_intent_id) DO NOTHING
            RETURNING {ORDER_COLUMNS}
            "
        );

        sqlx::query_as::<_, Order>(&sql)
            .bind(&order.user_id)
            .bind(&order.stripe_payment_intent_id)
            .bind(order.status)
            .bind(order.subtotal)
            .bind(order.shipping_cost)
            .bind(order.total)
            .bind(&order.currency)
            .bind(&order.customer_email)
            .bind(&order.customer_name)
            .bind(order.shipping_address.as_ref().map(Json))
            .bind(Json(&order.metadata))
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from_insert)
    }

    async fn insert_items(
        &self,
        order_id: OrderId,
        items: &[NewOrderItem],
    ) -> Result<Vec<OrderItem>, RepositoryError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let product_ids: Vec<&str> = items.iter().map(|i| i.product_id.as_str()).collect();
        let names: Vec<&str> = items.iter().map(|i| i.product_name.as_str()).collect();
        let prices: Vec<i64> = items.iter().map(|i| i.product_price.minor()).collect();
        let quantities: Vec<i32> = items.iter().map(|i| i.quantity).collect();

        let sql = format!(
            r"
            INSERT INTO storefront.order_items
                (order_id, product_id, product_name, product_price, quantity)
            SELECT $1, product_id, product_name, product_price, quantity
            FROM UNNEST($2::text[], $3::text[], $4::bigint[], $5::int[])
                AS t(product_id, product_name, product_price, quantity)
            RETURNING {ORDER_ITEM_COLUMNS}
            "
        );

        let rows = sqlx::query_as::<_, OrderItem>(&sql)
            .bind(order_id)
            .bind(&product_ids)
            .bind(&names)
            .bind(&prices)
            .bind(&quantities)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn update_status_by_payment_intent(
        &self,
        payment_intent_id: &str,
        status: OrderStatus,
    ) -> Result<StatusUpdate, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<OrderStatus> = sqlx::query_scalar(
            "SELECT status FROM storefront.orders WHERE stripe_payment_intent_id = $1 FOR UPDATE",
        )
        .bind(payment_intent_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            return Ok(StatusUpdate::NotFound);
        };
        if !current.can_transition_to(status) {
            return Ok(StatusUpdate::Rejected { current });
        }

        sqlx::query(
            r"
            UPDATE storefront.orders
            SET status = $2, updated_at = NOW()
            WHERE stripe_payment_intent_id = $1
            ",
        )
        .bind(payment_intent_id)
        .bind(status)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(StatusUpdate::Updated { from: current })
    }

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<OrderWithItems>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.orders WHERE stripe_payment_intent_id = $1"
        );
        let Some(order) = sqlx::query_as::<_, Order>(&sql)
            .bind(payment_intent_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let sql = format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM storefront.order_items \
             WHERE order_id = $1 ORDER BY created_at, id"
        );
        let items = sqlx::query_as::<_, OrderItem>(&sql)
            .bind(order.id)
            .fetch_all(&self.pool)
            .await?;

        Ok(Some(OrderWithItems { order, items }))
    }
}

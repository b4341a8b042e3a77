//! Payment intent creation.
//!
//! Validates a checkout request, folds repeated cart lines into one entry per
//! product, packs the order payload into intent metadata and asks the payment
//! gateway for an intent. Nothing is written locally; the order only exists
//! once the processor reports the payment as succeeded.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument};

use oceane_core::cart::CartLine;
use oceane_core::{CurrencyCode, Email, EmailError, Money, ProductId};

use crate::models::order::ShippingAddress;
use crate::stripe::{
    CreateIntent, MetadataError, MetadataItem, OrderMetadata, PaymentGateway, StripeError,
};

#[derive(Debug, Error)]
pub enum PaymentIntentError {
    #[error("Invalid amount")]
    InvalidAmount,

    #[error("Cart items are required")]
    EmptyCart,

    #[error("Invalid item structure: each item must have id, name, and price")]
    InvalidItem,

    #[error("Invalid shipping cost")]
    InvalidShippingCost,

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Order payload cannot be attached: {0}")]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Stripe(#[from] StripeError),
}

/// A cart line as posted by the client. Fields are optional so a malformed
/// line is reported as such instead of failing body deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestItem {
    #[serde(default)]
    pub id: Option<ProductId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub category: Option<String>,
}

impl From<&CartLine> for RequestItem {
    fn from(line: &CartLine) -> Self {
        Self {
            id: Some(line.product_id.clone()),
            name: Some(line.name.clone()),
            price: Some(Value::from(line.unit_price.minor())),
            category: line.category.clone(),
        }
    }
}

/// `POST /create-payment-intent` body. Amounts are minor units.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentRequest {
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub items: Vec<RequestItem>,
    #[serde(default)]
    pub shipping_cost: Option<i64>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub shipping_address: Option<ShippingAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentCreated {
    pub client_secret: String,
    pub payment_intent_id: String,
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedIntent {
    pub amount: Money,
    pub currency: CurrencyCode,
    pub metadata: OrderMetadata,
    pub receipt_email: Option<Email>,
}

/// A cart line with every required field present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
}

impl PaymentIntentRequest {
    /// Check the request and build the metadata payload.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a non-positive amount, an empty or
    /// malformed item list, a shipping cost outside `0..amount`, an
    /// unparseable email or an unsupported currency.
    pub fn validate(self, default_currency: CurrencyCode) -> Result<ValidatedIntent, PaymentIntentError> {
        let amount = self
            .amount
            .filter(|a| *a > 0)
            .map(Money::from_minor)
            .ok_or(PaymentIntentError::InvalidAmount)?;

        if self.items.is_empty() {
            return Err(PaymentIntentError::EmptyCart);
        }
        let lines = self
            .items
            .iter()
            .map(priced_line)
            .collect::<Option<Vec<_>>>()
            .ok_or(PaymentIntentError::InvalidItem)?;

        let shipping_cost = Money::from_minor(self.shipping_cost.unwrap_or(0));
        if shipping_cost.is_negative() || shipping_cost >= amount {
            return Err(PaymentIntentError::InvalidShippingCost);
        }

        let currency = match self.currency.as_deref().map(str::trim) {
            None | Some("") => default_currency,
            Some(code) => code
                .parse()
                .map_err(|_| PaymentIntentError::UnsupportedCurrency(code.to_owned()))?,
        };

        let receipt_email = Email::parse_optional(self.customer_email.as_deref())?;

        let metadata = OrderMetadata {
            items: aggregate_items(&lines),
            subtotal: amount - shipping_cost,
            shipping_cost,
            customer_email: receipt_email.as_ref().map(|e| e.as_str().to_owned()),
            customer_name: self.customer_name.filter(|n| !n.trim().is_empty()),
            user_id: self.user_id.filter(|u| !u.trim().is_empty()),
            shipping_address: self.shipping_address,
        };

        Ok(ValidatedIntent {
            amount,
            currency,
            metadata,
            receipt_email,
        })
    }
}

fn priced_line(item: &RequestItem) -> Option<PricedLine> {
    let id = item.id.clone().filter(|id| !id.is_blank())?;
    let name = item.name.clone().filter(|n| !n.trim().is_empty())?;
    let price = item.price.as_ref()?.as_i64().filter(|p| *p >= 0)?;
    Some(PricedLine {
        id,
        name,
        price: Money::from_minor(price),
    })
}

/// Fold repeated lines into one entry per product id, in first-seen order.
/// Name and unit price come from the first line of each product.
#[must_use]
pub fn aggregate_items(lines: &[PricedLine]) -> Vec<MetadataItem> {
    let mut items: Vec<MetadataItem> = Vec::new();
    for line in lines {
        match items.iter_mut().find(|item| item.id == line.id) {
            Some(item) => item.quantity += 1,
            None => items.push(MetadataItem {
                id: line.id.clone(),
                name: line.name.clone(),
                price: line.price,
                quantity: 1,
            }),
        }
    }
    items
}

/// Validate `request` and create the processor-side intent.
///
/// # Errors
///
/// Returns a validation error before any processor call, or the gateway's
/// error unchanged.
#[instrument(skip_all)]
pub async fn create_payment_intent(
    gateway: &dyn PaymentGateway,
    request: PaymentIntentRequest,
    default_currency: CurrencyCode,
) -> Result<PaymentIntentCreated, PaymentIntentError> {
    let intent = request.validate(default_currency)?;
    let params = CreateIntent {
        amount: intent.amount,
        currency: intent.currency,
        metadata: intent.metadata.encode()?,
        receipt_email: intent.receipt_email.map(Email::into_inner),
    };

    let created = gateway.create_intent(&params).await?;
    let client_secret = created
        .client_secret
        .ok_or_else(|| StripeError::Response("payment intent has no client_secret".to_owned()))?;

    info!(
        payment_intent_id = %created.id,
        amount = params.amount.minor(),
        currency = %params.currency,
        items = intent.metadata.items.len(),
        "Payment intent created"
    );

    Ok(PaymentIntentCreated {
        client_secret,
        payment_intent_id: created.id,
    })
}

//! Order confirmation emails.
//!
//! Rendered with Askama (HTML + plain text) and delivered through the Resend
//! HTTP API. Delivery is best-effort: callers log failures and move on.

use askama::Template;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use oceane_core::{CurrencyCode, Money, OrderId};

use crate::config::MailConfig;
use crate::models::order::{NewOrderItem, ShippingAddress};

/// Resend API endpoint.
const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Shown instead of an amount when shipping is free.
pub const FREE_SHIPPING_LABEL: &str = "Gratuite";

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum MailError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Resend rejected the message.
    #[error("Resend API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// One line of the confirmation email, amounts already formatted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationLine {
    pub name: String,
    pub quantity: i32,
    pub unit_price: String,
    pub line_total: String,
}

/// Everything shown in an order confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderConfirmation {
    pub order_number: String,
    pub customer_name: Option<String>,
    pub lines: Vec<ConfirmationLine>,
    pub subtotal: String,
    pub shipping: String,
    pub total: String,
    pub shipping_address: Option<ShippingAddress>,
}

impl OrderConfirmation {
    /// Build the email model for a freshly created order.
    #[must_use]
    pub fn new(
        order_id: OrderId,
        customer_name: Option<String>,
        items: &[NewOrderItem],
        subtotal: Money,
        shipping_cost: Money,
        total: Money,
        currency: &str,
        shipping_address: Option<ShippingAddress>,
    ) -> Self {
        let fmt = |amount: Money| format_amount(amount, currency);
        Self {
            order_number: order_id.order_number(),
            customer_name,
            lines: items
                .iter()
                .map(|item| ConfirmationLine {
                    name: item.product_name.clone(),
                    quantity: item.quantity,
                    unit_price: fmt(item.product_price),
                    line_total: fmt(item.line_total()),
                })
                .collect(),
            subtotal: fmt(subtotal),
            shipping: if shipping_cost.is_zero() {
                FREE_SHIPPING_LABEL.to_owned()
            } else {
                fmt(shipping_cost)
            },
            total: fmt(total),
            shipping_address,
        }
    }

    #[must_use]
    pub fn subject(&self) -> String {
        format!("Confirmation de commande #{}", self.order_number)
    }
}

/// Format minor units in `currency`, e.g. `"125.00 EUR"` or `"15500 XPF"`.
#[must_use]
pub fn format_amount(amount: Money, currency: &str) -> String {
    currency.parse::<CurrencyCode>().map_or_else(
        |_| format!("{amount} {}", currency.to_uppercase()),
        |code| amount.display(code),
    )
}

#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    order: &'a OrderConfirmation,
    year: i32,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    order: &'a OrderConfirmation,
}

/// Render the HTML and plain-text bodies.
///
/// # Errors
///
/// Returns error if a template fails to render.
pub fn render_confirmation(order: &OrderConfirmation) -> Result<(String, String), MailError> {
    use chrono::Datelike;

    let html = OrderConfirmationHtml {
        order,
        year: chrono::Utc::now().year(),
    }
    .render()?;
    let text = OrderConfirmationText { order }.render()?;
    Ok((html, text))
}

/// Mail dispatch boundary.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_order_confirmation(
        &self,
        to: &str,
        order: &OrderConfirmation,
    ) -> Result<(), MailError>;
}

#[derive(Serialize)]
struct ResendEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

/// Resend API client.
#[derive(Clone)]
pub struct ResendMailer {
    client: reqwest::Client,
    api_key: SecretString,
    from_address: String,
}

impl ResendMailer {
    /// Create a mailer if an API key is configured.
    #[must_use]
    pub fn from_config(config: &MailConfig) -> Option<Self> {
        config.resend_api_key.as_ref().map(|key| Self {
            client: reqwest::Client::new(),
            api_key: key.clone(),
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    #[instrument(skip(self, order), fields(order_number = %order.order_number))]
    async fn send_order_confirmation(
        &self,
        to: &str,
        order: &OrderConfirmation,
    ) -> Result<(), MailError> {
        let (html, text) = render_confirmation(order)?;
        let subject = order.subject();

        let response = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(self.api_key.expose_secret())
            .json(&ResendEmail {
                from: &self.from_address,
                to: [to],
                subject: &subject,
                html: &html,
                text: &text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MailError::Api {
                status: status.as_u16(),
                message,
            });
        }

        info!("Confirmation email sent");
        Ok(())
    }
}

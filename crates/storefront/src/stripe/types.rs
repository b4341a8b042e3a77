//! Stripe API object types.
//!
//! Only the fields the storefront reads are modelled; Stripe sends many more.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use oceane_core::{CurrencyCode, IntentStatus, Money};

/// A Stripe `PaymentIntent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: Money,
    pub currency: String,
    pub status: IntentStatus,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub receipt_email: Option<String>,
    /// Id of the attached payment method, or the expanded object.
    #[serde(default)]
    pub payment_method: Option<serde_json::Value>,
    pub created: i64,
    #[serde(default)]
    pub last_payment_error: Option<LastPaymentError>,
    #[serde(default)]
    pub next_action: Option<NextAction>,
}

impl PaymentIntent {
    /// Redirect URL of an out-of-band step, if Stripe requires one.
    #[must_use]
    pub fn redirect_url(&self) -> Option<&str> {
        self.next_action
            .as_ref()
            .and_then(|a| a.redirect_to_url.as_ref())
            .map(|r| r.url.as_str())
    }

    /// Id of the payment method, whether or not it was expanded.
    #[must_use]
    pub fn payment_method_id(&self) -> Option<&str> {
        match self.payment_method.as_ref()? {
            serde_json::Value::String(id) => Some(id),
            serde_json::Value::Object(obj) => obj.get("id").and_then(serde_json::Value::as_str),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastPaymentError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub redirect_to_url: Option<RedirectToUrl>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectToUrl {
    pub url: String,
}

/// A Stripe `Charge`, as delivered with `charge.refunded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount_refunded: i64,
    #[serde(default)]
    pub refunded: bool,
}

/// A webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub livemode: bool,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// The webhook events the storefront acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    PaymentSucceeded(PaymentIntent),
    PaymentFailed(PaymentIntent),
    PaymentCanceled(PaymentIntent),
    ChargeRefunded(Charge),
    /// Any other event type; acknowledged without processing.
    Unhandled(String),
}

impl WebhookEvent {
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::PaymentSucceeded(_) => "payment_intent.succeeded",
            Self::PaymentFailed(_) => "payment_intent.payment_failed",
            Self::PaymentCanceled(_) => "payment_intent.canceled",
            Self::ChargeRefunded(_) => "charge.refunded",
            Self::Unhandled(kind) => kind,
        }
    }
}

impl TryFrom<Event> for WebhookEvent {
    type Error = serde_json::Error;

    fn try_from(event: Event) -> Result<Self, Self::Error> {
        let object = event.data.object;
        Ok(match event.kind.as_str() {
            "payment_intent.succeeded" => Self::PaymentSucceeded(serde_json::from_value(object)?),
            "payment_intent.payment_failed" => Self::PaymentFailed(serde_json::from_value(object)?),
            "payment_intent.canceled" => Self::PaymentCanceled(serde_json::from_value(object)?),
            "charge.refunded" => Self::ChargeRefunded(serde_json::from_value(object)?),
            _ => Self::Unhandled(event.kind),
        })
    }
}

/// Parameters of `POST /v1/payment_intents`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIntent {
    pub amount: Money,
    pub currency: CurrencyCode,
    pub metadata: BTreeMap<String, String>,
    pub receipt_email: Option<String>,
}

impl CreateIntent {
    /// Form-encoded body, with automatic payment method selection enabled.
    #[must_use]
    pub fn form_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("amount".to_owned(), self.amount.minor().to_string()),
            ("currency".to_owned(), self.currency.as_str().to_owned()),
            (
                "automatic_payment_methods[enabled]".to_owned(),
                "true".to_owned(),
            ),
        ];
        pairs.extend(
            self.metadata
                .iter()
                .map(|(k, v)| (format!("metadata[{k}]"), v.clone())),
        );
        if let Some(email) = &self.receipt_email {
            pairs.push(("receipt_email".to_owned(), email.clone()));
        }
        pairs
    }
}

/// Parameters of `POST /v1/payment_intents/{id}/confirm`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPayment {
    /// A payment method id created by the payment form, e.g. `pm_...`.
    pub payment_method: String,
    /// Where Stripe sends the customer back after an out-of-band step.
    #[serde(default)]
    pub return_url: Option<String>,
}

/// Error envelope returned by the Stripe API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

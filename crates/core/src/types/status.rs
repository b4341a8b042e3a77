//! Status enums for orders and payment intents.

use serde::{Deserialize, Serialize};

/// Lifecycle status of an order.
///
/// Orders are only ever created as [`OrderStatus::Paid`] by the webhook
/// handler; later processor events move them to `Refunded` or `Cancelled`.
/// `Shipped` and `Delivered` are set by fulfilment tooling outside this core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Statuses an order may be in when a refund event arrives.
    pub const REFUNDABLE: [Self; 3] = [Self::Paid, Self::Shipped, Self::Delivered];

    /// Statuses an order may be in when a cancellation event arrives.
    pub const CANCELLABLE: [Self; 2] = [Self::Pending, Self::Paid];

    /// Whether a transition from `self` to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match next {
            Self::Refunded => Self::REFUNDABLE.contains(&self),
            Self::Cancelled => Self::CANCELLABLE.contains(&self),
            Self::Paid => self == Self::Pending,
            Self::Shipped => self == Self::Paid,
            Self::Delivered => self == Self::Shipped,
            Self::Pending => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Paid => write!(f, "paid"),
            Self::Shipped => write!(f, "shipped"),
            Self::Delivered => write!(f, "delivered"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Refunded => write!(f, "refunded"),
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

/// Status of a payment intent as reported by the payment processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

impl IntentStatus {
    /// The processor needs an out-of-band step (3-D Secure, bank redirect).
    #[must_use]
    pub const fn needs_customer_action(self) -> bool {
        matches!(self, Self::RequiresAction)
    }

    /// The processor accepted the payment but has not settled it yet.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Processing | Self::RequiresCapture)
    }
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::Processing => "processing",
            Self::RequiresCapture => "requires_capture",
            Self::Canceled => "canceled",
            Self::Succeeded => "succeeded",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

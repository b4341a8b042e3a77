//! Payment confirmation state machine.
//!
//! ```text
//! Initializing ──IntentCreated──▶ AwaitingConfirmation ──Confirmed(succeeded)──▶ Succeeded ──Close──▶ Closed
//!      │                              │      ▲    ▲
//!  IntentFailed             ConfirmationFailed │    └── Refreshed (status read back)
//!      ▼                              ▼      │
//!    Failed ◀─────────────────────────┘   requires_action / processing (stays)
//!      │
//!    Retry ──▶ Initializing (fresh intent)
//! ```
//!
//! The machine is pure: the storefront's checkout driver performs the
//! network calls and feeds their outcomes back in as [`PaymentEvent`]s.
//!
//! A confirmation that never reports back (dropped request, restart) leaves
//! the flow submitting. Once [`CONFIRMATION_TIMEOUT_SECS`] have passed the
//! flow counts as stalled and accepts a [`PaymentEvent::Refreshed`] status
//! read from the processor.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::IntentStatus;

/// Delay between a successful payment and closing the checkout, in milliseconds.
pub const SUCCESS_CLOSE_DELAY_MS: i64 = 2_000;

/// Seconds after which an unanswered confirmation may be resolved by
/// reading the intent back.
pub const CONFIRMATION_TIMEOUT_SECS: i64 = 90;

/// Message shown when the processor reports a non-success status.
pub const PAYMENT_NOT_COMPLETED: &str = "Payment was not completed. Please try again.";

/// How a closed checkout ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PaymentState {
    Initializing,
    AwaitingConfirmation {
        client_secret: String,
        payment_intent_id: String,
        /// A confirmation request is in flight.
        submitting: bool,
    },
    Succeeded {
        payment_intent_id: String,
        at: DateTime<Utc>,
    },
    Failed {
        message: String,
    },
    Closed {
        outcome: CheckoutOutcome,
    },
}

impl PaymentState {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::AwaitingConfirmation { .. } => "awaiting_confirmation",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
            Self::Closed { .. } => "closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    IntentCreated {
        client_secret: String,
        payment_intent_id: String,
    },
    IntentFailed {
        message: String,
    },
    /// The customer submitted the payment form.
    ConfirmationSubmitted { at: DateTime<Utc> },
    /// The processor answered the confirmation with a status.
    Confirmed {
        status: IntentStatus,
        at: DateTime<Utc>,
    },
    /// The intent's status as read back from the processor, outside a
    /// confirmation round trip.
    Refreshed {
        status: IntentStatus,
        at: DateTime<Utc>,
    },
    ConfirmationFailed {
        message: String,
    },
    Retry,
    Cancel,
    Close,
}

impl PaymentEvent {
    const fn name(&self) -> &'static str {
        match self {
            Self::IntentCreated { .. } => "intent_created",
            Self::IntentFailed { .. } => "intent_failed",
            Self::ConfirmationSubmitted { .. } => "confirmation_submitted",
            Self::Confirmed { .. } => "confirmed",
            Self::Refreshed { .. } => "refreshed",
            Self::ConfirmationFailed { .. } => "confirmation_failed",
            Self::Retry => "retry",
            Self::Cancel => "cancel",
            Self::Close => "close",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowError {
    #[error("cannot apply {event} while {state}")]
    InvalidTransition {
        state: &'static str,
        event: &'static str,
    },
}

/// What the caller should do after an event was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEffect {
    None,
    /// Create a new payment intent.
    CreateIntent,
    /// The processor needs an out-of-band step; keep waiting.
    AwaitCustomerAction,
    /// The processor is still working on the payment; read it back later.
    AwaitProcessor,
    /// Payment went through: clear the cart.
    ClearCart,
}

/// One checkout attempt sequence for a single cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFlow {
    state: PaymentState,
    attempts: u32,
    current_intent: Option<String>,
    /// Intents left behind by retries. They are never confirmed again.
    abandoned_intents: Vec<String>,
    /// When the pending confirmation was submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    submitted_at: Option<DateTime<Utc>>,
}

impl Default for PaymentFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentFlow {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: PaymentState::Initializing,
            attempts: 1,
            current_intent: None,
            abandoned_intents: Vec::new(),
            submitted_at: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> &PaymentState {
        &self.state
    }

    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn abandoned_intents(&self) -> &[String] {
        &self.abandoned_intents
    }

    /// Client secret to present to the payment form, when awaiting it.
    #[must_use]
    pub fn client_secret(&self) -> Option<&str> {
        match &self.state {
            PaymentState::AwaitingConfirmation { client_secret, .. } => Some(client_secret),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        matches!(
            self.state,
            PaymentState::AwaitingConfirmation {
                submitting: true,
                ..
            }
        )
    }

    /// In flight for longer than [`CONFIRMATION_TIMEOUT_SECS`] as of `now`.
    /// A flow submitted before timestamps were recorded counts as stalled.
    #[must_use]
    pub fn is_stalled(&self, now: DateTime<Utc>) -> bool {
        self.is_in_flight()
            && self
                .submitted_at
                .is_none_or(|at| now - at >= Duration::seconds(CONFIRMATION_TIMEOUT_SECS))
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self.state, PaymentState::Closed { .. })
    }

    /// Apply an event.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidTransition`] if the event is not valid in
    /// the current state. The state is left unchanged in that case.
    pub fn apply(&mut self, event: PaymentEvent) -> Result<FlowEffect, FlowError> {
        let invalid = FlowError::InvalidTransition {
            state: self.state.name(),
            event: event.name(),
        };
        let submitted_at = match &event {
            PaymentEvent::ConfirmationSubmitted { at } => Some(*at),
            _ => None,
        };

        let (next, effect) = match (&self.state, event) {
            (
                PaymentState::Initializing,
                PaymentEvent::IntentCreated {
                    client_secret,
                    payment_intent_id,
                },
            ) => (
                PaymentState::AwaitingConfirmation {
                    client_secret,
                    payment_intent_id,
                    submitting: false,
                },
                FlowEffect::None,
            ),
            (PaymentState::Initializing, PaymentEvent::IntentFailed { message }) => {
                (PaymentState::Failed { message }, FlowEffect::None)
            }
            (
                PaymentState::AwaitingConfirmation {
                    client_secret,
                    payment_intent_id,
                    submitting: false,
                },
                PaymentEvent::ConfirmationSubmitted { .. },
            ) => (
                PaymentState::AwaitingConfirmation {
                    client_secret: client_secret.clone(),
                    payment_intent_id: payment_intent_id.clone(),
                    submitting: true,
                },
                FlowEffect::None,
            ),
            (
                PaymentState::AwaitingConfirmation {
                    client_secret,
                    payment_intent_id,
                    submitting: true,
                },
                PaymentEvent::Confirmed { status, at },
            ) => match status {
                IntentStatus::Succeeded => succeeded(payment_intent_id, at),
                s if s.needs_customer_action() || s.is_pending() => {
                    awaiting(client_secret, payment_intent_id, s)
                }
                _ => failed(),
            },
            (
                PaymentState::AwaitingConfirmation {
                    client_secret,
                    payment_intent_id,
                    submitting,
                },
                PaymentEvent::Refreshed { status, at },
            ) if !*submitting || self.is_stalled(at) => match status {
                IntentStatus::Succeeded => succeeded(payment_intent_id, at),
                IntentStatus::Canceled => failed(),
                // requires_payment_method after a failed attempt may be
                // confirmed again with another method
                s => awaiting(client_secret, payment_intent_id, s),
            },
            (
                PaymentState::AwaitingConfirmation {
                    submitting: true, ..
                },
                PaymentEvent::ConfirmationFailed { message },
            ) => (PaymentState::Failed { message }, FlowEffect::None),
            (PaymentState::Failed { .. }, PaymentEvent::Retry) => {
                (PaymentState::Initializing, FlowEffect::CreateIntent)
            }
            (
                PaymentState::Initializing
                | PaymentState::Failed { .. }
                | PaymentState::AwaitingConfirmation {
                    submitting: false, ..
                },
                PaymentEvent::Cancel,
            ) => (
                PaymentState::Closed {
                    outcome: CheckoutOutcome::Cancelled,
                },
                FlowEffect::None,
            ),
            (PaymentState::Succeeded { .. }, PaymentEvent::Close) => (
                PaymentState::Closed {
                    outcome: CheckoutOutcome::Completed,
                },
                FlowEffect::None,
            ),
            _ => return Err(invalid),
        };

        if effect == FlowEffect::CreateIntent {
            // A retry always starts from a fresh intent
            self.abandoned_intents.extend(self.current_intent.take());
            self.attempts += 1;
        }
        if let PaymentState::AwaitingConfirmation {
            payment_intent_id, ..
        } = &next
        {
            self.current_intent = Some(payment_intent_id.clone());
        }
        self.submitted_at = match next {
            PaymentState::AwaitingConfirmation {
                submitting: true, ..
            } => submitted_at,
            _ => None,
        };
        self.state = next;
        Ok(effect)
    }

    /// Close a succeeded checkout once [`SUCCESS_CLOSE_DELAY_MS`] has elapsed.
    ///
    /// Returns true if the flow was closed by this call.
    pub fn close_if_due(&mut self, now: DateTime<Utc>) -> bool {
        match self.state {
            PaymentState::Succeeded { at, .. }
                if now - at >= Duration::milliseconds(SUCCESS_CLOSE_DELAY_MS) => {
                self.state = PaymentState::Closed {
                    outcome: CheckoutOutcome::Completed,
                };
                true
            }
            _ => false,
        }
    }

    /// Identifier of the intent the flow is currently working with.
    #[must_use]
    pub fn current_intent(&self) -> Option<&str> {
        self.current_intent.as_deref()
    }
}

fn succeeded(payment_intent_id: &str, at: DateTime<Utc>) -> (PaymentState, FlowEffect) {
    (
        PaymentState::Succeeded {
            payment_intent_id: payment_intent_id.to_owned(),
            at,
        },
        FlowEffect::ClearCart,
    )
}

fn awaiting(
    client_secret: &str,
    payment_intent_id: &str,
    status: IntentStatus,
) -> (PaymentState, FlowEffect) {
    let effect = if status.needs_customer_action() {
        FlowEffect::AwaitCustomerAction
    } else if status.is_pending() {
        FlowEffect::AwaitProcessor
    } else {
        FlowEffect::None
    };
    (
        PaymentState::AwaitingConfirmation {
            client_secret: client_secret.to_owned(),
            payment_intent_id: payment_intent_id.to_owned(),
            submitting: false,
        },
        effect,
    )
}

fn failed() -> (PaymentState, FlowEffect) {
    (
        PaymentState::Failed {
            message: PAYMENT_NOT_COMPLETED.to_owned(),
        },
        FlowEffect::None,
    )
}

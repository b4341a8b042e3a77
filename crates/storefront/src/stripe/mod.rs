//! Stripe integration.
//!
//! This module provides:
//! - [`StripeClient`] for creating and confirming payment intents
//! - [`PaymentGateway`], the processor boundary used by checkout
//! - Webhook signature verification and event decoding
//! - The order payload carried in payment intent metadata

mod client;
mod error;
pub mod metadata;
mod types;
pub mod webhook;

pub use client::{PaymentGateway, StripeClient, intent_id_from_client_secret};
pub use error::{StripeError, WebhookError};
pub use metadata::{MetadataError, MetadataItem, OrderMetadata};
pub use types::{
    Charge, ConfirmPayment, CreateIntent, Event, LastPaymentError, NextAction, PaymentIntent,
    RedirectToUrl, WebhookEvent,
};

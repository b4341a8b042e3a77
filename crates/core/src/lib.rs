//! Océane Core - shipping, cart and checkout domain logic.
//!
//! This crate is shared by the storefront service and the CLI:
//! - `storefront` - HTTP service (payment intents, Stripe webhook, cart sessions)
//! - `cli` - Command-line tools for migrations and offline shipping quotes
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Everything that talks to the network lives in the
//! storefront crate and calls into this one.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, money, emails, country codes and statuses
//! - [`shipping`] - Zone resolution and carrier rate computation
//! - [`cart`] - Cart aggregation with a staleness-checked shipping selection
//! - [`checkout`] - Payment confirmation state machine

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod checkout;
pub mod shipping;
pub mod types;

pub use types::*;

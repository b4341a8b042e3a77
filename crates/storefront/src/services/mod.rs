//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `payment_intent` - Validates checkout requests and creates payment intents
//! - `checkout` - Drives the payment confirmation flow for a session
//! - `materializer` - Turns processor events into orders
//! - `mail` - Order confirmation emails
//! - `geolocation` - Reverse geocoding and country detection

pub mod checkout;
pub mod geolocation;
pub mod mail;
pub mod materializer;
pub mod payment_intent;

pub use checkout::{CheckoutDriver, CheckoutError, CheckoutSession, CustomerDetails};
pub use geolocation::{GeolocationClient, GeolocationError, ReverseGeocode};
pub use mail::{MailError, Mailer, OrderConfirmation, ResendMailer};
pub use materializer::{MaterializeError, MaterializeOutcome, OrderMaterializer};
pub use payment_intent::{
    PaymentIntentCreated, PaymentIntentError, PaymentIntentRequest, create_payment_intent,
};

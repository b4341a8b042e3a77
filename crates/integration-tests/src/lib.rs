//! Integration tests for the Océane storefront.
//!
//! # Running Tests
//!
//! ```bash
//! # Pure scenarios (no services needed)
//! cargo test -p oceane-integration-tests
//!
//! # Against a running storefront and its database
//! STOREFRONT_BASE_URL=http://localhost:3000 \
//! STRIPE_WEBHOOK_SECRET=whsec_... \
//! STOREFRONT_DATABASE_URL=postgres://... \
//!     cargo test -p oceane-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `shipping_scenarios` - Zone resolution and carrier pricing end to end
//! - `checkout_scenarios` - Cart to payment amounts and the confirmation flow
//! - `storefront_api` - HTTP tests against a live server (ignored by default)

use secrecy::SecretString;

/// Connection details for a running storefront.
pub struct TestContext {
    pub client: reqwest::Client,
    pub base_url: String,
    pub webhook_secret: Option<SecretString>,
    pub database_url: Option<String>,
}

impl TestContext {
    /// Read the target from the environment.
    ///
    /// # Panics
    ///
    /// Panics if `STOREFRONT_BASE_URL` is unset or the HTTP client cannot be
    /// built.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn from_env() -> Self {
        let base_url = std::env::var("STOREFRONT_BASE_URL")
            .expect("STOREFRONT_BASE_URL must point at a running storefront");
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
                .ok()
                .map(SecretString::from),
            database_url: std::env::var("STOREFRONT_DATABASE_URL").ok(),
        }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

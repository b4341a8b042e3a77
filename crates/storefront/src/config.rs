//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront
//! - `STOREFRONT_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STRIPE_SECRET_KEY` - Stripe secret API key
//! - `STRIPE_PUBLISHABLE_KEY` - Stripe publishable key (used to confirm payments)
//! - `STRIPE_WEBHOOK_SECRET` - Signing secret of the `/stripe-webhook` endpoint
//! - `STRIPE_API_VERSION` - Stripe API version (default: 2023-10-16)
//! - `STRIPE_WEBHOOK_TOLERANCE_SECS` - Accepted webhook timestamp skew (default: 300)
//! - `RESEND_API_KEY` - Resend API key for order confirmation emails
//! - `MAIL_FROM` - Sender of order confirmation emails
//! - `STORE_CURRENCY` - Default payment currency (default: xpf)
//! - `SHIPPING_RATE_POLICY` - `zone-gated` (default) or `threshold`
//! - `SHIPPING_FREE_THRESHOLD` - Subtotal in minor units above which the
//!   `threshold` policy waives shipping
//! - `ADMIN_API_TOKEN` - Bearer token for the shipping zone editor
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.0)
//!
//! Stripe and Resend keys are optional at start-up. Endpoints that need a
//! missing key answer with a configuration error at request time.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use oceane_core::{CurrencyCode, Money, shipping::RatePolicy};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Default Stripe API version pinned by the storefront.
pub const DEFAULT_STRIPE_API_VERSION: &str = "2023-10-16";

/// Default accepted age of a webhook signature timestamp.
pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;

/// Default sender of order confirmation emails.
pub const DEFAULT_MAIL_FROM: &str = "Pearl Renaissance <commandes@pearl-renaissance.com>";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Stripe API configuration
    pub stripe: StripeConfig,
    /// Order confirmation mail configuration
    pub mail: MailConfig,
    /// Shipping pricing configuration
    pub shipping: ShippingConfig,
    /// Bearer token guarding the shipping zone editor
    pub admin_api_token: Option<SecretString>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. "production")
    pub sentry_environment: Option<String>,
    /// Fraction of errors sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions traced
    pub sentry_traces_sample_rate: f32,
}

/// Stripe API configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: Option<SecretString>,
    /// Publishable key (safe to expose in browser)
    pub publishable_key: Option<String>,
    pub webhook_secret: Option<SecretString>,
    pub api_version: String,
    pub webhook_tolerance_secs: u64,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[REDACTED]"))
            .field("publishable_key", &self.publishable_key)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("api_version", &self.api_version)
            .field("webhook_tolerance_secs", &self.webhook_tolerance_secs)
            .finish()
    }
}

/// Resend mail configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct MailConfig {
    pub resend_api_key: Option<SecretString>,
    pub from_address: String,
}

impl std::fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailConfig")
            .field(
                "resend_api_key",
                &self.resend_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("from_address", &self.from_address)
            .finish()
    }
}

/// Shipping pricing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShippingConfig {
    pub policy: RatePolicy,
    pub currency: CurrencyCode,
    /// Only consulted by [`RatePolicy::Threshold`].
    pub free_shipping_threshold: Option<Money>,
}

impl Default for ShippingConfig {
    fn default() -> Self {
        Self {
            policy: RatePolicy::ZoneGated,
            currency: CurrencyCode::Xpf,
            free_shipping_threshold: None,
        }
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
        let host = get_parsed_or_default::<IpAddr>("STOREFRONT_HOST", "127.0.0.1")?;
        let port = get_parsed_or_default::<u16>("STOREFRONT_PORT", "3000")?;
        let base_url = get_required_env("STOREFRONT_BASE_URL")?;
        let session_secret = get_validated_secret("STOREFRONT_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "STOREFRONT_SESSION_SECRET")?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            stripe: StripeConfig::from_env()?,
            mail: MailConfig::from_env(),
            shipping: ShippingConfig::from_env()?,
            admin_api_token: get_optional_env("ADMIN_API_TOKEN").map(SecretString::from),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: get_parsed_or_default("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: get_parsed_or_default("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should be marked `Secure`.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl StripeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            secret_key: get_optional_env("STRIPE_SECRET_KEY").map(SecretString::from),
            publishable_key: get_optional_env("STRIPE_PUBLISHABLE_KEY"),
            webhook_secret: get_optional_env("STRIPE_WEBHOOK_SECRET").map(SecretString::from),
            api_version: get_env_or_default("STRIPE_API_VERSION", DEFAULT_STRIPE_API_VERSION),
            webhook_tolerance_secs: get_parsed_or_default(
                "STRIPE_WEBHOOK_TOLERANCE_SECS",
                &DEFAULT_WEBHOOK_TOLERANCE_SECS.to_string(),
            )?,
        })
    }
}

impl MailConfig {
    fn from_env() -> Self {
        Self {
            resend_api_key: get_optional_env("RESEND_API_KEY").map(SecretString::from),
            from_address: get_env_or_default("MAIL_FROM", DEFAULT_MAIL_FROM),
        }
    }
}

impl ShippingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let free_shipping_threshold = get_optional_env("SHIPPING_FREE_THRESHOLD")
            .map(|raw| {
                raw.parse::<i64>()
                    .ok()
                    .filter(|v| *v >= 0)
                    .map(Money::from_minor)
                    .ok_or_else(|| {
                        ConfigError::InvalidEnvVar(
                            "SHIPPING_FREE_THRESHOLD".to_string(),
                            format!("expected a non-negative amount in minor units, got {raw:?}"),
                        )
                    })
            })
            .transpose()?;

        Ok(Self {
            policy: get_parsed_or_default("SHIPPING_RATE_POLICY", RatePolicy::ZoneGated.as_str())?,
            currency: get_parsed_or_default("STORE_CURRENCY", CurrencyCode::Xpf.as_str())?,
            free_shipping_threshold,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable. Blank values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn get_parsed_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

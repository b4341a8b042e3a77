//! Database operations for storefront `PostgreSQL`.
//!
//! # Database: `oceane_storefront`
//!
//! ## Tables
//!
//! - `orders` - One row per succeeded payment intent (UNIQUE `stripe_payment_intent_id`)
//! - `order_items` - Snapshot of each distinct product in an order
//! - `shipping_zones` - Editable zone display costs and delivery windows
//! - `tower_sessions.session` - Tower-sessions storage (cart and checkout state)
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p oceane-cli -- migrate
//! ```

pub mod orders;
pub mod shipping_zones;

use std::str::FromStr;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use thiserror::Error;

pub use orders::{OrderStore, PgOrderStore, StatusUpdate};
pub use shipping_zones::ShippingZoneRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is invalid or corrupted.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Unique constraint violation.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a unique-constraint violation to [`RepositoryError::Conflict`].
    pub(crate) fn from_insert(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return Self::Conflict(db_err.message().to_string());
        }
        Self::Database(err)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// Connections search the `storefront` schema first so the `order_status`
/// enum resolves without qualification.
///
/// # Errors
///
/// Returns `sqlx::Error` if the URL is invalid or the connection cannot be
/// established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    let options = PgConnectOptions::from_str(database_url.expose_secret())?
        .options([("search_path", "storefront,public")]);

    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
}

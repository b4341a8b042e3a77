//! Shipping inspection commands.
//!
//! # Usage
//!
//! ```bash
//! # Default zone table
//! oce-cli shipping zones
//!
//! # Zone table with the overrides stored in the database
//! oce-cli shipping zones --stored
//!
//! # Carrier options for a destination
//! oce-cli shipping quote --country US --city Anchorage --subtotal 4000 --policy threshold
//! ```

use oceane_core::shipping::{Destination, RatePolicy, RateEngine, ShippingOptions, ShippingZone, ZoneTable};
use oceane_core::{CountryCode, CountryCodeError, CurrencyCode, Money};
use oceane_storefront::db::{RepositoryError, ShippingZoneRepository, create_pool};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShippingError {
    #[error("Missing environment variable: STOREFRONT_DATABASE_URL or DATABASE_URL")]
    MissingDatabaseUrl,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Country(#[from] CountryCodeError),

    #[error("subtotal cannot be negative")]
    NegativeSubtotal,
}

/// Print the zone table, optionally with stored overrides applied.
///
/// # Errors
///
/// Returns an error if `stored` is set and the overrides cannot be loaded.
pub async fn zones(stored: bool, currency: CurrencyCode) -> Result<(), ShippingError> {
    let table = if stored {
        let database_url = super::database_url().ok_or(ShippingError::MissingDatabaseUrl)?;
        let pool = create_pool(&database_url).await?;
        ShippingZoneRepository::new(&pool).load().await?
    } else {
        ZoneTable::defaults()
    };

    #[allow(clippy::print_stdout)]
    for zone in table.zones() {
        println!("{}", format_zone(zone, currency));
    }
    Ok(())
}

/// Print the carrier options for a destination.
///
/// # Errors
///
/// Returns an error if the country code is invalid or the subtotal negative.
pub fn quote(
    country: &str,
    city: Option<String>,
    subtotal: i64,
    policy: RatePolicy,
    free_shipping_threshold: Option<i64>,
    currency: CurrencyCode,
) -> Result<(), ShippingError> {
    let subtotal = Money::from_minor(subtotal);
    if subtotal.is_negative() {
        return Err(ShippingError::NegativeSubtotal);
    }
    let destination = Destination::new(CountryCode::parse(country)?, city);
    let engine = RateEngine::with_default_carriers(policy, free_shipping_threshold.map(Money::from_minor));
    let options = engine.options(&destination, subtotal);

    #[allow(clippy::print_stdout)]
    for line in format_options(&options, policy, currency) {
        println!("{line}");
    }
    Ok(())
}

fn format_zone(zone: &ShippingZone, currency: CurrencyCode) -> String {
    let countries = if zone.countries.is_empty() {
        "(all other countries)".to_owned()
    } else {
        zone.countries
            .iter()
            .filter(|c| c.len() == 2)
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    };
    format!(
        "{:<13} {:<28} base {:>10}  per kg {:>10}  {:<12} {}",
        zone.key.as_str(),
        zone.name,
        zone.base_cost.display(currency),
        zone.per_kg_cost.display(currency),
        zone.estimated_days,
        countries
    )
}

fn format_options(options: &ShippingOptions, policy: RatePolicy, currency: CurrencyCode) -> Vec<String> {
    let mut lines = vec![format!("zone: {} (policy {policy})", options.zone)];
    if options.local_free_delivery {
        lines.push("free local delivery, no carrier needed".to_owned());
        return lines;
    }
    if options.carriers.is_empty() {
        lines.push("no carrier delivers to this destination".to_owned());
    }
    for carrier in &options.carriers {
        let cost = if carrier.is_free {
            "free".to_owned()
        } else {
            carrier.cost.display(currency)
        };
        lines.push(format!(
            "  {:<16} {:<22} {:>12}  {}",
            carrier.carrier_id, carrier.name, cost, carrier.delivery_days
        ));
    }
    lines
}

//! Océane CLI - database migrations and shipping tools.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! oce-cli migrate
//!
//! # Print the shipping zones (defaults, or with stored overrides)
//! oce-cli shipping zones [--stored]
//!
//! # Price shipping for a destination without a running server
//! oce-cli shipping quote --country FR --city Lyon --subtotal 12000
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `shipping zones` - Print the zone table
//! - `shipping quote` - Print carrier options for a destination

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

use oceane_core::CurrencyCode;
use oceane_core::shipping::RatePolicy;

mod commands;

#[derive(Parser)]
#[command(name = "oce-cli")]
#[command(author, version, about = "Océane storefront CLI tools")]
struct Cli {
    /// Currency the amounts are shown in
    #[arg(long, global = true, default_value = "xpf", value_parser = parse_currency)]
    currency: CurrencyCode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Inspect shipping zones and rates
    Shipping {
        #[command(subcommand)]
        action: ShippingAction,
    },
}

#[derive(Subcommand)]
enum ShippingAction {
    /// Print the shipping zone table
    Zones {
        /// Apply the overrides stored in the database
        #[arg(long)]
        stored: bool,
    },
    /// Print the carrier options for a destination
    Quote {
        /// ISO 3166-1 alpha-2 country code
        #[arg(long)]
        country: String,

        /// City, used for local free delivery and surcharges
        #[arg(long)]
        city: Option<String>,

        /// Cart subtotal in minor units
        #[arg(long, default_value_t = 0)]
        subtotal: i64,

        /// Rate policy (`zone-gated` or `threshold`)
        #[arg(long, default_value = "zone-gated", value_parser = parse_policy)]
        policy: RatePolicy,

        /// Free shipping threshold in minor units (threshold policy only)
        #[arg(long)]
        free_threshold: Option<i64>,
    },
}

fn parse_policy(s: &str) -> Result<RatePolicy, String> {
    s.parse()
}

fn parse_currency(s: &str) -> Result<CurrencyCode, String> {
    s.parse()
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Shipping { action } => match action {
            ShippingAction::Zones { stored } => {
                commands::shipping::zones(stored, cli.currency).await?;
            }
            ShippingAction::Quote {
                country,
                city,
                subtotal,
                policy,
                free_threshold,
            } => commands::shipping::quote(
                &country,
                city,
                subtotal,
                policy,
                free_threshold,
                cli.currency,
            )?,
        },
    }
    Ok(())
}

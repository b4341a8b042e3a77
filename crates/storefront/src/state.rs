//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::RwLock;

use oceane_core::shipping::{RateEngine, ZoneTable};

use crate::config::StorefrontConfig;
use crate::db::{OrderStore, PgOrderStore};
use crate::services::checkout::CheckoutDriver;
use crate::services::geolocation::GeolocationClient;
use crate::services::mail::{Mailer, ResendMailer};
use crate::services::materializer::OrderMaterializer;
use crate::stripe::{PaymentGateway, StripeClient, StripeError};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: Option<PgPool>,
    rates: RateEngine,
    zones: RwLock<ZoneTable>,
    orders: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    mailer: Option<Arc<dyn Mailer>>,
    geolocation: GeolocationClient,
}

/// Collaborators behind the async seams.
pub struct Services {
    pub orders: Arc<dyn OrderStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub mailer: Option<Arc<dyn Mailer>>,
}

impl AppState {
    /// Create the production state: Postgres orders, Stripe, Resend.
    ///
    /// # Errors
    ///
    /// Returns an error if the Stripe client cannot be built.
    pub fn new(config: StorefrontConfig, pool: PgPool, zones: ZoneTable) -> Result<Self, StripeError> {
        let services = Services {
            orders: Arc::new(PgOrderStore::new(pool.clone())),
            gateway: Arc::new(StripeClient::new(&config.stripe)?),
            mailer: ResendMailer::from_config(&config.mail).map(|m| Arc::new(m) as Arc<dyn Mailer>),
        };
        Ok(Self::from_parts(config, Some(pool), zones, services))
    }

    /// Assemble state from explicit collaborators. Without a pool, the zone
    /// editor and readiness probe report the database as unavailable.
    #[must_use]
    pub fn from_parts(
        config: StorefrontConfig,
        pool: Option<PgPool>,
        zones: ZoneTable,
        services: Services,
    ) -> Self {
        let rates = RateEngine::with_default_carriers(
            config.shipping.policy,
            config.shipping.free_shipping_threshold,
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                rates,
                zones: RwLock::new(zones),
                orders: services.orders,
                gateway: services.gateway,
                mailer: services.mailer,
                geolocation: GeolocationClient::new(),
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool, if connected.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    #[must_use]
    pub fn rates(&self) -> &RateEngine {
        &self.inner.rates
    }

    /// Editable shipping zone table.
    #[must_use]
    pub fn zones(&self) -> &RwLock<ZoneTable> {
        &self.inner.zones
    }

    #[must_use]
    pub fn orders(&self) -> &Arc<dyn OrderStore> {
        &self.inner.orders
    }

    #[must_use]
    pub fn gateway(&self) -> &Arc<dyn PaymentGateway> {
        &self.inner.gateway
    }

    #[must_use]
    pub fn geolocation(&self) -> &GeolocationClient {
        &self.inner.geolocation
    }

    #[must_use]
    pub fn checkout(&self) -> CheckoutDriver {
        CheckoutDriver::new(self.inner.gateway.clone(), self.inner.config.shipping.currency)
    }

    #[must_use]
    pub fn materializer(&self) -> OrderMaterializer {
        OrderMaterializer::new(self.inner.orders.clone(), self.inner.mailer.clone())
    }
}

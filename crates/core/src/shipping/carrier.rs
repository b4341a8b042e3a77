//! Carrier catalog.
//!
//! Rates are in XPF, the home zone's currency.

use serde::{Deserialize, Serialize};

use super::zone::{ZoneKey, ZoneRates};
use crate::types::Money;

/// Rate and delivery window for one carrier in one zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneService {
    pub rate: Money,
    /// Business days, e.g. `"3-5"`.
    pub delivery_days: String,
}

/// Whether a carrier serves the home zone only or ships internationally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarrierScope {
    Local,
    International,
}

/// A shipping carrier and its per-zone service table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Carrier {
    pub id: String,
    pub name: String,
    pub scope: CarrierScope,
    /// `None` for zones the carrier does not serve.
    pub service: ZoneRates<Option<ZoneService>>,
    /// Subtotal at or above which shipping is waived. `None` means never.
    pub free_shipping_threshold: Option<Money>,
}

impl Carrier {
    #[must_use]
    pub const fn serves(&self, zone: ZoneKey) -> bool {
        self.service.get(zone).is_some()
    }

    #[must_use]
    pub fn rate(&self, zone: ZoneKey) -> Option<Money> {
        self.service.get(zone).as_ref().map(|s| s.rate)
    }

    #[must_use]
    pub fn delivery_days(&self, zone: ZoneKey) -> Option<&str> {
        self.service
            .get(zone)
            .as_ref()
            .map(|s| s.delivery_days.as_str())
    }

    /// Same carrier with a store-wide free shipping threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: Option<Money>) -> Self {
        self.free_shipping_threshold = threshold;
        self
    }
}

/// Identifier of the single carrier offered in the home zone.
pub const LOCAL_CARRIER_ID: &str = "laposte-tahiti";

fn svc(rate: i64, days: &str) -> Option<ZoneService> {
    Some(ZoneService {
        rate: Money::from_minor(rate),
        delivery_days: days.to_owned(),
    })
}

fn international(
    id: &str,
    name: &str,
    rates: [(i64, &str); 5],
) -> Carrier {
    let [pacific, europe, northamerica, asia, world] = rates;
    Carrier {
        id: id.to_owned(),
        name: name.to_owned(),
        scope: CarrierScope::International,
        service: ZoneRates {
            local: None,
            pacific: svc(pacific.0, pacific.1),
            europe: svc(europe.0, europe.1),
            northamerica: svc(northamerica.0, northamerica.1),
            asia: svc(asia.0, asia.1),
            world: svc(world.0, world.1),
        },
        free_shipping_threshold: None,
    }
}

/// The store's carriers, in display order.
#[must_use]
pub fn default_carriers() -> Vec<Carrier> {
    vec![
        Carrier {
            id: LOCAL_CARRIER_ID.to_owned(),
            name: "La Poste de Tahiti".to_owned(),
            scope: CarrierScope::Local,
            service: ZoneRates {
                local: svc(800, "3-7"),
                pacific: None,
                europe: None,
                northamerica: None,
                asia: None,
                world: None,
            },
            free_shipping_threshold: None,
        },
        international(
            "colissimo",
            "Colissimo",
            [
                (3500, "7-10"),
                (2500, "5-7"),
                (4000, "7-10"),
                (3800, "7-12"),
                (5000, "10-15"),
            ],
        ),
        international(
            "dhl",
            "DHL Express",
            [
                (5000, "3-5"),
                (4500, "2-4"),
                (5500, "3-5"),
                (5000, "3-5"),
                (7000, "5-7"),
            ],
        ),
        international(
            "fedex",
            "FedEx",
            [
                (5500, "3-5"),
                (5000, "3-5"),
                (4800, "2-4"),
                (5200, "3-5"),
                (7500, "5-8"),
            ],
        ),
        international(
            "ups",
            "UPS",
            [
                (5200, "4-6"),
                (4800, "3-5"),
                (4500, "2-4"),
                (5000, "4-6"),
                (7200, "6-9"),
            ],
        ),
        international(
            "chronopost",
            "Chronopost",
            [
                (4200, "5-7"),
                (3500, "2-4"),
                (5000, "5-7"),
                (4500, "5-7"),
                (6000, "7-10"),
            ],
        ),
    ]
}

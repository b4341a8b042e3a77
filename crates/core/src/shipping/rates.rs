//! Carrier rate engine.
//!
//! Two pricing policies exist and exactly one is active per engine:
//!
//! - [`RatePolicy::Threshold`]: every carrier serving the zone is offered.
//!   A carrier's cost is waived once the subtotal reaches its free shipping
//!   threshold; otherwise it is the zone rate plus the destination's city
//!   surcharge.
//! - [`RatePolicy::ZoneGated`]: the home zone only offers the local carrier
//!   and every other zone offers the international carriers, each at its flat
//!   zone rate. No waiver, no surcharge.
//!
//! Under both policies a destination eligible for free local delivery needs
//! no carrier and ships at zero cost.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::carrier::{Carrier, CarrierScope, default_carriers};
use super::locality::Destination;
use super::surcharge::city_surcharge;
use super::zone::ZoneKey;
use crate::types::Money;

/// Which rule set prices shipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RatePolicy {
    /// Threshold waiver plus city surcharge.
    Threshold,
    /// Zone-gated carrier availability at flat rates.
    #[default]
    ZoneGated,
}

impl RatePolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Threshold => "threshold",
            Self::ZoneGated => "zone-gated",
        }
    }
}

impl std::fmt::Display for RatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "threshold" => Ok(Self::Threshold),
            "zone-gated" | "zone_gated" | "zonegated" => Ok(Self::ZoneGated),
            _ => Err(format!("invalid rate policy: {s}")),
        }
    }
}

/// Price of one carrier for one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub cost: Money,
    /// Only set when a threshold waiver produced the zero cost.
    pub is_free: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RateError {
    #[error("unknown carrier: {0}")]
    UnknownCarrier(String),
    #[error("carrier {carrier} does not deliver to zone {zone}")]
    CarrierUnavailable { carrier: String, zone: ZoneKey },
    #[error("a carrier must be selected for this destination")]
    CarrierRequired,
    #[error("no carrier is needed for free local delivery")]
    NoCarrierNeeded,
}

/// A priced carrier offered for a destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarrierOption {
    pub carrier_id: String,
    pub name: String,
    pub cost: Money,
    pub is_free: bool,
    pub delivery_days: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_from: Option<Money>,
}

/// Everything a checkout needs to let the customer pick shipping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingOptions {
    pub zone: ZoneKey,
    pub local_free_delivery: bool,
    pub carriers: Vec<CarrierOption>,
}

impl ShippingOptions {
    /// Cheapest offered carrier, if any.
    #[must_use]
    pub fn cheapest(&self) -> Option<&CarrierOption> {
        self.carriers.iter().min_by_key(|c| c.cost)
    }
}

/// The chosen carrier and cost, stamped with the inputs it was computed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingSelection {
    pub destination: Destination,
    pub subtotal: Money,
    /// `None` when free local delivery applies.
    pub carrier_id: Option<String>,
    pub carrier_name: Option<String>,
    pub cost: Money,
    pub is_free: bool,
}

impl ShippingSelection {
    /// Whether this selection was computed for exactly these inputs.
    #[must_use]
    pub fn is_current_for(&self, destination: &Destination, subtotal: Money) -> bool {
        self.destination == *destination && self.subtotal == subtotal
    }
}

/// Prices shipping under one [`RatePolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateEngine {
    policy: RatePolicy,
    carriers: Vec<Carrier>,
}

impl RateEngine {
    #[must_use]
    pub const fn new(policy: RatePolicy, carriers: Vec<Carrier>) -> Self {
        Self { policy, carriers }
    }

    /// Engine over the store's carrier catalog.
    ///
    /// `free_shipping_threshold` is applied to every carrier and only has an
    /// effect under [`RatePolicy::Threshold`].
    #[must_use]
    pub fn with_default_carriers(policy: RatePolicy, free_shipping_threshold: Option<Money>) -> Self {
        let carriers = default_carriers()
            .into_iter()
            .map(|c| c.with_threshold(free_shipping_threshold))
            .collect();
        Self::new(policy, carriers)
    }

    #[must_use]
    pub const fn policy(&self) -> RatePolicy {
        self.policy
    }

    #[must_use]
    pub fn carriers(&self) -> &[Carrier] {
        &self.carriers
    }

    #[must_use]
    pub fn carrier(&self, id: &str) -> Option<&Carrier> {
        self.carriers.iter().find(|c| c.id == id)
    }

    /// Carriers offered for `destination`, in catalog order.
    #[must_use]
    pub fn available_carriers(&self, destination: &Destination) -> Vec<&Carrier> {
        if destination.is_local_free_delivery() {
            return Vec::new();
        }
        let zone = destination.zone();
        self.carriers
            .iter()
            .filter(|c| self.offers(c, zone))
            .collect()
    }

    fn offers(&self, carrier: &Carrier, zone: ZoneKey) -> bool {
        if !carrier.serves(zone) {
            return false;
        }
        match self.policy {
            RatePolicy::Threshold => true,
            RatePolicy::ZoneGated => match zone {
                ZoneKey::Local => carrier.scope == CarrierScope::Local,
                _ => carrier.scope == CarrierScope::International,
            },
        }
    }

    /// Price `carrier` for `destination` in `zone` at `subtotal`.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::CarrierUnavailable`] if the active policy does not
    /// offer this carrier in this zone.
    pub fn quote(
        &self,
        carrier: &Carrier,
        zone: ZoneKey,
        subtotal: Money,
        destination: &Destination,
    ) -> Result<Quote, RateError> {
        let unavailable = || RateError::CarrierUnavailable {
            carrier: carrier.id.clone(),
            zone,
        };
        if !self.offers(carrier, zone) {
            return Err(unavailable());
        }
        let rate = carrier.rate(zone).ok_or_else(unavailable)?;

        let quote = match self.policy {
            RatePolicy::Threshold => match carrier.free_shipping_threshold {
                Some(threshold) if subtotal >= threshold => Quote {
                    cost: Money::ZERO,
                    is_free: true,
                },
                _ => Quote {
                    cost: rate + city_surcharge(destination.country, destination.city.as_deref()),
                    is_free: false,
                },
            },
            RatePolicy::ZoneGated => Quote {
                cost: rate,
                is_free: false,
            },
        };

        Ok(Quote {
            cost: quote.cost.max(Money::ZERO),
            ..quote
        })
    }

    /// Price every carrier offered for `destination`.
    #[must_use]
    pub fn options(&self, destination: &Destination, subtotal: Money) -> ShippingOptions {
        let zone = destination.zone();
        let carriers = self
            .available_carriers(destination)
            .into_iter()
            .filter_map(|carrier| {
                let quote = self.quote(carrier, zone, subtotal, destination).ok()?;
                Some(CarrierOption {
                    carrier_id: carrier.id.clone(),
                    name: carrier.name.clone(),
                    cost: quote.cost,
                    is_free: quote.is_free,
                    delivery_days: carrier.delivery_days(zone).unwrap_or_default().to_owned(),
                    free_from: match self.policy {
                        RatePolicy::Threshold => carrier.free_shipping_threshold,
                        RatePolicy::ZoneGated => None,
                    },
                })
            })
            .collect();

        ShippingOptions {
            zone,
            local_free_delivery: destination.is_local_free_delivery(),
            carriers,
        }
    }

    /// Resolve a shipping selection for the given inputs.
    ///
    /// # Errors
    ///
    /// Returns an error if a carrier is chosen for a free local delivery
    /// destination, none is chosen where one is required, or the chosen
    /// carrier is unknown or not offered.
    pub fn select(
        &self,
        destination: &Destination,
        subtotal: Money,
        carrier_id: Option<&str>,
    ) -> Result<ShippingSelection, RateError> {
        let stamp = |carrier: Option<&Carrier>, quote: Quote| ShippingSelection {
            destination: destination.clone(),
            subtotal,
            carrier_id: carrier.map(|c| c.id.clone()),
            carrier_name: carrier.map(|c| c.name.clone()),
            cost: quote.cost,
            is_free: quote.is_free,
        };

        if destination.is_local_free_delivery() {
            if carrier_id.is_some() {
                return Err(RateError::NoCarrierNeeded);
            }
            return Ok(stamp(
                None,
                Quote {
                    cost: Money::ZERO,
                    is_free: false,
                },
            ));
        }

        let id = carrier_id.ok_or(RateError::CarrierRequired)?;
        let carrier = self
            .carrier(id)
            .ok_or_else(|| RateError::UnknownCarrier(id.to_owned()))?;
        let quote = self.quote(carrier, destination.zone(), subtotal, destination)?;
        Ok(stamp(Some(carrier), quote))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::shipping::carrier::{LOCAL_CARRIER_ID, ZoneService};
    use crate::shipping::zone::ZoneRates;
    use crate::types::CountryCode;

    fn dest(country: &str, city: Option<&str>) -> Destination {
        Destination::new(CountryCode::parse(country).unwrap(), city.map(str::to_owned))
    }

    fn flat_carrier(rate: i64, threshold: Option<i64>) -> Carrier {
        Carrier {
            id: "test-express".to_owned(),
            name: "Test Express".to_owned(),
            scope: CarrierScope::International,
            service: ZoneRates::from_fn(|zone| {
                (zone != ZoneKey::Local).then(|| ZoneService {
                    rate: Money::from_minor(rate),
                    delivery_days: "3-5".to_owned(),
                })
            }),
            free_shipping_threshold: threshold.map(Money::from_minor),
        }
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("threshold".parse::<RatePolicy>().unwrap(), RatePolicy::Threshold);
        assert_eq!("Zone-Gated".parse::<RatePolicy>().unwrap(), RatePolicy::ZoneGated);
        assert!("both".parse::<RatePolicy>().is_err());
        assert_eq!(RatePolicy::default(), RatePolicy::ZoneGated);
    }

    // Free local delivery holds under both policies.

    #[test]
    fn test_papeete_needs_no_carrier_under_both_policies() {
        for policy in [RatePolicy::Threshold, RatePolicy::ZoneGated] {
            let engine = RateEngine::with_default_carriers(policy, None);
            let papeete = dest("PF", Some("Papeete"));
            let options = engine.options(&papeete, Money::from_minor(10_000));
            assert_eq!(options.zone, ZoneKey::Local);
            assert!(options.local_free_delivery);
            assert!(options.carriers.is_empty());

            let selection = engine.select(&papeete, Money::from_minor(10_000), None).unwrap();
            assert_eq!(selection.cost, Money::ZERO);
            assert_eq!(selection.carrier_id, None);
            assert!(!selection.is_free);
            assert_eq!(
                engine.select(&papeete, Money::from_minor(10_000), Some("colissimo")),
                Err(RateError::NoCarrierNeeded)
            );
        }
    }

    // Zone-gated policy.

    #[test]
    fn test_zone_gated_outer_islands_get_local_carrier_only() {
        let engine = RateEngine::with_default_carriers(RatePolicy::ZoneGated, None);
        let options = engine.options(&dest("PF", Some("Uturoa")), Money::from_minor(50_000));
        assert_eq!(options.carriers.len(), 1);
        let only = options.carriers.first().unwrap();
        assert_eq!(only.carrier_id, LOCAL_CARRIER_ID);
        assert_eq!(only.cost, Money::from_minor(800));
        assert!(!only.is_free);
    }

    #[test]
    fn test_zone_gated_foreign_zone_offers_international_flat_rates() {
        let engine = RateEngine::with_default_carriers(RatePolicy::ZoneGated, None);
        let options = engine.options(&dest("US", Some("Anchorage")), Money::from_minor(1_000));
        let ids: Vec<&str> = options.carriers.iter().map(|c| c.carrier_id.as_str()).collect();
        assert_eq!(ids, ["colissimo", "dhl", "fedex", "ups", "chronopost"]);

        // No surcharge under the zone-gated policy
        let dhl = options.carriers.iter().find(|c| c.carrier_id == "dhl").unwrap();
        assert_eq!(dhl.cost, Money::from_minor(5500));
        assert_eq!(dhl.delivery_days, "3-5");
        assert_eq!(options.cheapest().unwrap().carrier_id, "ups");
    }

    #[test]
    fn test_zone_gated_ignores_thresholds() {
        let engine = RateEngine::new(RatePolicy::ZoneGated, vec![flat_carrier(4000, Some(1000))]);
        let d = dest("US", None);
        let carrier = engine.carrier("test-express").unwrap();
        let quote = engine
            .quote(carrier, ZoneKey::NorthAmerica, Money::from_minor(999_999), &d)
            .unwrap();
        assert_eq!(quote, Quote { cost: Money::from_minor(4000), is_free: false });
    }

    #[test]
    fn test_zone_gated_rejects_international_carrier_at_home() {
        let engine = RateEngine::with_default_carriers(RatePolicy::ZoneGated, None);
        let err = engine
            .select(&dest("PF", Some("Uturoa")), Money::from_minor(100), Some("dhl"))
            .unwrap_err();
        assert!(matches!(err, RateError::CarrierUnavailable { .. }));
    }

    // Threshold policy.

    #[test]
    fn test_threshold_anchorage_adds_surcharge() {
        let engine = RateEngine::new(RatePolicy::Threshold, vec![flat_carrier(4000, Some(100_000))]);
        let anchorage = dest("US", Some("Anchorage"));
        assert_eq!(anchorage.zone(), ZoneKey::NorthAmerica);
        let carrier = engine.carrier("test-express").unwrap();
        let quote = engine
            .quote(carrier, ZoneKey::NorthAmerica, Money::from_minor(20_000), &anchorage)
            .unwrap();
        assert_eq!(quote.cost, Money::from_minor(5500));
        assert!(!quote.is_free);
    }

    #[test]
    fn test_threshold_monotonic_and_zero_at_threshold() {
        let engine = RateEngine::new(RatePolicy::Threshold, vec![flat_carrier(4000, Some(30_000))]);
        let carrier = engine.carrier("test-express").unwrap();
        let d = dest("FR", Some("Brest"));

        let mut last = Money::from_minor(i64::MAX);
        for subtotal in (0..=60_000).step_by(2_500) {
            let quote = engine
                .quote(carrier, ZoneKey::Europe, Money::from_minor(subtotal), &d)
                .unwrap();
            assert!(quote.cost <= last, "cost rose at subtotal {subtotal}");
            assert!(!quote.cost.is_negative());
            if subtotal >= 30_000 {
                assert_eq!(quote, Quote { cost: Money::ZERO, is_free: true });
            } else {
                assert_eq!(quote.cost, Money::from_minor(4300));
                assert!(!quote.is_free);
            }
            last = quote.cost;
        }
    }

    #[test]
    fn test_threshold_never_waives_without_threshold() {
        let engine = RateEngine::with_default_carriers(RatePolicy::Threshold, None);
        let options = engine.options(&dest("JP", Some("Tokyo")), Money::from_minor(i64::MAX / 2));
        assert!(options.carriers.iter().all(|c| !c.is_free && c.cost.is_positive()));
    }

    #[test]
    fn test_threshold_offers_every_serving_carrier() {
        let engine = RateEngine::with_default_carriers(RatePolicy::Threshold, Some(Money::from_minor(20_000)));
        let outer = engine.options(&dest("PF", Some("Rangiroa")), Money::from_minor(100));
        assert_eq!(outer.carriers.len(), 1);
        let foreign = engine.options(&dest("NZ", None), Money::from_minor(25_000));
        assert_eq!(foreign.carriers.len(), 5);
        assert!(foreign.carriers.iter().all(|c| c.is_free));
        assert!(foreign.carriers.iter().all(|c| c.free_from == Some(Money::from_minor(20_000))));
    }

    #[test]
    fn test_select_errors() {
        let engine = RateEngine::with_default_carriers(RatePolicy::ZoneGated, None);
        let paris = dest("FR", Some("Paris"));
        assert_eq!(
            engine.select(&paris, Money::from_minor(100), None),
            Err(RateError::CarrierRequired)
        );
        assert_eq!(
            engine.select(&paris, Money::from_minor(100), Some("pigeon")),
            Err(RateError::UnknownCarrier("pigeon".to_owned()))
        );
        let ok = engine.select(&paris, Money::from_minor(100), Some("colissimo")).unwrap();
        assert_eq!(ok.cost, Money::from_minor(2500));
        assert!(ok.is_current_for(&paris, Money::from_minor(100)));
        assert!(!ok.is_current_for(&paris, Money::from_minor(101)));
    }
}

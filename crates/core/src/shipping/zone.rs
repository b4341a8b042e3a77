//! Shipping zones and country-to-zone resolution.

use core::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Money;

/// Key of a shipping zone.
///
/// Every carrier rate table is a [`ZoneRates`], which has one field per key,
/// so adding a variant here forces every table to be extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKey {
    /// French Polynesia, the store's home zone.
    Local,
    Pacific,
    Europe,
    NorthAmerica,
    Asia,
    /// Fallback for any country no other zone lists.
    World,
}

impl ZoneKey {
    pub const ALL: [Self; 6] = [
        Self::Local,
        Self::Pacific,
        Self::Europe,
        Self::NorthAmerica,
        Self::Asia,
        Self::World,
    ];

    /// The zone every unlisted country falls into.
    pub const FALLBACK: Self = Self::World;

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Pacific => "pacific",
            Self::Europe => "europe",
            Self::NorthAmerica => "northamerica",
            Self::Asia => "asia",
            Self::World => "world",
        }
    }
}

impl fmt::Display for ZoneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ZoneKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "polynesia" => Ok(Self::Local),
            "pacific" => Ok(Self::Pacific),
            "europe" => Ok(Self::Europe),
            "northamerica" => Ok(Self::NorthAmerica),
            "asia" => Ok(Self::Asia),
            "world" => Ok(Self::World),
            _ => Err(format!("unknown shipping zone: {s}")),
        }
    }
}

/// One value per zone key.
///
/// Used for carrier rate and delivery tables so that "every zone has an
/// entry" holds by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub struct ZoneRates<T> {
    pub local: T,
    pub pacific: T,
    pub europe: T,
    pub northamerica: T,
    pub asia: T,
    pub world: T,
}

impl<T> ZoneRates<T> {
    #[must_use]
    pub const fn get(&self, zone: ZoneKey) -> &T {
        match zone {
            ZoneKey::Local => &self.local,
            ZoneKey::Pacific => &self.pacific,
            ZoneKey::Europe => &self.europe,
            ZoneKey::NorthAmerica => &self.northamerica,
            ZoneKey::Asia => &self.asia,
            ZoneKey::World => &self.world,
        }
    }

    pub const fn get_mut(&mut self, zone: ZoneKey) -> &mut T {
        match zone {
            ZoneKey::Local => &mut self.local,
            ZoneKey::Pacific => &mut self.pacific,
            ZoneKey::Europe => &mut self.europe,
            ZoneKey::NorthAmerica => &mut self.northamerica,
            ZoneKey::Asia => &mut self.asia,
            ZoneKey::World => &mut self.world,
        }
    }

    /// Build a table by evaluating `f` for every zone key.
    pub fn from_fn(mut f: impl FnMut(ZoneKey) -> T) -> Self {
        Self {
            local: f(ZoneKey::Local),
            pacific: f(ZoneKey::Pacific),
            europe: f(ZoneKey::Europe),
            northamerica: f(ZoneKey::NorthAmerica),
            asia: f(ZoneKey::Asia),
            world: f(ZoneKey::World),
        }
    }
}

/// A shipping zone with its flat estimate parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingZone {
    pub key: ZoneKey,
    pub name: String,
    /// Country identifiers claimed by this zone: ISO codes and English names.
    pub countries: Vec<String>,
    pub base_cost: Money,
    pub per_kg_cost: Money,
    /// Free text, e.g. `"7-10 jours"`.
    pub estimated_days: String,
}

impl ShippingZone {
    /// Parcel weight assumed when the cart does not provide one.
    pub const DEFAULT_WEIGHT_GRAMS: u32 = 100;

    /// Largest base or per-kilogram cost an editor may set, in minor units.
    pub const MAX_COST: Money = Money::from_minor(100_000_000);

    /// Whether this zone lists `country` (trimmed, case-insensitive).
    #[must_use]
    pub fn matches(&self, country: &str) -> bool {
        let country = country.trim();
        !country.is_empty()
            && self
                .countries
                .iter()
                .any(|c| c.eq_ignore_ascii_case(country))
    }

    /// Flat estimate: base cost plus the per-kilogram cost for `weight_grams`,
    /// rounded half-up to the nearest minor unit. Saturates instead of
    /// overflowing for zones built outside [`ZoneTable`] validation.
    #[must_use]
    pub fn estimate(&self, weight_grams: u32) -> Money {
        let weighted = self
            .per_kg_cost
            .minor()
            .saturating_mul(i64::from(weight_grams))
            .saturating_add(500)
            / 1000;
        self.base_cost.saturating_add(Money::from_minor(weighted))
    }
}

/// Editable fields of a zone. Country lists are fixed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneUpdate {
    pub base_cost: Option<Money>,
    pub per_kg_cost: Option<Money>,
    pub estimated_days: Option<String>,
}

/// Errors raised when building or editing a [`ZoneTable`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ZoneTableError {
    #[error("zone {0} is missing")]
    MissingZone(ZoneKey),
    #[error("zone {0} is defined more than once")]
    DuplicateZone(ZoneKey),
    #[error("the fallback zone must not list any countries")]
    FallbackHasCountries,
    #[error("zone {zone}: {field} cannot be negative")]
    NegativeCost { zone: ZoneKey, field: &'static str },
    #[error("zone {zone}: {field} exceeds {}", ShippingZone::MAX_COST)]
    CostTooHigh { zone: ZoneKey, field: &'static str },
}

/// The full set of shipping zones.
///
/// Invariant: every [`ZoneKey`] appears exactly once and the fallback zone
/// claims no countries, so resolution is total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneTable {
    zones: Vec<ShippingZone>,
}

impl ZoneTable {
    /// Validate and build a table.
    ///
    /// # Errors
    ///
    /// Returns an error if a zone key is missing or duplicated, the fallback
    /// zone lists countries, or any cost is out of range.
    pub fn new(mut zones: Vec<ShippingZone>) -> Result<Self, ZoneTableError> {
        for key in ZoneKey::ALL {
            match zones.iter().filter(|z| z.key == key).count() {
                0 => return Err(ZoneTableError::MissingZone(key)),
                1 => {}
                _ => return Err(ZoneTableError::DuplicateZone(key)),
            }
        }
        if zones
            .iter()
            .any(|z| z.key == ZoneKey::FALLBACK && !z.countries.is_empty())
        {
            return Err(ZoneTableError::FallbackHasCountries);
        }
        for zone in &zones {
            check_costs(zone.key, zone.base_cost, zone.per_kg_cost)?;
        }
        zones.sort_by_key(|z| z.key);
        Ok(Self { zones })
    }

    /// The store's default zones.
    #[must_use]
    pub fn defaults() -> Self {
        DEFAULT_ZONES.clone()
    }

    /// Resolve a country identifier to a zone key, falling back to
    /// [`ZoneKey::World`].
    #[must_use]
    pub fn resolve(&self, country: &str) -> ZoneKey {
        self.zones
            .iter()
            .find(|z| z.matches(country))
            .map_or(ZoneKey::FALLBACK, |z| z.key)
    }

    /// Look up a zone by key. Always present by the table invariant.
    #[must_use]
    pub fn zone(&self, key: ZoneKey) -> Option<&ShippingZone> {
        self.zones.iter().find(|z| z.key == key)
    }

    #[must_use]
    pub fn zones(&self) -> &[ShippingZone] {
        &self.zones
    }

    /// Apply an edit to one zone's cost fields and delivery window.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting costs would be negative or above
    /// [`ShippingZone::MAX_COST`].
    pub fn update(&mut self, key: ZoneKey, update: ZoneUpdate) -> Result<&ShippingZone, ZoneTableError> {
        let zone = self
            .zones
            .iter_mut()
            .find(|z| z.key == key)
            .ok_or(ZoneTableError::MissingZone(key))?;

        let base = update.base_cost.unwrap_or(zone.base_cost);
        let per_kg = update.per_kg_cost.unwrap_or(zone.per_kg_cost);
        check_costs(key, base, per_kg)?;

        zone.base_cost = base;
        zone.per_kg_cost = per_kg;
        if let Some(days) = update.estimated_days {
            zone.estimated_days = days;
        }
        Ok(zone)
    }
}

fn check_costs(zone: ZoneKey, base: Money, per_kg: Money) -> Result<(), ZoneTableError> {
    for (field, cost) in [("baseCost", base), ("perKgCost", per_kg)] {
        if cost.is_negative() {
            return Err(ZoneTableError::NegativeCost { zone, field });
        }
        if cost > ShippingZone::MAX_COST {
            return Err(ZoneTableError::CostTooHigh { zone, field });
        }
    }
    Ok(())
}

/// Resolve a country code against the default zone table.
///
/// Total: every input maps to exactly one zone, with [`ZoneKey::World`] for
/// anything unlisted (including empty or malformed input).
#[must_use]
pub fn resolve_zone(country: &str) -> ZoneKey {
    DEFAULT_ZONES.resolve(country)
}

fn zone(
    key: ZoneKey,
    name: &str,
    countries: &[&str],
    base_cost: i64,
    per_kg_cost: i64,
    estimated_days: &str,
) -> ShippingZone {
    ShippingZone {
        key,
        name: name.to_owned(),
        countries: countries.iter().map(|c| (*c).to_owned()).collect(),
        base_cost: Money::from_minor(base_cost),
        per_kg_cost: Money::from_minor(per_kg_cost),
        estimated_days: estimated_days.to_owned(),
    }
}

static DEFAULT_ZONES: LazyLock<ZoneTable> = LazyLock::new(|| ZoneTable {
    zones: vec![
        zone(
            ZoneKey::Local,
            "Polynésie française",
            &["PF", "French Polynesia", "Polynésie française", "Polynésie"],
            0,
            0,
            "1-2 jours",
        ),
        zone(
            ZoneKey::Pacific,
            "Pacifique",
            &[
                "NZ", "AU", "FJ", "NC",
                "New Zealand", "Australia", "Fiji", "New Caledonia", "Nouvelle-Calédonie",
            ],
            2500,
            800,
            "5-7 jours",
        ),
        zone(
            ZoneKey::Europe,
            "Europe",
            &[
                "FR", "DE", "IT", "ES", "BE", "CH", "NL", "GB", "PT", "AT", "IE", "GR", "FI",
                "SE", "DK", "NO", "PL", "CZ", "HU", "RO", "BG", "HR", "SK", "SI", "LU", "MC",
                "France", "Germany", "Italy", "Spain", "Belgium", "Switzerland", "Netherlands",
                "United Kingdom", "Portugal", "Austria", "Ireland", "Greece", "Finland",
                "Sweden", "Denmark", "Norway", "Poland", "Czech Republic", "Hungary",
                "Romania", "Bulgaria", "Croatia", "Slovakia", "Slovenia", "Luxembourg",
                "Monaco",
            ],
            3500,
            1200,
            "7-10 jours",
        ),
        zone(
            ZoneKey::NorthAmerica,
            "Amérique du Nord",
            &["US", "CA", "MX", "United States", "USA", "Canada", "Mexico"],
            4000,
            1500,
            "7-12 jours",
        ),
        zone(
            ZoneKey::Asia,
            "Asie",
            &[
                "JP", "CN", "KR", "SG", "HK", "TW",
                "Japan", "China", "South Korea", "Singapore", "Hong Kong", "Taiwan",
            ],
            3000,
            1000,
            "5-8 jours",
        ),
        zone(ZoneKey::World, "Reste du monde", &[], 5000, 1800, "10-15 jours"),
    ],
});

//! Destinations and the home-zone free delivery allow-list.

use serde::{Deserialize, Serialize};

use super::zone::{ZoneKey, resolve_zone};
use crate::types::CountryCode;

/// The store's home country. Only its localities can get free delivery.
pub const HOME_COUNTRY: CountryCode = CountryCode::PF;

/// Communes of Tahiti and Moorea delivered by hand at no cost.
const LOCAL_FREE_DELIVERY_CITIES: &[&str] = &[
    "papeete", "faaa", "punaauia", "pirae", "arue", "mahina", "paea", "papara", "taravao",
    "tiarei", "moorea", "temae", "haapiti", "afareaitu", "paopao",
];

/// Whether `city` in `country` qualifies for free local delivery.
///
/// False for every city outside [`HOME_COUNTRY`]; absent or blank cities are
/// never eligible.
#[must_use]
pub fn is_local_free_delivery(country: CountryCode, city: Option<&str>) -> bool {
    if country != HOME_COUNTRY {
        return false;
    }
    let Some(city) = city.map(|c| c.trim().to_lowercase()) else {
        return false;
    };
    !city.is_empty() && LOCAL_FREE_DELIVERY_CITIES.contains(&city.as_str())
}

/// Where an order ships to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub country: CountryCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl Destination {
    #[must_use]
    pub fn new(country: CountryCode, city: Option<String>) -> Self {
        let city = city
            .map(|c| c.trim().to_owned())
            .filter(|c| !c.is_empty());
        Self { country, city }
    }

    #[must_use]
    pub fn zone(&self) -> ZoneKey {
        resolve_zone(self.country.as_str())
    }

    #[must_use]
    pub fn is_local_free_delivery(&self) -> bool {
        is_local_free_delivery(self.country, self.city.as_deref())
    }
}

//! Destination surcharges for outlying cities.

use crate::types::{CountryCode, Money};

struct CountrySurcharges {
    country: &'static str,
    default: i64,
    cities: &'static [(&'static str, i64)],
}

const SURCHARGES: &[CountrySurcharges] = &[
    CountrySurcharges {
        country: "FR",
        default: 300,
        cities: &[
            ("paris", 0),
            ("lyon", 0),
            ("marseille", 0),
            ("toulouse", 0),
            ("nice", 0),
            ("nantes", 0),
            ("strasbourg", 0),
            ("bordeaux", 0),
            ("lille", 0),
            ("montpellier", 0),
        ],
    },
    CountrySurcharges {
        country: "US",
        default: 400,
        cities: &[
            ("new york", 0),
            ("los angeles", 0),
            ("chicago", 0),
            ("houston", 0),
            ("phoenix", 0),
            ("san francisco", 0),
            ("miami", 0),
            ("seattle", 0),
            ("boston", 0),
            ("denver", 0),
            ("anchorage", 1500),
            ("honolulu", 1200),
        ],
    },
    CountrySurcharges {
        country: "DE",
        default: 250,
        cities: &[
            ("berlin", 0),
            ("munich", 0),
            ("hamburg", 0),
            ("frankfurt", 0),
            ("cologne", 0),
            ("düsseldorf", 0),
            ("stuttgart", 0),
        ],
    },
    CountrySurcharges {
        country: "JP",
        default: 400,
        cities: &[
            ("tokyo", 0),
            ("osaka", 0),
            ("kyoto", 0),
            ("yokohama", 0),
            ("nagoya", 0),
            ("sapporo", 0),
            ("kobe", 0),
            ("fukuoka", 0),
        ],
    },
    CountrySurcharges {
        country: "AU",
        default: 600,
        cities: &[
            ("sydney", 0),
            ("melbourne", 0),
            ("brisbane", 0),
            ("perth", 0),
            ("adelaide", 0),
        ],
    },
    CountrySurcharges {
        country: "CA",
        default: 500,
        cities: &[
            ("toronto", 0),
            ("montreal", 0),
            ("vancouver", 0),
            ("calgary", 0),
            ("ottawa", 0),
        ],
    },
    // Outer islands are priced through the local carrier instead
    CountrySurcharges {
        country: "PF",
        default: 0,
        cities: &[],
    },
];

/// Surcharge added to a carrier's base rate for `city` in `country`.
///
/// Named cities use their explicit value (often zero), other cities use the
/// country default, and countries without a table get nothing. No city means
/// no surcharge.
#[must_use]
pub fn city_surcharge(country: CountryCode, city: Option<&str>) -> Money {
    let Some(city) = city.map(|c| c.trim().to_lowercase()).filter(|c| !c.is_empty()) else {
        return Money::ZERO;
    };
    let Some(table) = SURCHARGES.iter().find(|t| t.country == country.as_str()) else {
        return Money::ZERO;
    };
    let minor = table
        .cities
        .iter()
        .find(|(name, _)| *name == city)
        .map_or(table.default, |(_, amount)| *amount);
    Money::from_minor(minor)
}

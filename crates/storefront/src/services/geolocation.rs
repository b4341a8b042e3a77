//! Location lookups used for shipping estimates.
//!
//! Reverse geocoding goes through Nominatim and country detection through
//! ipapi.co. Both are best-effort: callers get an empty result or the home
//! country on failure. Results are cached for 5 minutes.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use oceane_core::CountryCode;
use oceane_core::shipping::HOME_COUNTRY;

const NOMINATIM_REVERSE_URL: &str = "https://nominatim.openstreetmap.org/reverse";
const IPAPI_BASE_URL: &str = "https://ipapi.co";
const USER_AGENT: &str = concat!("oceane-storefront/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum GeolocationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("lookup service returned HTTP {0}")]
    Status(u16),

    #[error("coordinates out of range")]
    InvalidCoordinates,
}

/// Address parts resolved from coordinates. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseGeocode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<CountryCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimResponse {
    #[serde(default)]
    address: NominatimAddress,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
    state: Option<String>,
    region: Option<String>,
}

impl From<NominatimResponse> for ReverseGeocode {
    fn from(response: NominatimResponse) -> Self {
        let a = response.address;
        Self {
            city: a.city.or(a.town).or(a.village).or(a.municipality),
            country: a.country,
            country_code: a.country_code.and_then(|c| c.parse().ok()),
            region: a.state.or(a.region),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    #[serde(default)]
    country_code: Option<String>,
}

#[derive(Clone)]
pub struct GeolocationClient {
    inner: Arc<GeolocationInner>,
}

struct GeolocationInner {
    client: reqwest::Client,
    reverse_cache: Cache<String, ReverseGeocode>,
    country_cache: Cache<String, CountryCode>,
}

impl Default for GeolocationClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GeolocationClient {
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            inner: Arc::new(GeolocationInner {
                client,
                reverse_cache: Cache::builder()
                    .max_capacity(10_000)
                    .time_to_live(Duration::from_secs(300))
                    .build(),
                country_cache: Cache::builder()
                    .max_capacity(10_000)
                    .time_to_live(Duration::from_secs(300))
                    .build(),
            }),
        }
    }

    /// Resolve coordinates to city, country and region. Failures yield an
    /// empty result.
    #[instrument(skip(self))]
    pub async fn reverse_geocode(&self, lat: f64, lon: f64) -> ReverseGeocode {
        let key = format!("{lat:.3},{lon:.3}");
        if let Some(hit) = self.inner.reverse_cache.get(&key).await {
            debug!("Reverse geocode cache hit");
            return hit;
        }

        match self.fetch_reverse(lat, lon).await {
            Ok(result) => {
                self.inner.reverse_cache.insert(key, result.clone()).await;
                result
            }
            Err(e) => {
                warn!(error = %e, "Reverse geocoding failed");
                ReverseGeocode::default()
            }
        }
    }

    async fn fetch_reverse(&self, lat: f64, lon: f64) -> Result<ReverseGeocode, GeolocationError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(GeolocationError::InvalidCoordinates);
        }

        let response = self
            .inner
            .client
            .get(NOMINATIM_REVERSE_URL)
            .header(reqwest::header::ACCEPT_LANGUAGE, "fr")
            .query(&[
                ("format", "json"),
                ("lat", &lat.to_string()),
                ("lon", &lon.to_string()),
                ("zoom", "10"),
                ("addressdetails", "1"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GeolocationError::Status(response.status().as_u16()));
        }
        Ok(response.json::<NominatimResponse>().await?.into())
    }

    /// Detect the visitor's country from their IP address, defaulting to the
    /// home country.
    #[instrument(skip(self))]
    pub async fn detect_country(&self, ip: Option<IpAddr>) -> CountryCode {
        let key = ip.map_or_else(String::new, |ip| ip.to_string());
        if let Some(hit) = self.inner.country_cache.get(&key).await {
            return hit;
        }

        match self.fetch_country(ip).await {
            Ok(Some(code)) => {
                self.inner.country_cache.insert(key, code).await;
                code
            }
            Ok(None) => HOME_COUNTRY,
            Err(e) => {
                warn!(error = %e, "Country detection failed");
                HOME_COUNTRY
            }
        }
    }

    async fn fetch_country(&self, ip: Option<IpAddr>) -> Result<Option<CountryCode>, GeolocationError> {
        // Without a client address ipapi would locate this server instead.
        let Some(ip) = ip.filter(is_public) else {
            return Ok(None);
        };

        let url = format!("{IPAPI_BASE_URL}/{ip}/json/");
        let response = self.inner.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(GeolocationError::Status(response.status().as_u16()));
        }
        let body: IpApiResponse = response.json().await?;
        Ok(body.country_code.and_then(|c| c.parse().ok()))
    }
}

/// Loopback and private addresses cannot be geolocated.
fn is_public(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => !(v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()),
        IpAddr::V6(v6) => !(v6.is_loopback() || v6.is_unspecified()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_nominatim_city_fallbacks() {
        let response: NominatimResponse = serde_json::from_str(
            r#"{"address": {"village": "Teahupoo", "country": "Polynésie française",
                "country_code": "pf", "region": "Îles du Vent"}}"#,
        )
        .unwrap();
        let result = ReverseGeocode::from(response);

        assert_eq!(result.city.as_deref(), Some("Teahupoo"));
        assert_eq!(result.country.as_deref(), Some("Polynésie française"));
        assert_eq!(result.country_code, Some(CountryCode::PF));
        assert_eq!(result.region.as_deref(), Some("Îles du Vent"));
    }

    #[test]
    fn test_nominatim_prefers_city_and_state() {
        let response: NominatimResponse = serde_json::from_str(
            r#"{"address": {"city": "Lyon", "town": "Villeurbanne", "state": "Auvergne-Rhône-Alpes",
                "region": "France métropolitaine", "country_code": "fr"}}"#,
        )
        .unwrap();
        let result = ReverseGeocode::from(response);
        assert_eq!(result.city.as_deref(), Some("Lyon"));
        assert_eq!(result.region.as_deref(), Some("Auvergne-Rhône-Alpes"));
    }

    #[test]
    fn test_nominatim_without_address() {
        let response: NominatimResponse =
            serde_json::from_str(r#"{"error": "Unable to geocode"}"#).unwrap();
        assert_eq!(ReverseGeocode::from(response), ReverseGeocode::default());
    }

    #[test]
    fn test_private_addresses_are_not_looked_up() {
        assert!(!is_public(&"127.0.0.1".parse().unwrap()));
        assert!(!is_public(&"10.1.2.3".parse().unwrap()));
        assert!(!is_public(&"::1".parse().unwrap()));
        assert!(is_public(&"202.3.224.10".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_invalid_coordinates_degrade_to_empty() {
        let client = GeolocationClient::new();
        assert_eq!(client.reverse_geocode(123.0, 0.0).await, ReverseGeocode::default());
    }

    #[tokio::test]
    async fn test_unknown_visitor_defaults_home() {
        let client = GeolocationClient::new();
        assert_eq!(client.detect_country(None).await, HOME_COUNTRY);
        assert_eq!(client.detect_country(Some("192.168.1.20".parse().unwrap())).await, HOME_COUNTRY);
    }
}

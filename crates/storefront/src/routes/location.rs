//! Location helpers used to prefill the shipping destination.

use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use oceane_core::CountryCode;
use oceane_core::shipping::{ZoneKey, is_local_free_delivery};

use crate::middleware::client_ip;
use crate::services::geolocation::ReverseGeocode;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseResponse {
    #[serde(flatten)]
    pub place: ReverseGeocode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<ZoneKey>,
    pub local_free_delivery: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryResponse {
    pub country_code: CountryCode,
    pub zone: ZoneKey,
}

/// City and country for browser coordinates. Lookup failures give an empty
/// place rather than an error.
#[instrument(skip(state))]
pub async fn reverse(
    State(state): State<AppState>,
    Query(coords): Query<Coordinates>,
) -> Json<ReverseResponse> {
    let place = state.geolocation().reverse_geocode(coords.lat, coords.lon).await;

    let zone = match place.country_code {
        Some(code) => Some(state.zones().read().await.resolve(code.as_str())),
        None => None,
    };
    let local_free_delivery = place
        .country_code
        .is_some_and(|code| is_local_free_delivery(code, place.city.as_deref()));

    Json(ReverseResponse {
        place,
        zone,
        local_free_delivery,
    })
}

/// The visitor's country from the proxy-reported client address.
#[instrument(skip_all)]
pub async fn country(State(state): State<AppState>, headers: HeaderMap) -> Json<CountryResponse> {
    let country_code = state.geolocation().detect_country(client_ip(&headers)).await;
    let zone = state.zones().read().await.resolve(country_code.as_str());
    Json(CountryResponse { country_code, zone })
}

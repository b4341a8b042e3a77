//! Shipping API handlers: quotes and the zone editor.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use oceane_core::shipping::{Destination, ShippingOptions, ShippingZone, ZoneKey, ZoneTable, ZoneUpdate};
use oceane_core::{CountryCode, Money};

use crate::db::ShippingZoneRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QuoteParams {
    pub country: String,
    #[serde(default)]
    pub city: Option<String>,
    /// Cart subtotal in minor units.
    #[serde(default)]
    pub subtotal: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    #[serde(flatten)]
    pub options: ShippingOptions,
    pub zone_name: String,
    /// Flat estimate for a default-weight parcel from the zone table.
    pub estimate: Money,
    pub estimated_days: String,
}

/// Carrier options for a destination, without touching the cart.
#[instrument(skip_all, fields(country = %params.country))]
pub async fn quote(
    State(state): State<AppState>,
    Query(params): Query<QuoteParams>,
) -> Result<Json<QuoteResponse>> {
    let country =
        CountryCode::parse(&params.country).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let subtotal = Money::from_minor(params.subtotal.unwrap_or(0));
    if subtotal.is_negative() {
        return Err(AppError::BadRequest("subtotal cannot be negative".to_owned()));
    }

    let destination = Destination::new(country, params.city);
    let options = state.rates().options(&destination, subtotal);

    let zones = state.zones().read().await;
    let zone = zones
        .zone(options.zone)
        .ok_or_else(|| AppError::Internal(format!("zone {} missing from table", options.zone)))?;

    Ok(Json(QuoteResponse {
        zone_name: zone.name.clone(),
        estimate: zone.estimate(ShippingZone::DEFAULT_WEIGHT_GRAMS),
        estimated_days: zone.estimated_days.clone(),
        options,
    }))
}

/// The current zone table.
pub async fn zones(State(state): State<AppState>) -> Json<Vec<ShippingZone>> {
    Json(state.zones().read().await.zones().to_vec())
}

/// Edit one zone's costs or delivery window. Persisted before it takes effect.
#[instrument(skip_all, fields(zone = %key))]
pub async fn update_zone(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(update): Json<ZoneUpdate>,
) -> Result<Json<ShippingZone>> {
    let key: ZoneKey = key.parse().map_err(AppError::NotFound)?;
    let pool = state
        .pool()
        .ok_or_else(|| AppError::Configuration("database is not configured".to_owned()))?;

    let mut zones = state.zones().write().await;
    let mut edited = zones.clone();
    let zone = edited
        .update(key, update)
        .map_err(|e| AppError::BadRequest(e.to_string()))?
        .clone();

    ShippingZoneRepository::new(pool).save(&zone).await?;
    *zones = edited;

    info!(base_cost = %zone.base_cost, per_kg_cost = %zone.per_kg_cost, "Shipping zone updated");
    Ok(Json(zone))
}

/// Drop every stored override and go back to the default zones.
#[instrument(skip_all)]
pub async fn reset_zones(
    _admin: RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<ShippingZone>>> {
    let pool = state
        .pool()
        .ok_or_else(|| AppError::Configuration("database is not configured".to_owned()))?;

    let mut zones = state.zones().write().await;
    let removed = ShippingZoneRepository::new(pool).reset().await?;
    *zones = ZoneTable::defaults();

    info!(removed, "Shipping zones reset to defaults");
    Ok(Json(zones.zones().to_vec()))
}

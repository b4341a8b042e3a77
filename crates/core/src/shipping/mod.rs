//! Shipping: zone resolution and carrier pricing.
//!
//! - [`zone`] - Country to zone resolution and the editable zone table
//! - [`locality`] - Destinations and the home-zone free delivery allow-list
//! - [`carrier`] - Carrier catalog with per-zone rates and delivery windows
//! - [`surcharge`] - City surcharges used by the threshold policy
//! - [`rates`] - The rate engine and shipping selection

pub mod carrier;
pub mod locality;
pub mod rates;
pub mod surcharge;
pub mod zone;

pub use carrier::{Carrier, CarrierScope, LOCAL_CARRIER_ID, ZoneService, default_carriers};
pub use locality::{Destination, HOME_COUNTRY, is_local_free_delivery};
pub use rates::{
    CarrierOption, Quote, RateEngine, RateError, RatePolicy, ShippingOptions, ShippingSelection,
};
pub use surcharge::city_surcharge;
pub use zone::{ShippingZone, ZoneKey, ZoneRates, ZoneTable, ZoneTableError, ZoneUpdate, resolve_zone};

//! Order payload carried in payment intent metadata.
//!
//! Stripe metadata is a flat string map: at most 50 keys, values at most 500
//! characters. The webhook rebuilds the order from this payload, so the
//! encoding must round-trip. An `items` value that would exceed the value
//! limit is split across `items_0..items_n` with `items_chunks = n + 1`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use oceane_core::{Money, ProductId};

use crate::models::order::{NewOrderItem, ShippingAddress};

/// Longest value Stripe accepts in a metadata entry.
pub const MAX_VALUE_CHARS: usize = 500;

/// Most keys Stripe accepts in one metadata map.
pub const MAX_KEYS: usize = 50;

pub mod keys {
    pub const ITEMS: &str = "items";
    pub const ITEMS_CHUNKS: &str = "items_chunks";
    pub const SUBTOTAL: &str = "subtotal";
    pub const SHIPPING_COST: &str = "shipping_cost";
    pub const CUSTOMER_EMAIL: &str = "customer_email";
    pub const CUSTOMER_NAME: &str = "customer_name";
    pub const USER_ID: &str = "user_id";
    pub const SHIPPING_ADDRESS: &str = "shipping_address";
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata value for {0} is longer than {MAX_VALUE_CHARS} characters")]
    ValueTooLong(&'static str),
    #[error("order payload needs more than {MAX_KEYS} metadata keys")]
    TooManyKeys,
    #[error("metadata entry {key} is invalid: {reason}")]
    Invalid { key: String, reason: String },
    #[error("metadata entry {0} is missing")]
    Missing(String),
}

/// One distinct product with its quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataItem {
    pub id: ProductId,
    pub name: String,
    /// Unit price in minor units.
    pub price: Money,
    pub quantity: u32,
}

impl From<&MetadataItem> for NewOrderItem {
    fn from(item: &MetadataItem) -> Self {
        Self {
            product_id: item.id.clone(),
            product_name: item.name.clone(),
            product_price: item.price,
            quantity: i32::try_from(item.quantity).unwrap_or(i32::MAX),
        }
    }
}

/// Everything the webhook needs to materialize an order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderMetadata {
    pub items: Vec<MetadataItem>,
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub user_id: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
}

impl OrderMetadata {
    /// Encode into a Stripe metadata map.
    ///
    /// # Errors
    ///
    /// Returns an error if a scalar value exceeds [`MAX_VALUE_CHARS`] or the
    /// items need more keys than Stripe allows.
    pub fn encode(&self) -> Result<BTreeMap<String, String>, MetadataError> {
        let mut map = BTreeMap::new();
        map.insert(keys::SUBTOTAL.to_owned(), self.subtotal.minor().to_string());
        map.insert(
            keys::SHIPPING_COST.to_owned(),
            self.shipping_cost.minor().to_string(),
        );

        let address = self
            .shipping_address
            .as_ref()
            .map(|a| to_json(keys::SHIPPING_ADDRESS, a))
            .transpose()?;
        let optional = [
            (keys::CUSTOMER_EMAIL, self.customer_email.clone()),
            (keys::CUSTOMER_NAME, self.customer_name.clone()),
            (keys::USER_ID, self.user_id.clone()),
            (keys::SHIPPING_ADDRESS, address),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                if value.chars().count() > MAX_VALUE_CHARS {
                    return Err(MetadataError::ValueTooLong(key));
                }
                map.insert(key.to_owned(), value);
            }
        }

        let items = to_json(keys::ITEMS, &self.items)?;
        if items.chars().count() <= MAX_VALUE_CHARS {
            map.insert(keys::ITEMS.to_owned(), items);
        } else {
            let chunks = split_chars(&items, MAX_VALUE_CHARS);
            if map.len() + chunks.len() + 1 > MAX_KEYS {
                return Err(MetadataError::TooManyKeys);
            }
            map.insert(keys::ITEMS_CHUNKS.to_owned(), chunks.len().to_string());
            for (i, chunk) in chunks.into_iter().enumerate() {
                map.insert(format!("{}_{i}", keys::ITEMS), chunk);
            }
        }

        Ok(map)
    }

    /// Decode a Stripe metadata map. Missing amounts read as zero and a
    /// missing item list as empty; blank optional values read as absent.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry is present but cannot be parsed, or an
    /// announced item chunk is missing.
    pub fn decode(map: &BTreeMap<String, String>) -> Result<Self, MetadataError> {
        let items_json = match map.get(keys::ITEMS_CHUNKS) {
            Some(count) => {
                let count: usize = count.parse().map_err(|_| MetadataError::Invalid {
                    key: keys::ITEMS_CHUNKS.to_owned(),
                    reason: format!("not a count: {count:?}"),
                })?;
                let mut joined = String::new();
                for i in 0..count {
                    let key = format!("{}_{i}", keys::ITEMS);
                    joined.push_str(map.get(&key).ok_or(MetadataError::Missing(key))?);
                }
                Some(joined)
            }
            None => map.get(keys::ITEMS).cloned(),
        };

        let items = items_json
            .map(|json| {
                serde_json::from_str(&json).map_err(|e| MetadataError::Invalid {
                    key: keys::ITEMS.to_owned(),
                    reason: e.to_string(),
                })
            })
            .transpose()?
            .unwrap_or_default();

        let shipping_address = non_blank(map, keys::SHIPPING_ADDRESS)
            .map(|json| {
                serde_json::from_str(&json).map_err(|e| MetadataError::Invalid {
                    key: keys::SHIPPING_ADDRESS.to_owned(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            items,
            subtotal: amount(map, keys::SUBTOTAL)?,
            shipping_cost: amount(map, keys::SHIPPING_COST)?,
            customer_email: non_blank(map, keys::CUSTOMER_EMAIL),
            customer_name: non_blank(map, keys::CUSTOMER_NAME),
            user_id: non_blank(map, keys::USER_ID),
            shipping_address,
        })
    }
}

fn to_json<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<String, MetadataError> {
    serde_json::to_string(value).map_err(|e| MetadataError::Invalid {
        key: key.to_owned(),
        reason: e.to_string(),
    })
}

fn non_blank(map: &BTreeMap<String, String>, key: &str) -> Option<String> {
    map.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

fn amount(map: &BTreeMap<String, String>, key: &str) -> Result<Money, MetadataError> {
    match non_blank(map, key) {
        None => Ok(Money::ZERO),
        Some(raw) => raw
            .parse::<i64>()
            .map(Money::from_minor)
            .map_err(|_| MetadataError::Invalid {
                key: key.to_owned(),
                reason: format!("not an amount: {raw:?}"),
            }),
    }
}

/// Split on character boundaries into pieces of at most `max` characters.
fn split_chars(s: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    chars
        .chunks(max.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

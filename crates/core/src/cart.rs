//! Cart aggregation.
//!
//! A [`Cart`] is a plain state container: the storefront loads it from the
//! session, mutates it, and saves it back. It holds one line per unit added
//! (adding the same product twice yields two lines) and the current
//! [`ShippingSelection`].
//!
//! Every mutation that changes the subtotal or destination re-resolves the
//! shipping selection through the [`RateEngine`], keeping the previously
//! chosen carrier when it is still offered and dropping the selection
//! otherwise. [`Cart::checkout_amounts`] refuses to hand out amounts unless
//! the selection matches the current destination and subtotal.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shipping::{Destination, RateEngine, RateError, ShippingOptions, ShippingSelection};
use crate::types::{Money, ProductId};

/// One unit of a product in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CartError {
    #[error("cart line {0} does not exist")]
    NoSuchLine(usize),
    #[error("invalid cart line: {0}")]
    InvalidLine(&'static str),
    #[error("cart is empty")]
    Empty,
    #[error("no shipping destination set")]
    NoDestination,
    #[error("shipping has not been selected")]
    ShippingNotSelected,
    #[error("shipping must be re-selected for the current cart")]
    StaleShipping,
    #[error(transparent)]
    Rate(#[from] RateError),
}

/// Amounts handed to payment intent creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutAmounts {
    pub subtotal: Money,
    pub shipping: Money,
    pub total: Money,
    pub carrier_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
    destination: Option<Destination>,
    selection: Option<ShippingSelection>,
}

impl Cart {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn subtotal(&self) -> Money {
        self.lines.iter().map(|l| l.unit_price).sum()
    }

    #[must_use]
    pub const fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    /// Append one unit.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidLine`] for a blank id or name or a
    /// negative price.
    pub fn add(&mut self, line: CartLine, engine: &RateEngine) -> Result<(), CartError> {
        if line.product_id.is_blank() {
            return Err(CartError::InvalidLine("product id is required"));
        }
        if line.name.trim().is_empty() {
            return Err(CartError::InvalidLine("product name is required"));
        }
        if line.unit_price.is_negative() {
            return Err(CartError::InvalidLine("price cannot be negative"));
        }
        self.lines.push(line);
        self.requote(engine);
        Ok(())
    }

    /// Remove the line at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::NoSuchLine`] if `index` is out of range.
    pub fn remove(&mut self, index: usize, engine: &RateEngine) -> Result<CartLine, CartError> {
        if index >= self.lines.len() {
            return Err(CartError::NoSuchLine(index));
        }
        let line = self.lines.remove(index);
        self.requote(engine);
        Ok(line)
    }

    /// Empty the cart after a successful payment. The destination is kept.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.selection = None;
    }

    pub fn set_destination(&mut self, destination: Destination, engine: &RateEngine) {
        if self.destination.as_ref() != Some(&destination) {
            self.destination = Some(destination);
            self.requote(engine);
        }
    }

    /// Carriers and prices for the current destination and subtotal.
    #[must_use]
    pub fn shipping_options(&self, engine: &RateEngine) -> Option<ShippingOptions> {
        self.destination
            .as_ref()
            .map(|d| engine.options(d, self.subtotal()))
    }

    /// Choose a carrier (or none, for free local delivery).
    ///
    /// # Errors
    ///
    /// Returns an error without a destination, or if the engine rejects the
    /// choice.
    pub fn select_shipping(
        &mut self,
        carrier_id: Option<&str>,
        engine: &RateEngine,
    ) -> Result<&ShippingSelection, CartError> {
        let destination = self.destination.as_ref().ok_or(CartError::NoDestination)?;
        let selection = engine.select(destination, self.subtotal(), carrier_id)?;
        Ok(self.selection.insert(selection))
    }

    /// The selection, if it matches the current destination and subtotal.
    #[must_use]
    pub fn selection(&self) -> Option<&ShippingSelection> {
        let destination = self.destination.as_ref()?;
        self.selection
            .as_ref()
            .filter(|s| s.is_current_for(destination, self.subtotal()))
    }

    /// Shipping cost of the current selection, zero when none is selected.
    #[must_use]
    pub fn shipping_cost(&self) -> Money {
        self.selection().map_or(Money::ZERO, |s| s.cost)
    }

    #[must_use]
    pub fn total(&self) -> Money {
        self.subtotal() + self.shipping_cost()
    }

    #[must_use]
    pub fn is_ready_for_payment(&self) -> bool {
        self.checkout_amounts().is_ok()
    }

    /// Amounts for payment, gated on a non-stale shipping selection.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart is empty, has no destination, or its
    /// shipping selection is missing or was computed for other inputs.
    pub fn checkout_amounts(&self) -> Result<CheckoutAmounts, CartError> {
        if self.lines.is_empty() {
            return Err(CartError::Empty);
        }
        let destination = self.destination.as_ref().ok_or(CartError::NoDestination)?;
        let selection = self.selection.as_ref().ok_or(CartError::ShippingNotSelected)?;
        let subtotal = self.subtotal();
        if !selection.is_current_for(destination, subtotal) {
            return Err(CartError::StaleShipping);
        }
        Ok(CheckoutAmounts {
            subtotal,
            shipping: selection.cost,
            total: subtotal + selection.cost,
            carrier_id: selection.carrier_id.clone(),
        })
    }

    fn requote(&mut self, engine: &RateEngine) {
        let Some(destination) = self.destination.as_ref() else {
            self.selection = None;
            return;
        };
        let subtotal = self.subtotal();

        if destination.is_local_free_delivery() {
            self.selection = engine.select(destination, subtotal, None).ok();
            return;
        }

        self.selection = self
            .selection
            .take()
            .and_then(|prev| prev.carrier_id)
            .and_then(|id| engine.select(destination, subtotal, Some(&id)).ok());
    }
}

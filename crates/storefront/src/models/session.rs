//! Session-related types.
//!
//! The cart and the checkout flow live in the `tower-sessions` store and are
//! loaded and saved explicitly by the handlers that change them.

/// Session keys for cart and checkout state.
pub mod keys {
    /// Key for the serialized [`oceane_core::cart::Cart`].
    pub const CART: &str = "cart";

    /// Key for the serialized checkout driver state.
    pub const CHECKOUT: &str = "checkout";
}

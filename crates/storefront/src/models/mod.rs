//! Domain models for storefront.

pub mod order;
pub mod session;

pub use order::{NewOrder, NewOrderItem, Order, OrderItem, OrderWithItems, ShippingAddress};
pub use session::keys as session_keys;

//! Session middleware configuration and session-held state.
//!
//! Sessions are `PostgreSQL`-backed in production. The cart and the checkout
//! flow are loaded and saved explicitly by the handlers that change them.

use tower_sessions::{Expiry, Session, SessionManagerLayer, SessionStore};

use oceane_core::cart::Cart;

use crate::config::StorefrontConfig;
use crate::models::session_keys;
use crate::services::checkout::CheckoutSession;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "oceane_session";

/// Session expiry time in seconds (7 days).
const SESSION_EXPIRY_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Create the session layer over `store`.
///
/// The cookie is only marked secure when the storefront is served over HTTPS.
#[must_use]
pub fn create_session_layer<S: SessionStore + Clone>(
    store: S,
    config: &StorefrontConfig,
) -> SessionManagerLayer<S> {
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(config.is_secure())
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

/// Load the cart, or an empty one for a new session.
///
/// # Errors
///
/// Returns an error if the session store fails or the stored cart is unreadable.
pub async fn load_cart(session: &Session) -> Result<Cart, tower_sessions::session::Error> {
    Ok(session.get(session_keys::CART).await?.unwrap_or_default())
}

/// Persist the cart.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn save_cart(session: &Session, cart: &Cart) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::CART, cart).await
}

/// Load the checkout in progress, if any.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn load_checkout(
    session: &Session,
) -> Result<Option<CheckoutSession>, tower_sessions::session::Error> {
    session.get(session_keys::CHECKOUT).await
}

/// Persist the checkout.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn save_checkout(
    session: &Session,
    checkout: &CheckoutSession,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::CHECKOUT, checkout).await
}

/// Forget the checkout.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_checkout(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CheckoutSession>(session_keys::CHECKOUT)
        .await
        .map(|_| ())
}

/// Flush to the store now rather than when the response is sent, so a
/// concurrent request sees the in-flight state.
///
/// # Errors
///
/// Returns an error if the store rejects the write.
pub async fn flush(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.save().await
}

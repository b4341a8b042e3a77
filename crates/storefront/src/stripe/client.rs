//! Stripe REST API client.
//!
//! Stripe takes form-encoded bodies and answers with JSON. Intent creation
//! authenticates with the secret key; confirmation uses the publishable key
//! plus the intent's client secret, the same credentials the payment form has.
//! Reading an intent back uses those same browser-side credentials.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument, warn};

use super::error::StripeError;
use super::types::{ApiErrorBody, ConfirmPayment, CreateIntent, PaymentIntent};
use crate::config::StripeConfig;

/// Stripe API base URL.
const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Upper bound on a single Stripe round trip. Kept well under
/// [`oceane_core::checkout::CONFIRMATION_TIMEOUT_SECS`].
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Payment processor boundary used by checkout.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent.
    async fn create_intent(&self, params: &CreateIntent) -> Result<PaymentIntent, StripeError>;

    /// Confirm the intent behind `client_secret` with a payment method.
    async fn confirm_payment(
        &self,
        client_secret: &str,
        params: &ConfirmPayment,
    ) -> Result<PaymentIntent, StripeError>;

    /// Read back the current state of the intent behind `client_secret`.
    async fn retrieve_intent(&self, client_secret: &str) -> Result<PaymentIntent, StripeError>;
}

/// Extract the payment intent id from a client secret (`pi_..._secret_...`).
///
/// # Errors
///
/// Returns [`StripeError::InvalidClientSecret`] if the secret has no intent id.
pub fn intent_id_from_client_secret(client_secret: &str) -> Result<&str, StripeError> {
    client_secret
        .split_once("_secret_")
        .map(|(id, _)| id)
        .filter(|id| id.starts_with("pi_"))
        .ok_or(StripeError::InvalidClientSecret)
}

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: Option<SecretString>,
    publishable_key: Option<String>,
    base_url: String,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("secret_key", &"[REDACTED]")
            .field("publishable_key", &self.publishable_key)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl StripeClient {
    /// Create a new Stripe client.
    ///
    /// # Errors
    ///
    /// Returns error if the API version is not a valid header value or the
    /// HTTP client fails to build.
    pub fn new(config: &StripeConfig) -> Result<Self, StripeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Stripe-Version",
            HeaderValue::from_str(&config.api_version)
                .map_err(|e| StripeError::Request(format!("invalid API version: {e}")))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StripeError::Request(e.to_string()))?;

        Ok(Self {
            client,
            secret_key: config.secret_key.clone(),
            publishable_key: config.publishable_key.clone(),
            base_url: STRIPE_API_BASE.to_owned(),
        })
    }

    /// Point the client at another API root (stripe-mock, tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn publishable_key(&self) -> Result<&str, StripeError> {
        self.publishable_key
            .as_deref()
            .ok_or(StripeError::NotConfigured("STRIPE_PUBLISHABLE_KEY"))
    }

    async fn post_form(
        &self,
        path: &str,
        bearer: &str,
        form: &[(String, String)],
    ) -> Result<PaymentIntent, StripeError> {
        let request = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(bearer)
            .form(form);
        Self::send(request).await
    }

    async fn send(request: RequestBuilder) -> Result<PaymentIntent, StripeError> {
        let response = request
            .send()
            .await
            .map_err(|e| StripeError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StripeError::Response(e.to_string()))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ApiErrorBody>(&body).ok().map(|b| b.error);
            let err = StripeError::Api {
                status: status.as_u16(),
                code: detail.as_ref().and_then(|d| d.code.clone()),
                message: detail
                    .and_then(|d| d.message)
                    .unwrap_or_else(|| format!("Stripe returned HTTP {status}")),
            };
            warn!(status = status.as_u16(), error = %err, "Stripe API error");
            return Err(err);
        }

        serde_json::from_str(&body).map_err(|e| StripeError::Response(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    #[instrument(skip(self, params), fields(amount = params.amount.minor(), currency = %params.currency))]
    async fn create_intent(&self, params: &CreateIntent) -> Result<PaymentIntent, StripeError> {
        let key = self
            .secret_key
            .as_ref()
            .ok_or(StripeError::NotConfigured("STRIPE_SECRET_KEY"))?;

        let intent = self
            .post_form("/payment_intents", key.expose_secret(), &params.form_pairs())
            .await?;

        debug!(payment_intent_id = %intent.id, "PaymentIntent created");
        Ok(intent)
    }

    #[instrument(skip_all)]
    async fn confirm_payment(
        &self,
        client_secret: &str,
        params: &ConfirmPayment,
    ) -> Result<PaymentIntent, StripeError> {
        let key = self.publishable_key()?;
        let intent_id = intent_id_from_client_secret(client_secret)?;

        let mut form = vec![
            ("client_secret".to_owned(), client_secret.to_owned()),
            ("payment_method".to_owned(), params.payment_method.clone()),
        ];
        if let Some(url) = &params.return_url {
            form.push(("return_url".to_owned(), url.clone()));
        }

        let intent = self
            .post_form(&format!("/payment_intents/{intent_id}/confirm"), key, &form)
            .await?;

        debug!(payment_intent_id = %intent.id, status = %intent.status, "PaymentIntent confirmed");
        Ok(intent)
    }

    #[instrument(skip_all)]
    async fn retrieve_intent(&self, client_secret: &str) -> Result<PaymentIntent, StripeError> {
        let key = self.publishable_key()?;
        let intent_id = intent_id_from_client_secret(client_secret)?;

        let request = self
            .client
            .get(format!("{}/payment_intents/{intent_id}", self.base_url))
            .bearer_auth(key)
            .query(&[("client_secret", client_secret)]);
        let intent = Self::send(request).await?;

        debug!(payment_intent_id = %intent.id, status = %intent.status, "PaymentIntent retrieved");
        Ok(intent)
    }
}

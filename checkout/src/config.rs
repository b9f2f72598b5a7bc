//! Configuration for the checkout surface.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Checkout configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Backend base URL; `/api` is appended by the transport
    pub api_base: String,
    /// Origin of the application, used to build the return URL
    pub app_origin: String,
    /// Landing route the gateway redirects back to
    pub return_path: String,
    /// Provider preselected in the checkout surface
    pub payment_provider: String,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:5000".to_string(),
            app_origin: "http://localhost:5173".to_string(),
            return_path: "/payment/result".to_string(),
            payment_provider: "VNPay".to_string(),
            request_timeout_secs: 20,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: env::var("CINEPAY_API_BASE").unwrap_or(defaults.api_base),
            app_origin: env::var("CINEPAY_APP_ORIGIN").unwrap_or(defaults.app_origin),
            return_path: env::var("CINEPAY_RETURN_PATH").unwrap_or(defaults.return_path),
            payment_provider: env::var("CINEPAY_PAYMENT_PROVIDER").unwrap_or(defaults.payment_provider),
            request_timeout_secs: env::var("CINEPAY_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.request_timeout_secs),
        }
    }

    /// Read `.env` (if present) into the process environment, then [`from_env`](Self::from_env)
    #[must_use]
    pub fn load() -> Self {
        if let Err(error) = dotenvy::dotenv() {
            tracing::debug!(%error, "No .env file loaded");
        }
        Self::from_env()
    }

    /// HTTP request timeout
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Where the gateway sends the user back: `{origin}{return_path}?order={reference}`
    #[must_use]
    pub fn return_url(&self, order_reference: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(order_reference.as_bytes()).collect();
        format!(
            "{}{}?order={encoded}",
            self.app_origin.trim_end_matches('/'),
            self.return_path
        )
    }
}

//! Configuration for payment result delivery.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Payment result configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultConfig {
    /// Origin of the application; direct posts from other origins are dropped
    pub app_origin: String,
    /// Landing route the gateway redirects back to
    pub return_path: String,
    /// How long the result banner stays up, in milliseconds
    pub banner_ms: u64,
    /// Durable-store key holding the pending result
    pub storage_key: String,
    /// Broadcast topic for results
    pub topic: String,
}

impl Default for ResultConfig {
    fn default() -> Self {
        Self {
            app_origin: "http://localhost:5173".to_string(),
            return_path: "/payment/result".to_string(),
            banner_ms: 6000,
            storage_key: "payment_result".to_string(),
            topic: "payment-result".to_string(),
        }
    }
}

impl ResultConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            app_origin: env::var("CINEPAY_APP_ORIGIN").unwrap_or(defaults.app_origin),
            return_path: env::var("CINEPAY_RETURN_PATH").unwrap_or(defaults.return_path),
            banner_ms: env::var("CINEPAY_BANNER_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.banner_ms),
            storage_key: env::var("CINEPAY_RESULT_STORAGE_KEY").unwrap_or(defaults.storage_key),
            topic: env::var("CINEPAY_RESULT_TOPIC").unwrap_or(defaults.topic),
        }
    }

    /// Read `.env` (if present), then [`from_env`](Self::from_env)
    #[must_use]
    pub fn load() -> Self {
        if let Err(error) = dotenvy::dotenv() {
            tracing::debug!(%error, "No .env file loaded");
        }
        Self::from_env()
    }

    /// Banner auto-dismiss delay
    #[must_use]
    pub const fn banner_duration(&self) -> Duration {
        Duration::from_millis(self.banner_ms)
    }
}

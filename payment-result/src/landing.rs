//! Decoding the outcome from the gateway's redirect-back query string.
//!
//! Success has to be signalled explicitly: a query with no recognised
//! success token, including an empty one, is a failure.

use crate::event::{PaymentResultEvent, PaymentStatus};
use cinepay_core::environment::Clock;
use url::Url;

/// Values that mean success (compared trimmed and lower-cased)
pub const SUCCESS_TOKENS: &[&str] = &["0", "00", "success", "successful", "completed", "true"];

/// Parameters checked for a success token, in order
pub const STATUS_KEYS: &[&str] = &[
    "success",
    "status",
    "state",
    "result",
    "paymentStatus",
    "payment_status",
    "transactionStatus",
    "transaction_status",
    "code",
    "message",
    "vnp_ResponseCode",
    "vnp_TransactionStatus",
];

/// Parameters that may carry the order reference, in order
pub const ORDER_KEYS: &[&str] = &[
    "order",
    "orderCode",
    "orderId",
    "orderID",
    "order_id",
    "txnRef",
    "vnp_TxnRef",
    "transaction",
];

/// What a landing URL says about the payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandingOutcome {
    /// Decoded outcome
    pub status: PaymentStatus,
    /// Order reference, when present
    pub order_ref: Option<String>,
}

impl LandingOutcome {
    /// Decode a query string (with or without the leading `?`)
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
            .into_owned()
            .collect();
        // First value wins when a key repeats
        let get = |key: &str| pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());

        let success = STATUS_KEYS.iter().filter_map(|key| get(key)).any(|value| {
            let value = value.trim().to_lowercase();
            !value.is_empty() && SUCCESS_TOKENS.contains(&value.as_str())
        });

        let order_ref = ORDER_KEYS
            .iter()
            .filter_map(|key| get(key))
            .find(|value| !value.is_empty())
            .map(str::to_string);

        Self {
            status: if success {
                PaymentStatus::Success
            } else {
                PaymentStatus::Failure
            },
            order_ref,
        }
    }

    /// Decode the query of `url`
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        Self::from_query(url.query().unwrap_or_default())
    }

    /// The event to deliver for this outcome
    #[must_use]
    pub fn into_event(self, clock: &dyn Clock) -> PaymentResultEvent {
        PaymentResultEvent::new(self.status, self.order_ref, clock)
    }
}

/// The query of `location` when its path is the landing route
///
/// `location` is a path with an optional query (`/payment/result?order=CP-77`).
#[must_use]
pub fn landing_query<'a>(location: &'a str, return_path: &str) -> Option<&'a str> {
    let (path, query) = location.split_once('?').unwrap_or((location, ""));
    let normalize = |p: &str| p.trim_end_matches('/').to_string();
    (normalize(path) == normalize(return_path)).then_some(query)
}

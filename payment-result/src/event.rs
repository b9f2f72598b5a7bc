//! The payment result event every delivery path carries.

use cinepay_core::environment::Clock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// The gateway reported success
    Success,
    /// Anything else
    Failure,
}

impl PaymentStatus {
    /// Lower-case wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message tag; payloads with any other `type` are not payment results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// `"payment_result"`
    #[default]
    #[serde(rename = "payment_result")]
    PaymentResult,
}

/// A payment outcome, as raised by the context the gateway returned to
///
/// Serialized as
/// `{"type":"payment_result","status":"success","orderRef":"CP-77","timestamp":1735689600000,"id":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResultEvent {
    /// Always [`EventKind::PaymentResult`]
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Outcome
    pub status: PaymentStatus,
    /// Order the payment was for, when the gateway said
    #[serde(default)]
    pub order_ref: Option<String>,
    /// Unix milliseconds when the event was raised
    pub timestamp: i64,
    /// Deduplication id
    #[serde(default)]
    pub id: Option<String>,
}

impl PaymentResultEvent {
    /// A new event stamped by `clock`, with a fresh `{millis}-{hex}` id
    #[must_use]
    pub fn new(status: PaymentStatus, order_ref: Option<String>, clock: &dyn Clock) -> Self {
        let timestamp = clock.now_millis();
        let nonce: u64 = rand::thread_rng().r#gen();
        Self {
            kind: EventKind::PaymentResult,
            status,
            order_ref,
            timestamp,
            id: Some(format!("{timestamp}-{nonce:x}")),
        }
    }

    /// Key two deliveries of the same event share: the id, else `status:timestamp`
    #[must_use]
    pub fn dedup_key(&self) -> String {
        match self.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("{}:{}", self.status, self.timestamp),
        }
    }

    /// JSON form written to the durable store
    ///
    /// # Errors
    ///
    /// Returns the serializer error (not expected for this type).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a stored or posted payload
    ///
    /// # Errors
    ///
    /// Returns the parse error for malformed JSON or a payload of another `type`.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinepay_testing::test_clock;

    #[test]
    fn fresh_ids_differ_and_carry_the_timestamp() {
        let clock = test_clock();
        let a = PaymentResultEvent::new(PaymentStatus::Success, None, &clock);
        let b = PaymentResultEvent::new(PaymentStatus::Success, None, &clock);

        assert_ne!(a.id, b.id);
        assert!(a.dedup_key().starts_with("1735689600000-"));
    }

    #[test]
    fn dedup_key_falls_back_to_status_and_timestamp() {
        let mut event = PaymentResultEvent::new(PaymentStatus::Failure, None, &test_clock());
        event.id = Some("  ".into());
        assert_eq!(event.dedup_key(), "failure:1735689600000");

        event.id = None;
        assert_eq!(event.dedup_key(), "failure:1735689600000");
    }

    #[test]
    fn wire_format() {
        let json = r#"{"type":"payment_result","status":"success","orderRef":"CP-77","timestamp":5,"id":"5-ab"}"#;
        let event = PaymentResultEvent::from_json(json).unwrap_or_else(|e| unreachable!("{e}"));

        assert_eq!(event.status, PaymentStatus::Success);
        assert_eq!(event.order_ref.as_deref(), Some("CP-77"));
        assert_eq!(event.dedup_key(), "5-ab");
    }

    #[test]
    fn other_message_types_are_rejected() {
        assert!(PaymentResultEvent::from_json(r#"{"type":"chat","status":"success","timestamp":5}"#).is_err());
    }
}

//! Promotion code validation and the active promotion list

use crate::error::ApiError;
use crate::extract::{ResourceId, amount, sanitize_amount};
use crate::transport::{ApiRequest, Transport, send_cancellable};
use cinepay_core::CancellationToken;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

/// Backend verdict on a promotion code for a given amount
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionDecision {
    /// Whether the code applies
    pub is_valid: bool,
    /// Discount offered (0 when invalid); clamp to the subtotal before use
    pub discount_amount: u64,
    /// Promotion backing the code
    pub promotion_id: Option<ResourceId>,
    /// Why the code was rejected
    pub error_message: Option<String>,
}

impl PromotionDecision {
    /// Decode the validation response
    #[must_use]
    pub fn from_response(body: &Value) -> Self {
        let is_valid = match body.get("isValid").or_else(|| body.get("valid")) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        };

        let discount_amount = if is_valid {
            body.get("discountAmount")
                .or_else(|| body.get("discount"))
                .and_then(amount)
                .unwrap_or(0)
        } else {
            0
        };

        let error_message = ["errorMessage", "message"]
            .iter()
            .filter_map(|k| body.get(k).and_then(Value::as_str))
            .map(str::trim)
            .find(|m| !m.is_empty())
            .map(str::to_string);

        Self {
            is_valid,
            discount_amount,
            promotion_id: body.get("promotionId").and_then(ResourceId::from_value),
            error_message: if is_valid { None } else { error_message },
        }
    }

    /// The discount actually applicable to `subtotal`
    #[must_use]
    pub fn applied_discount(&self, subtotal: u64) -> u64 {
        if self.is_valid {
            self.discount_amount.min(subtotal)
        } else {
            0
        }
    }
}

/// An order amount as the caller has it
#[derive(Debug, Clone, PartialEq)]
pub enum AmountInput {
    /// Already numeric
    Number(f64),
    /// User- or display-formatted text (`"200,000 ₫"`)
    Text(String),
}

impl AmountInput {
    /// Finite, non-negative amount; anything else is 0
    #[must_use]
    pub fn sanitized(&self) -> f64 {
        match self {
            Self::Number(n) if n.is_finite() && *n >= 0.0 => *n,
            Self::Number(_) => 0.0,
            Self::Text(text) => sanitize_amount(text),
        }
    }
}

impl From<u64> for AmountInput {
    #[allow(clippy::cast_precision_loss)] // ticket totals are far below 2^52
    fn from(n: u64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<f64> for AmountInput {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for AmountInput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// A currently running promotion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Promotion {
    /// Backend id
    pub id: Option<ResourceId>,
    /// Code to enter
    pub code: String,
    /// Display name
    pub name: Option<String>,
}

impl Promotion {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_object()?;
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            id: value.get("id").and_then(ResourceId::from_value),
            code: text("code").unwrap_or_default(),
            name: text("name").or_else(|| text("title")).or_else(|| text("description")),
        })
    }
}

/// Validates promotion codes against the backend
#[derive(Clone)]
pub struct PromotionValidator {
    transport: Arc<dyn Transport>,
}

impl PromotionValidator {
    /// Create a validator over `transport`
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Validate `code` against `order_amount`
    ///
    /// Nothing is cached: every call re-validates against the amount given.
    ///
    /// # Errors
    ///
    /// - [`ApiError::Validation`] for an empty code or a non-positive amount (no request is made)
    /// - [`ApiError::Cancelled`] when `cancel` fires
    /// - Any backend error
    #[tracing::instrument(skip(self, order_amount, user_id, cancel))]
    pub async fn apply(
        &self,
        code: &str,
        order_amount: impl Into<AmountInput>,
        user_id: Option<&ResourceId>,
        cancel: &CancellationToken,
    ) -> Result<PromotionDecision, ApiError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ApiError::Validation("Enter a promotion code.".to_string()));
        }

        let order_amount = order_amount.into().sanitized();
        if order_amount <= 0.0 {
            return Err(ApiError::Validation(
                "Select seats before applying a promotion code.".to_string(),
            ));
        }

        let body = json!({
            "code": code,
            "orderAmount": order_amount,
            "userId": user_id.map(ResourceId::to_value),
        });

        let response =
            send_cancellable(self.transport.as_ref(), ApiRequest::post("/Promotion/validate", body), cancel).await?;

        let decision = PromotionDecision::from_response(&response.body);
        tracing::debug!(valid = decision.is_valid, discount = decision.discount_amount, "Promotion validated");
        Ok(decision)
    }

    /// Promotions currently running (`[...]` or `{items: [...]}`)
    ///
    /// # Errors
    ///
    /// Any backend error, or [`ApiError::Cancelled`].
    pub async fn active(&self, cancel: &CancellationToken) -> Result<Vec<Promotion>, ApiError> {
        let response = send_cancellable(self.transport.as_ref(), ApiRequest::get("/Promotion/active"), cancel).await?;

        let items = response
            .body
            .as_array()
            .or_else(|| response.body.get("items").and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or_default();

        Ok(items.iter().filter_map(Promotion::from_value).collect())
    }
}

impl std::fmt::Debug for PromotionValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromotionValidator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockTransport;
    use crate::transport::Method;
    use proptest::prelude::*;

    #[test]
    fn invalid_decision_carries_no_discount() {
        let decision = PromotionDecision::from_response(&json!({
            "isValid": false,
            "discountAmount": 5000,
            "errorMessage": "Code expired"
        }));
        assert_eq!(decision.discount_amount, 0);
        assert_eq!(decision.error_message.as_deref(), Some("Code expired"));
    }

    #[tokio::test]
    async fn empty_cart_is_rejected_locally() {
        let transport = Arc::new(MockTransport::new());
        let validator = PromotionValidator::new(transport.clone());

        let result = validator.apply("SALE10", 0_u64, None, &CancellationToken::new()).await;

        assert!(matches!(result, Err(ApiError::Validation(_))));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn amount_is_sanitized_before_submission() {
        let transport = Arc::new(MockTransport::new());
        transport.reply(
            Method::Post,
            "/Promotion/validate",
            200,
            json!({"isValid": true, "discountAmount": 20000, "promotionId": 4}),
        );
        let validator = PromotionValidator::new(transport.clone());

        let decision = validator
            .apply(" SALE10 ", "200,000 ₫", None, &CancellationToken::new())
            .await;

        assert_eq!(
            decision.ok(),
            Some(PromotionDecision {
                is_valid: true,
                discount_amount: 20_000,
                promotion_id: Some(ResourceId::Numeric(4)),
                error_message: None,
            })
        );
        let body = transport.calls()[0].body.clone().unwrap_or_default();
        assert_eq!(body["code"], "SALE10");
        assert_eq!(body["orderAmount"], 200_000.0);
        assert_eq!(body["userId"], Value::Null);
    }

    #[tokio::test]
    async fn active_accepts_items_envelope() {
        let transport = Arc::new(MockTransport::new());
        transport.reply(
            Method::Get,
            "/Promotion/active",
            200,
            json!({"items": [{"id": 1, "code": "SALE10", "name": "Ten off"}, "junk"]}),
        );
        let validator = PromotionValidator::new(transport);

        let promotions = validator.active(&CancellationToken::new()).await.unwrap_or_default();

        assert_eq!(promotions.len(), 1);
        assert_eq!(promotions[0].code, "SALE10");
    }

    proptest! {
        #[test]
        fn applied_discount_never_exceeds_subtotal(subtotal in 0_u64..10_000_000, discount in 0_u64..u64::MAX) {
            let decision = PromotionDecision { is_valid: true, discount_amount: discount, ..PromotionDecision::default() };
            let applied = decision.applied_discount(subtotal);
            prop_assert!(applied <= subtotal);
            prop_assert!(subtotal - applied <= subtotal);
        }
    }
}

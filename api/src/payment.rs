//! Payment sessions and redirectable payment URLs.

use crate::error::ApiError;
use crate::extract::{self, ResourceId, Strategy};
use crate::fallback::{Attempted, candidates, first_success, route_missing, route_missing_or_unusable};
use crate::transport::{ApiRequest, Transport, send_cancellable};
use cinepay_core::CancellationToken;
use serde_json::{Value, json};
use std::sync::Arc;
use url::Url;

/// Session creation routes, most likely first
pub const CREATE_ENDPOINTS: &[&str] = &["/Payment", "/Payments", "/Payment/create", "/Payments/create"];

/// URL resolution routes for a payment id, most likely first
#[must_use]
pub fn url_endpoints(payment_id: &ResourceId) -> [String; 4] {
    [
        format!("/Payment/{payment_id}/payment-url"),
        format!("/Payments/{payment_id}/payment-url"),
        format!("/Payment/payment-url/{payment_id}"),
        format!("/Payments/payment-url/{payment_id}"),
    ]
}

const PAYMENT_ID: &[Strategy] = &[
    Strategy::Root,
    Strategy::Field("id"),
    Strategy::Field("paymentId"),
    Strategy::Field("paymentID"),
    Strategy::Field("transactionId"),
    Strategy::Field("result"),
    Strategy::Field("value"),
    Strategy::Field("data"),
];

const PAYMENT_URL: &[Strategy] = &[
    Strategy::Root,
    Strategy::Field("paymentUrl"),
    Strategy::Field("url"),
    Strategy::Field("redirectUrl"),
    Strategy::Field("data"),
    Strategy::Path(&["data", "paymentUrl"]),
];

/// Provider used when none is chosen
pub const DEFAULT_PROVIDER: &str = "VNPay";

/// Everything needed to open a payment session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    /// Order being paid
    pub order_id: ResourceId,
    /// Payment provider
    pub provider: String,
    /// Where the gateway redirects afterwards
    pub return_url: Option<String>,
    /// Amount to charge
    pub amount: u64,
}

impl SessionRequest {
    /// Request body, with each value under every key variant the backend may read
    #[must_use]
    pub fn body(&self) -> Value {
        let order_id = self.order_id.to_value();
        let provider = if self.provider.trim().is_empty() {
            DEFAULT_PROVIDER
        } else {
            self.provider.as_str()
        };

        json!({
            "orderId": order_id,
            "OrderId": order_id,
            "orderID": order_id,
            "OrderID": order_id,
            "provider": provider,
            "Provider": provider,
            "paymentProvider": provider,
            "paymentMethod": provider,
            "returnUrl": self.return_url,
            "ReturnUrl": self.return_url,
            "returnURL": self.return_url,
            "amount": self.amount,
            "totalAmount": self.amount,
            "finalAmount": self.amount,
            "orderAmount": self.amount,
        })
    }
}

/// A payment session tied to one order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    /// Identity used to (re-)resolve the payment URL
    pub payment_id: ResourceId,
    /// Route that created the session
    pub endpoint: String,
}

/// A resolved gateway URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentLink {
    /// Where to send the user
    pub url: Url,
    /// Route that resolved it
    pub endpoint: String,
}

impl PaymentLink {
    /// QR image for the link (scanned with a banking app)
    #[must_use]
    pub fn qr_image_url(&self) -> String {
        qr_image_url(self.url.as_str())
    }
}

/// QR image URL encoding `target`
#[must_use]
pub fn qr_image_url(target: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
    format!("https://api.qrserver.com/v1/create-qr-code/?size=320x320&data={encoded}")
}

/// An absolute http(s) URL from a string value
fn http_url(value: &Value) -> Option<Url> {
    let text = value.as_str()?.trim();
    let url = Url::parse(text).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// First URL-shaped field of a resolution response
#[must_use]
pub fn extract_payment_url(body: &Value) -> Option<Url> {
    extract::first(PAYMENT_URL, body, http_url)
}

/// Creates payment sessions and resolves their URLs
#[derive(Clone)]
pub struct PaymentSessionManager {
    transport: Arc<dyn Transport>,
}

impl PaymentSessionManager {
    /// Create a manager over `transport`
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Open a payment session for an order
    ///
    /// # Errors
    ///
    /// - [`ApiError::NoEndpointAvailable`] when every route is missing
    /// - [`ApiError::MalformedResponse`] when the response has no payment id
    /// - The first business error
    #[tracing::instrument(skip_all, fields(order = %request.order_id, provider = %request.provider))]
    pub async fn create_session(
        &self,
        request: &SessionRequest,
        cancel: &CancellationToken,
    ) -> Result<PaymentSession, ApiError> {
        let body = request.body();
        let transport = self.transport.as_ref();

        let Attempted { value, endpoint } = first_success(
            "payment",
            candidates(CREATE_ENDPOINTS),
            route_missing,
            |path| {
                let body = body.clone();
                async move { send_cancellable(transport, ApiRequest::post(path, body), cancel).await }
            },
        )
        .await?;

        let payment_id = extract::first(PAYMENT_ID, &value.body, ResourceId::from_value).ok_or_else(|| {
            ApiError::MalformedResponse("Could not determine the payment id from the response.".to_string())
        })?;

        tracing::info!(payment = %payment_id, endpoint = %endpoint, "Payment session created");
        Ok(PaymentSession { payment_id, endpoint })
    }

    /// Resolve the gateway URL for a payment
    ///
    /// A response without a usable http(s) URL moves on to the next route.
    ///
    /// # Errors
    ///
    /// - [`ApiError::MalformedResponse`] when routes answered but none carried a URL
    /// - [`ApiError::NoEndpointAvailable`] when every route is missing
    /// - The first business error
    #[tracing::instrument(skip(self, return_url, cancel), fields(payment = %payment_id))]
    pub async fn resolve_url(
        &self,
        payment_id: &ResourceId,
        return_url: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<PaymentLink, ApiError> {
        let transport = self.transport.as_ref();

        let Attempted { value: url, endpoint } = first_success(
            "payment url",
            url_endpoints(payment_id),
            route_missing_or_unusable,
            |path| {
                let mut request = ApiRequest::get(path);
                if let Some(return_url) = return_url {
                    request = request.with_query("returnUrl", return_url);
                }
                async move {
                    let response = send_cancellable(transport, request, cancel).await?;
                    extract_payment_url(&response.body).ok_or_else(|| {
                        ApiError::MalformedResponse("The server did not return a payment URL.".to_string())
                    })
                }
            },
        )
        .await?;

        Ok(PaymentLink { url, endpoint })
    }

    /// Re-resolve the URL of an existing session (no new session is created)
    ///
    /// # Errors
    ///
    /// Same as [`resolve_url`](Self::resolve_url).
    pub async fn refresh(
        &self,
        session: &PaymentSession,
        return_url: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<PaymentLink, ApiError> {
        self.resolve_url(&session.payment_id, return_url, cancel).await
    }
}

impl std::fmt::Debug for PaymentSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentSessionManager").finish_non_exhaustive()
    }
}

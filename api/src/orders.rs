//! Order creation and order history.

use crate::error::ApiError;
use crate::extract::{self, ResourceId, Strategy, unwrap_envelope};
use crate::fallback::{Attempted, candidates, first_success, route_missing};
use crate::transport::{ApiRequest, Transport, send_cancellable};
use cinepay_core::CancellationToken;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

/// Order creation routes, most likely first
pub const CREATE_ENDPOINTS: &[&str] = &[
    "/Order",
    "/Orders",
    "/Order/create",
    "/Orders/create",
    "/Order/book",
    "/Orders/book",
];

/// Order history routes, most likely first
pub const HISTORY_ENDPOINTS: &[&str] = &[
    "/Order/my-orders",
    "/Order/my",
    "/Order/me",
    "/Order/user",
    "/Orders/my",
    "/Orders/me",
    "/Orders/user",
    "/Orders/history",
    "/Order/history",
    "/Orders",
    "/Order",
];

/// Identity on the raw body: the body itself or a scalar top-level field
const ORDER_ID_RAW: &[Strategy] = &[
    Strategy::Root,
    Strategy::Field("id"),
    Strategy::Field("orderId"),
    Strategy::Field("orderID"),
    Strategy::Field("orderCode"),
    Strategy::Field("value"),
    Strategy::Field("result"),
    Strategy::Field("data"),
];

/// Identity on the unwrapped order object
const ORDER_ID_UNWRAPPED: &[Strategy] = &[
    Strategy::Field("id"),
    Strategy::Field("orderId"),
    Strategy::Field("orderID"),
    Strategy::Field("orderCode"),
    Strategy::Field("code"),
    Strategy::Field("reference"),
];

/// Human-facing order reference
const ORDER_REFERENCE: &[Strategy] = &[
    Strategy::Field("orderCode"),
    Strategy::Field("code"),
    Strategy::Field("reference"),
    Strategy::Field("id"),
    Strategy::Field("orderId"),
];

const SUBTOTAL: &[Strategy] = &[
    Strategy::Field("subTotal"),
    Strategy::Field("subtotal"),
    Strategy::Field("totalBeforeDiscount"),
    Strategy::Field("totalAmountBeforeDiscount"),
    Strategy::Field("originalAmount"),
    Strategy::Field("baseAmount"),
    Strategy::Field("totalAmount"),
    Strategy::Field("amountBeforeDiscount"),
];

const DISCOUNT: &[Strategy] = &[
    Strategy::Field("discountAmount"),
    Strategy::Field("discount"),
    Strategy::Field("promotionDiscount"),
    Strategy::Field("voucherDiscount"),
    Strategy::Field("totalDiscount"),
];

const TOTAL: &[Strategy] = &[
    Strategy::Field("finalAmount"),
    Strategy::Field("totalAmount"),
    Strategy::Field("amount"),
    Strategy::Field("total"),
    Strategy::Field("finalPrice"),
    Strategy::Field("payableAmount"),
];

const PAYABLE: &[Strategy] = &[
    Strategy::Field("finalAmount"),
    Strategy::Field("totalAmount"),
    Strategy::Field("amount"),
    Strategy::Field("finalPrice"),
    Strategy::Field("payableAmount"),
    Strategy::Field("total"),
];

const HISTORY_LIST: &[Strategy] = &[
    Strategy::Root,
    Strategy::Field("items"),
    Strategy::Field("data"),
    Strategy::Field("results"),
    Strategy::Field("orders"),
    Strategy::Field("orderList"),
    Strategy::Field("records"),
    Strategy::Field("value"),
    Strategy::Field("list"),
    Strategy::Field("content"),
    Strategy::Path(&["data", "items"]),
    Strategy::Path(&["data", "results"]),
    Strategy::Field("payload"),
    Strategy::Path(&["payload", "items"]),
];

/// One ticket line of an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketLine {
    /// Seat identity, when the layout provided one
    pub seat_id: Option<ResourceId>,
    /// Seat label
    pub label: String,
    /// Pricing class
    pub tier: String,
    /// Price charged for the seat
    pub price: u64,
}

impl TicketLine {
    fn to_value(&self) -> Value {
        let seat_id = self.seat_id.as_ref().map(ResourceId::to_value);
        json!({
            "seatId": seat_id,
            "seatID": seat_id,
            "seatCode": self.label,
            "seatLabel": self.label,
            "label": self.label,
            "code": self.label,
            "tier": self.tier,
            "type": self.tier,
            "ticketType": self.tier,
            "price": self.price,
            "amount": self.price,
            "total": self.price,
            "quantity": 1,
        })
    }
}

/// Everything needed to create an order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    /// Screening being booked
    pub screening_id: ResourceId,
    /// Selected seat identities (duplicates are dropped when sent)
    pub seat_ids: Vec<ResourceId>,
    /// Selected seat labels
    pub seat_codes: Vec<String>,
    /// One line per seat
    pub tickets: Vec<TicketLine>,
    /// Validated promotion code
    pub promotion_code: Option<String>,
    /// Promotion id from the validation
    pub promotion_id: Option<ResourceId>,
    /// Client-computed subtotal
    pub subtotal: u64,
    /// Client-computed, clamped discount
    pub discount: u64,
    /// Client-computed total
    pub total: u64,
    /// Payment provider
    pub provider: String,
}

impl OrderRequest {
    /// Seat ids in first-seen order without duplicates
    #[must_use]
    pub fn unique_seat_ids(&self) -> Vec<ResourceId> {
        let mut seen = Vec::with_capacity(self.seat_ids.len());
        for id in &self.seat_ids {
            if !seen.contains(id) {
                seen.push(id.clone());
            }
        }
        seen
    }

    /// Request body, with each value under every key variant the backend may read
    #[must_use]
    pub fn body(&self) -> Value {
        let screening = self.screening_id.to_value();
        let seat_ids: Vec<Value> = self.unique_seat_ids().iter().map(ResourceId::to_value).collect();
        let tickets: Vec<Value> = self.tickets.iter().map(TicketLine::to_value).collect();
        let discount = (self.discount > 0).then_some(self.discount);

        json!({
            "showtimeId": screening,
            "showTimeId": screening,
            "showtimeID": screening,
            "showTimeID": screening,
            "seatIds": seat_ids,
            "seats": seat_ids,
            "seatIdList": seat_ids,
            "showtimeSeatIds": seat_ids,
            "showTimeSeatIds": seat_ids,
            "seatCodes": self.seat_codes,
            "tickets": tickets,
            "items": tickets,
            "promotionCode": self.promotion_code,
            "promotionId": self.promotion_id.as_ref().map(ResourceId::to_value),
            "discountAmount": discount,
            "discount": discount,
            "subTotal": self.subtotal,
            "subtotal": self.subtotal,
            "totalAmount": self.total,
            "total": self.total,
            "finalAmount": self.total,
            "amount": self.total,
            "orderAmount": self.total,
            "paymentMethod": self.provider,
            "paymentProvider": self.provider,
            "provider": self.provider,
        })
    }
}

/// Amounts the server reported for a created order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAmounts {
    /// Subtotal before discount
    pub subtotal: Option<u64>,
    /// Discount applied
    pub discount: Option<u64>,
    /// Final payable total
    pub total: Option<u64>,
}

impl ServerAmounts {
    /// Read the amount fields of an (unwrapped) order object
    #[must_use]
    pub fn from_order(order: &Value) -> Self {
        Self {
            subtotal: extract::first(SUBTOTAL, order, extract::amount),
            discount: extract::first(DISCOUNT, order, extract::amount),
            total: extract::first(TOTAL, order, extract::amount),
        }
    }
}

/// A created order
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    /// Server identity, used to create the payment session
    pub id: ResourceId,
    /// Reference shown to the user and carried in the return URL
    pub reference: String,
    /// Authoritative amounts, when the server sent them
    pub amounts: ServerAmounts,
    /// Amount to charge, when the server sent one
    pub payable: Option<u64>,
    /// Route that created the order
    pub endpoint: String,
}

impl Order {
    /// Decode a creation response
    ///
    /// # Errors
    ///
    /// [`ApiError::MalformedResponse`] when no identity can be found.
    pub fn from_response(body: &Value, endpoint: String) -> Result<Self, ApiError> {
        let order = unwrap_envelope(body);

        let id = extract::first(ORDER_ID_RAW, body, ResourceId::from_value)
            .or_else(|| extract::first(ORDER_ID_UNWRAPPED, order, ResourceId::from_value))
            .ok_or_else(|| {
                ApiError::MalformedResponse("Could not determine the order id from the response.".to_string())
            })?;

        let reference = match &id {
            ResourceId::Text(code) => code.clone(),
            ResourceId::Numeric(_) => extract::first(ORDER_REFERENCE, order, ResourceId::from_value)
                .unwrap_or_else(|| id.clone())
                .to_string(),
        };

        Ok(Self {
            reference,
            amounts: ServerAmounts::from_order(order),
            payable: extract::first(PAYABLE, order, extract::amount),
            id,
            endpoint,
        })
    }
}

/// Creates orders through the ranked creation routes
#[derive(Clone)]
pub struct OrderSubmitter {
    transport: Arc<dyn Transport>,
}

impl OrderSubmitter {
    /// Create a submitter over `transport`
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Submit `request`
    ///
    /// Only 404/405 moves on to the next route; a business error aborts.
    ///
    /// # Errors
    ///
    /// - [`ApiError::Validation`] when no seat is selected
    /// - [`ApiError::NoEndpointAvailable`] when every route is missing
    /// - [`ApiError::MalformedResponse`] when the response has no order id
    /// - The first business error
    #[tracing::instrument(skip_all, fields(screening = %request.screening_id, seats = request.seat_ids.len()))]
    pub async fn submit(&self, request: &OrderRequest, cancel: &CancellationToken) -> Result<Order, ApiError> {
        if request.seat_ids.is_empty() {
            return Err(ApiError::Validation("Could not determine the seats for this order.".to_string()));
        }

        let body = request.body();
        let transport = self.transport.as_ref();

        let Attempted { value, endpoint } = first_success(
            "order",
            candidates(CREATE_ENDPOINTS),
            route_missing,
            |path| {
                let body = body.clone();
                async move { send_cancellable(transport, ApiRequest::post(path, body), cancel).await }
            },
        )
        .await?;

        let order = Order::from_response(&value.body, endpoint)?;
        tracing::info!(order = %order.id, endpoint = %order.endpoint, "Order created");
        Ok(order)
    }
}

impl std::fmt::Debug for OrderSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderSubmitter").finish_non_exhaustive()
    }
}

/// Past order as listed in history
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    /// Identity, when present
    pub id: Option<ResourceId>,
    /// Reference shown to the user
    pub reference: Option<String>,
    /// Status text
    pub status: Option<String>,
    /// Amounts reported for the order
    pub amounts: ServerAmounts,
    /// The record as received
    pub raw: Value,
}

impl OrderRecord {
    fn from_value(value: &Value) -> Self {
        Self {
            id: extract::first(ORDER_ID_UNWRAPPED, value, ResourceId::from_value),
            reference: extract::first(ORDER_REFERENCE, value, ResourceId::from_value).map(|r| r.to_string()),
            status: ["status", "orderStatus", "state"]
                .iter()
                .find_map(|k| value.get(k).and_then(Value::as_str))
                .map(str::to_string),
            amounts: ServerAmounts::from_order(value),
            raw: value.clone(),
        }
    }
}

/// Lists the signed-in user's orders
#[derive(Clone)]
pub struct OrderHistory {
    transport: Arc<dyn Transport>,
}

impl OrderHistory {
    /// Create a history client over `transport`
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Orders of the current user
    ///
    /// An empty list moves on to the next route, except on the two generic
    /// routes at the end, whose empty answer is accepted. Errors are
    /// collected; cancellation aborts at once.
    ///
    /// # Errors
    ///
    /// The last error seen when no route answered, or [`ApiError::Cancelled`].
    pub async fn list_mine(&self, cancel: &CancellationToken) -> Result<Vec<OrderRecord>, ApiError> {
        let mut last_error = None;
        let accept_empty_from = HISTORY_ENDPOINTS.len().saturating_sub(2);

        for (index, endpoint) in HISTORY_ENDPOINTS.iter().enumerate() {
            match send_cancellable(self.transport.as_ref(), ApiRequest::get(*endpoint), cancel).await {
                Ok(response) => {
                    let list = extract::list(HISTORY_LIST, &response.body);
                    if !list.is_empty() || index >= accept_empty_from {
                        tracing::debug!(endpoint, count = list.len(), "Order history loaded");
                        return Ok(list.iter().map(OrderRecord::from_value).collect());
                    }
                },
                Err(ApiError::Cancelled) => return Err(ApiError::Cancelled),
                Err(error) => {
                    tracing::debug!(endpoint, error = %error, "Order history route failed");
                    last_error = Some(error);
                },
            }
        }

        Err(last_error.unwrap_or(ApiError::NoEndpointAvailable { resource: "order history" }))
    }
}

impl std::fmt::Debug for OrderHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderHistory").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> OrderRequest {
        OrderRequest {
            screening_id: ResourceId::Numeric(12),
            seat_ids: vec![ResourceId::Numeric(1), ResourceId::Numeric(2), ResourceId::Numeric(1)],
            seat_codes: vec!["A1".into(), "A2".into()],
            tickets: vec![],
            promotion_code: None,
            promotion_id: None,
            subtotal: 200_000,
            discount: 0,
            total: 200_000,
            provider: "VNPay".into(),
        }
    }

    #[test]
    fn body_dedups_seats_and_fans_out_keys() {
        let body = request().body();
        assert_eq!(body["seatIds"], json!([1, 2]));
        assert_eq!(body["showTimeSeatIds"], json!([1, 2]));
        assert_eq!(body["showtimeID"], json!(12));
        assert_eq!(body["discountAmount"], Value::Null);
        assert_eq!(body["orderAmount"], json!(200_000));
    }

    #[test]
    fn order_id_found_in_nested_envelope() {
        let body = json!({"data": {"result": {"orderCode": "CP-991", "finalAmount": 180000}}});
        let order = Order::from_response(&body, "/Order".into());
        let order = order.unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(order.id, ResourceId::Text("CP-991".into()));
        assert_eq!(order.reference, "CP-991");
        assert_eq!(order.amounts.total, Some(180_000));
    }

    #[test]
    fn numeric_id_prefers_order_code_as_reference() {
        let body = json!({"id": 55, "orderCode": "CP-55"});
        let order = Order::from_response(&body, "/Order".into()).unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(order.id, ResourceId::Numeric(55));
        assert_eq!(order.reference, "CP-55");
    }

    #[test]
    fn missing_identity_is_malformed() {
        let result = Order::from_response(&json!({"status": "created"}), "/Order".into());
        assert!(matches!(result, Err(ApiError::MalformedResponse(_))));
    }
}

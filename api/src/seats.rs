//! Seat layout lookup and normalization.
//!
//! Seat payloads differ between backend deployments in field names and in
//! how status is signalled. [`normalize_seat`] folds all of them into one
//! [`Seat`] shape; [`SeatLayoutProvider`] finds a layout for a screening by
//! walking screening-scoped endpoints, then the screening detail, then the
//! room's generic layout.

use crate::error::ApiError;
use crate::extract::{ResourceId, amount, first_truthy, number, truthy};
use crate::transport::{ApiRequest, Transport, send_cancellable};
use cinepay_core::CancellationToken;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Tier assigned when the backend names none
pub const DEFAULT_TIER: &str = "Standard";

/// Seat availability, collapsed from the backend's many signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    /// Free to select
    Available,
    /// Temporarily held; still selectable
    Held,
    /// Sold or reserved
    Booked,
    /// Not a usable seat
    Disabled,
}

impl SeatStatus {
    /// Whether a seat in this status may be toggled into a selection
    #[must_use]
    pub const fn is_selectable(self) -> bool {
        matches!(self, Self::Available | Self::Held)
    }
}

/// One seat cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seat {
    /// Backend identity
    pub id: Option<ResourceId>,
    /// Display label (`A12`)
    pub label: String,
    /// 1-based row
    pub row: Option<u32>,
    /// 1-based column
    pub col: Option<u32>,
    /// Pricing class
    pub tier: String,
    /// Availability
    pub status: SeatStatus,
    /// Explicit price, when the backend gives a positive one
    pub price: Option<u64>,
}

impl Seat {
    /// Selection key: the id, falling back to the label
    #[must_use]
    pub fn key(&self) -> String {
        self.id
            .as_ref()
            .map_or_else(|| self.label.trim().to_string(), ToString::to_string)
    }

    /// Explicit positive price, else the screening base price, else 0
    #[must_use]
    pub fn price_or(&self, base_price: Option<u64>) -> u64 {
        self.price
            .filter(|p| *p > 0)
            .or(base_price)
            .unwrap_or(0)
    }
}

/// Seat grid for one screening
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatLayout {
    /// Row count, at least the highest row observed
    pub rows: u32,
    /// Column count, at least the highest column observed
    pub cols: u32,
    /// Seats in backend order
    pub seats: Vec<Seat>,
}

impl SeatLayout {
    /// Seats ordered by row, then column
    #[must_use]
    pub fn sorted_seats(&self) -> Vec<&Seat> {
        let mut seats: Vec<&Seat> = self.seats.iter().collect();
        seats.sort_by_key(|s| (s.row.unwrap_or(0), s.col.unwrap_or(0)));
        seats
    }

    /// Look a seat up by its selection key
    #[must_use]
    pub fn seat(&self, key: &str) -> Option<&Seat> {
        self.seats.iter().find(|s| s.key() == key)
    }
}

const ID_KEYS: &[&str] = &[
    "id",
    "seatId",
    "SeatId",
    "showtimeSeatId",
    "showTimeSeatId",
    "ShowtimeSeatId",
    "code",
    "key",
];
const LABEL_KEYS: &[&str] = &["label", "name", "code", "seatNumber", "seatLabel", "seatName"];
const LATE_LABEL_KEYS: &[&str] = &["ticketCode", "position"];
const ROW_KEYS: &[&str] = &["row", "rowIndex", "rowNumber", "rowOrder"];
const COL_KEYS: &[&str] = &["col", "columnIndex", "colNumber", "column", "seatColumn"];
const TIER_KEYS: &[&str] = &["tier", "type", "class", "category", "level"];
const STATUS_KEYS: &[&str] = &["status", "state", "bookingStatus"];
const PRICE_KEYS: &[&str] = &[
    "price",
    "cost",
    "amount",
    "ticketPrice",
    "priceInVnd",
    "finalPrice",
    "salePrice",
];
const SEAT_LIST_KEYS: &[&str] = &["seats", "items", "data", "list"];

const BOOKED_FLAGS: &[&str] = &[
    "isBooked",
    "booked",
    "isReserved",
    "reserved",
    "isSold",
    "sold",
    "isUnavailable",
    "unavailable",
];
const HELD_FLAGS: &[&str] = &["isHolding", "holding", "onHold", "hold"];

fn flag(seat: &Value, key: &str) -> bool {
    seat.get(key).is_some_and(truthy)
}

fn explicitly_false(seat: &Value, key: &str) -> bool {
    seat.get(key) == Some(&Value::Bool(false))
}

/// Collapse status strings and flags into [`SeatStatus`]
///
/// Precedence: inactive, then booked, then held, then unavailable; anything
/// else is available.
#[must_use]
pub fn normalize_status(seat: &Value) -> SeatStatus {
    let raw = first_truthy(seat, STATUS_KEYS)
        .and_then(Value::as_str)
        .map(str::to_lowercase)
        .unwrap_or_default();

    if explicitly_false(seat, "isActive") || explicitly_false(seat, "active") {
        return SeatStatus::Disabled;
    }
    if BOOKED_FLAGS.iter().any(|k| flag(seat, k))
        || matches!(raw.as_str(), "booked" | "sold" | "reserved" | "occupied" | "unavailable")
    {
        return SeatStatus::Booked;
    }
    if HELD_FLAGS.iter().any(|k| flag(seat, k)) || matches!(raw.as_str(), "holding" | "held" | "pending") {
        return SeatStatus::Held;
    }
    if explicitly_false(seat, "isAvailable") || explicitly_false(seat, "available") || raw == "disabled" {
        return SeatStatus::Disabled;
    }
    SeatStatus::Available
}

/// Row and column from a label like `"A12"` (`B7` → row 2, col 7)
///
/// The first letter of the leftmost letters-then-digits run picks the row.
#[must_use]
pub fn position_from_label(label: &str) -> Option<(u32, u32)> {
    let chars: Vec<char> = label.trim().chars().collect();
    let mut start = 0;

    while start < chars.len() {
        if chars[start].is_ascii_alphabetic() {
            let letters_end = chars[start..]
                .iter()
                .position(|c| !c.is_ascii_alphabetic())
                .map_or(chars.len(), |n| start + n);
            let digits: String = chars[letters_end..]
                .iter()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if !digits.is_empty() {
                let row = u32::from(chars[start].to_ascii_uppercase()) - u32::from('A') + 1;
                let col = digits.parse().ok()?;
                return Some((row, col));
            }
            start = letters_end;
        } else {
            start += 1;
        }
    }
    None
}

fn row_letter(row: u32) -> Option<char> {
    char::from_u32(u32::from('A') + row.checked_sub(1)?)
}

fn label_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // range-checked
fn position(value: &Value) -> Option<u32> {
    number(value)
        .filter(|n| *n >= 0.0 && *n <= f64::from(u32::MAX))
        .map(|n| n as u32)
}

/// Normalize one seat object; `None` for non-objects
#[must_use]
pub fn normalize_seat(seat: &Value) -> Option<Seat> {
    if !seat.is_object() {
        return None;
    }

    let id = first_truthy(seat, ID_KEYS).and_then(ResourceId::from_value);

    let numeric_position = match (seat.get("row").and_then(Value::as_u64), seat.get("col").and_then(Value::as_u64)) {
        (Some(row), Some(col)) => u32::try_from(row)
            .ok()
            .and_then(row_letter)
            .map(|letter| format!("{letter}{col}")),
        _ => None,
    };
    let label = first_truthy(seat, LABEL_KEYS)
        .and_then(label_text)
        .or(numeric_position)
        .or_else(|| first_truthy(seat, LATE_LABEL_KEYS).and_then(label_text));

    let parsed = label.as_deref().and_then(position_from_label);
    let row = first_truthy(seat, ROW_KEYS)
        .and_then(position)
        .or(parsed.map(|(r, _)| r));
    let col = first_truthy(seat, COL_KEYS)
        .and_then(position)
        .or(parsed.map(|(_, c)| c));

    let tier = first_truthy(seat, TIER_KEYS)
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            if flag(seat, "isVip") || flag(seat, "vip") {
                Some("VIP".to_string())
            } else if flag(seat, "isDeluxe") || flag(seat, "deluxe") {
                Some("Deluxe".to_string())
            } else if flag(seat, "isSweetbox") {
                Some("Sweetbox".to_string())
            } else {
                None
            }
        })
        .unwrap_or_else(|| DEFAULT_TIER.to_string());

    let price = first_truthy(seat, PRICE_KEYS)
        .and_then(amount)
        .filter(|p| *p > 0);

    let label = label.unwrap_or_else(|| {
        format!(
            "Seat {}{}",
            row.map(|r| r.to_string()).unwrap_or_default(),
            col.map(|c| c.to_string()).unwrap_or_default()
        )
    });

    Some(Seat {
        id,
        label,
        row,
        col,
        tier,
        status: normalize_status(seat),
        price,
    })
}

/// Normalize a layout payload; `None` when it holds no seats
///
/// The seat list is read from `seats`, `items`, `data`, `list`, or the body
/// itself when it is an array. Declared bounds (`rows`/`totalRows`,
/// `cols`/`totalCols`/`columns`) are widened to cover every observed seat.
#[must_use]
pub fn normalize_layout(raw: &Value, fallback_rows: Option<u32>, fallback_cols: Option<u32>) -> Option<SeatLayout> {
    let list = SEAT_LIST_KEYS
        .iter()
        .find_map(|k| raw.get(k).and_then(Value::as_array))
        .or_else(|| raw.as_array())?;

    let seats: Vec<Seat> = list.iter().filter_map(normalize_seat).collect();
    if seats.is_empty() {
        return None;
    }

    let declared_rows = first_truthy(raw, &["rows", "totalRows"])
        .and_then(position)
        .or(fallback_rows)
        .unwrap_or(0);
    let declared_cols = first_truthy(raw, &["cols", "totalCols", "columns"])
        .and_then(position)
        .or(fallback_cols)
        .unwrap_or(0);

    let max_row = seats.iter().filter_map(|s| s.row).max().unwrap_or(0);
    let max_col = seats.iter().filter_map(|s| s.col).max().unwrap_or(0);

    Some(SeatLayout {
        rows: declared_rows.max(max_row),
        cols: declared_cols.max(max_col),
        seats,
    })
}

/// Fetches and normalizes seat layouts
#[derive(Clone)]
pub struct SeatLayoutProvider {
    transport: Arc<dyn Transport>,
}

impl SeatLayoutProvider {
    /// Create a provider over `transport`
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    fn screening_candidates(screening_id: &ResourceId) -> [String; 4] {
        [
            format!("/Showtime/{screening_id}/seats"),
            format!("/Showtime/{screening_id}/seat-map"),
            format!("/Showtime/{screening_id}/seatmap"),
            format!("/Showtime/{screening_id}/seat-layout"),
        ]
    }

    /// Layout for a screening
    ///
    /// Tries the screening-scoped seat endpoints (a 404 or an empty layout
    /// moves to the next), then layouts embedded in the screening detail,
    /// then the room's generic layout.
    ///
    /// # Errors
    ///
    /// - [`ApiError::NotFound`] when no source yields a seat
    /// - [`ApiError::Cancelled`] when `cancel` fires
    /// - Any non-404 error from the backend
    #[tracing::instrument(skip(self, cancel), fields(screening = %screening_id))]
    pub async fn fetch(&self, screening_id: &ResourceId, cancel: &CancellationToken) -> Result<SeatLayout, ApiError> {
        for endpoint in Self::screening_candidates(screening_id) {
            match send_cancellable(self.transport.as_ref(), ApiRequest::get(&endpoint), cancel).await {
                Ok(response) => {
                    if let Some(layout) = normalize_layout(&response.body, None, None) {
                        return Ok(layout);
                    }
                },
                Err(error) if error.status() == Some(404) => {},
                Err(error) => return Err(error),
            }
        }

        let detail = match send_cancellable(
            self.transport.as_ref(),
            ApiRequest::get(format!("/Showtime/{screening_id}")),
            cancel,
        )
        .await
        {
            Ok(response) => response.body,
            Err(error) if error.status() == Some(404) => Value::Null,
            Err(error) => return Err(error),
        };

        if let Some(layout) = layout_from_detail(&detail) {
            return Ok(layout);
        }

        let room_id = first_truthy(&detail, &["roomId"])
            .or_else(|| detail.get("room").and_then(|room| first_truthy(room, &["id"])))
            .and_then(ResourceId::from_value);

        match room_id {
            Some(room_id) => self.fetch_room(&room_id, cancel).await,
            None => Err(ApiError::NotFound(format!("No seat map for screening {screening_id}"))),
        }
    }

    /// Generic layout of a room
    ///
    /// # Errors
    ///
    /// [`ApiError::NotFound`] when the layout holds no seats, or the backend error.
    #[tracing::instrument(skip(self, cancel), fields(room = %room_id))]
    pub async fn fetch_room(&self, room_id: &ResourceId, cancel: &CancellationToken) -> Result<SeatLayout, ApiError> {
        let response = send_cancellable(
            self.transport.as_ref(),
            ApiRequest::get(format!("/Seat/layout/{room_id}")),
            cancel,
        )
        .await?;

        normalize_layout(&response.body, None, None)
            .ok_or_else(|| ApiError::NotFound(format!("No seat map for room {room_id}")))
    }
}

fn layout_from_detail(detail: &Value) -> Option<SeatLayout> {
    if !detail.is_object() {
        return None;
    }

    let room = detail.get("room");
    let rows = room.and_then(|r| r.get("rows")).and_then(position);
    let cols = room.and_then(|r| r.get("cols")).and_then(position);

    let embedded = [
        detail.get("seatLayout"),
        detail.get("seatMap"),
        detail.get("seats"),
        detail.get("showtimeSeats"),
        room.and_then(|r| r.get("seats")),
    ];

    embedded
        .into_iter()
        .flatten()
        .find_map(|option| normalize_layout(option, rows, cols))
        .or_else(|| normalize_layout(detail, rows, cols))
}

impl std::fmt::Debug for SeatLayoutProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeatLayoutProvider").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn label_derives_position() {
        assert_eq!(position_from_label("A12"), Some((1, 12)));
        assert_eq!(position_from_label(" c3 "), Some((3, 3)));
        assert_eq!(position_from_label("Seat-B7"), Some((2, 7)));
        assert_eq!(position_from_label("12"), None);
    }

    #[test]
    fn status_signals_collapse() {
        assert_eq!(normalize_status(&json!({"status": "Sold"})), SeatStatus::Booked);
        assert_eq!(normalize_status(&json!({"onHold": true})), SeatStatus::Held);
        assert_eq!(normalize_status(&json!({"state": "pending"})), SeatStatus::Held);
        assert_eq!(normalize_status(&json!({"isActive": false, "isBooked": true})), SeatStatus::Disabled);
        assert_eq!(normalize_status(&json!({"available": false})), SeatStatus::Disabled);
        assert_eq!(normalize_status(&json!({"status": "free"})), SeatStatus::Available);
        assert_eq!(normalize_status(&json!({})), SeatStatus::Available);
    }

    #[test]
    fn seat_fields_are_normalized() {
        let seat = normalize_seat(&json!({
            "seatId": "17",
            "seatLabel": "B4",
            "isVip": true,
            "ticketPrice": "95000",
        }));

        assert_eq!(
            seat,
            Some(Seat {
                id: Some(ResourceId::Numeric(17)),
                label: "B4".into(),
                row: Some(2),
                col: Some(4),
                tier: "VIP".into(),
                status: SeatStatus::Available,
                price: Some(95_000),
            })
        );
    }

    #[test]
    fn numeric_position_builds_label() {
        let seat = normalize_seat(&json!({"id": 3, "row": 3, "col": 5, "price": 0}));
        let seat = seat.unwrap_or_else(|| unreachable!());
        assert_eq!(seat.label, "C5");
        assert_eq!(seat.price, None);
        assert_eq!(seat.key(), "3");
    }

    #[test]
    fn layout_bounds_cover_observed_seats() {
        let layout = normalize_layout(
            &json!({"cols": 2, "items": [{"label": "A1"}, {"label": "B9"}]}),
            None,
            None,
        );
        let layout = layout.unwrap_or_else(|| unreachable!());
        assert_eq!((layout.rows, layout.cols), (2, 9));
    }

    #[test]
    fn empty_layout_is_none() {
        assert_eq!(normalize_layout(&json!({"seats": []}), None, None), None);
        assert_eq!(normalize_layout(&json!({"message": "ok"}), None, None), None);
    }

    #[test]
    fn price_falls_back_to_base_price() {
        let seat = normalize_seat(&json!({"label": "A1"})).unwrap_or_else(|| unreachable!());
        assert_eq!(seat.price_or(Some(100_000)), 100_000);
        assert_eq!(seat.price_or(None), 0);
    }
}

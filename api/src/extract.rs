//! Extraction strategies for loosely shaped backend responses.
//!
//! The backend is not consistent about where it puts an identity or an
//! amount: sometimes the body *is* the id, sometimes it's `id`, `orderId`,
//! or nested under `data`. Each lookup is an ordered list of
//! [`Strategy`] values tried in sequence; the first one that locates a
//! convertible value wins.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where to look for a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// The body itself
    Root,
    /// A top-level field
    Field(&'static str),
    /// A nested field path (`data.paymentUrl`)
    Path(&'static [&'static str]),
}

impl Strategy {
    /// Locate the value this strategy points at
    #[must_use]
    pub fn locate<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        match self {
            Self::Root => Some(value),
            Self::Field(key) => value.get(key),
            Self::Path(path) => path.iter().try_fold(value, |v, key| v.get(key)),
        }
    }

    /// Human-readable name, used in trace logs
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Root => "<root>".to_string(),
            Self::Field(key) => (*key).to_string(),
            Self::Path(path) => path.join("."),
        }
    }
}

/// Try `strategies` in order and convert the first located value that `convert` accepts
pub fn first<T>(
    strategies: &[Strategy],
    value: &Value,
    convert: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    strategies.iter().find_map(|strategy| {
        let found = convert(strategy.locate(value)?)?;
        tracing::trace!(strategy = %strategy.describe(), "Extraction strategy matched");
        Some(found)
    })
}

/// JavaScript-style truthiness: not null, false, 0, or an empty string
#[must_use]
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// First truthy field of `object` among `keys`
#[must_use]
pub fn first_truthy<'v>(object: &'v Value, keys: &[&str]) -> Option<&'v Value> {
    keys.iter().filter_map(|key| object.get(key)).find(|v| truthy(v))
}

/// A finite number, or a string that parses as one
#[must_use]
pub fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok()?
        },
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Non-negative, rounded whole amount (VND has no minor unit)
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // clamped and rounded first
pub fn amount(value: &Value) -> Option<u64> {
    number(value).map(|n| n.max(0.0).round() as u64)
}

/// Strip currency formatting from a user-entered amount
///
/// Keeps digits, `.` and `-`, drops thousands separators. Anything that does
/// not parse to a finite, non-negative number becomes `0`.
#[must_use]
pub fn sanitize_amount(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-'))
        .collect();

    match cleaned.parse::<f64>() {
        Ok(n) if n.is_finite() && n >= 0.0 => n,
        _ => 0.0,
    }
}

/// An identifier the backend hands out: numeric when it looks numeric
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceId {
    /// Numeric id
    Numeric(i64),
    /// Opaque code
    Text(String),
}

impl ResourceId {
    /// Coerce a scalar JSON value into an id
    ///
    /// Numbers and numeric strings become [`ResourceId::Numeric`]; other
    /// non-empty strings become [`ResourceId::Text`]. Objects, arrays, null,
    /// booleans and empty strings yield `None`.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| integral(n.as_f64()?))
                .map(Self::Numeric),
            Value::String(s) => Self::parse(s),
            _ => None,
        }
    }

    /// Parse user or backend text into an id
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(
            trimmed
                .parse::<i64>()
                .map_or_else(|_| Self::Text(trimmed.to_string()), Self::Numeric),
        )
    }

    /// JSON form: a number or a string
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Numeric(n) => Value::from(*n),
            Self::Text(s) => Value::from(s.as_str()),
        }
    }
}

#[allow(clippy::cast_possible_truncation)] // guarded by the fract/range check
fn integral(f: f64) -> Option<i64> {
    (f.fract() == 0.0 && f.abs() < 9.0e15).then_some(f as i64)
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ResourceId {
    fn from(n: i64) -> Self {
        Self::Numeric(n)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self::parse(s).unwrap_or_else(|| Self::Text(s.to_string()))
    }
}

/// Descend through `data`/`result`/`value` envelopes to the innermost object
#[must_use]
pub fn unwrap_envelope(value: &Value) -> &Value {
    let mut current = value;
    loop {
        let next = ["data", "result", "value"]
            .iter()
            .filter_map(|key| current.get(key))
            .find(|v| v.is_object());
        match next {
            Some(inner) => current = inner,
            None => return current,
        }
    }
}

/// First array among `strategies`, or an empty slice
#[must_use]
pub fn list<'v>(strategies: &[Strategy], value: &'v Value) -> &'v [Value] {
    strategies
        .iter()
        .find_map(|s| s.locate(value).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or_default()
}

//! Transport abstraction between the services and HTTP.
//!
//! Services build [`ApiRequest`]s and hand them to a [`Transport`]. The
//! production stack is [`HttpTransport`](crate::client::HttpTransport) wrapped
//! in [`AuthenticatedTransport`](crate::client::AuthenticatedTransport); tests
//! use [`MockTransport`](crate::mocks::MockTransport).

use crate::error::ApiError;
use cinepay_core::CancellationToken;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`Transport::send`]
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<ApiResponse, ApiError>> + Send + 'a>>;

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// A request relative to the API base (`/Order`, `/Showtime/12/seats`)
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// Method
    pub method: Method,
    /// Path below the API base, starting with `/`
    pub path: String,
    /// Query parameters
    pub query: Vec<(String, String)>,
    /// JSON body
    pub body: Option<Value>,
    /// Bearer token to attach
    pub bearer: Option<String>,
}

impl ApiRequest {
    /// GET `path`
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
            bearer: None,
        }
    }

    /// POST `body` to `path`
    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
            bearer: None,
        }
    }

    /// Append a query parameter
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Value of a query parameter
    #[must_use]
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A successful (2xx) response
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status
    pub status: u16,
    /// Decoded body; `Value::Null` when empty, `Value::String` when not JSON
    pub body: Value,
}

/// Sends API requests.
///
/// Implementations return `Err(ApiError::Status { .. })` for non-2xx answers.
pub trait Transport: Send + Sync {
    /// Send one request
    fn send(&self, request: ApiRequest) -> TransportFuture<'_>;
}

/// Send `request`, giving up with [`ApiError::Cancelled`] once `cancel` fires
///
/// # Errors
///
/// Whatever the transport returns, or [`ApiError::Cancelled`].
pub async fn send_cancellable(
    transport: &dyn Transport,
    request: ApiRequest,
    cancel: &CancellationToken,
) -> Result<ApiResponse, ApiError> {
    cancel
        .run_until_cancelled(transport.send(request))
        .await
        .unwrap_or(Err(ApiError::Cancelled))
}

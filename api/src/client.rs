//! reqwest-backed transports

use crate::error::ApiError;
use crate::session::{SessionManager, is_auth_route};
use crate::transport::{ApiRequest, ApiResponse, Method, Transport, TransportFuture};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Plain HTTP transport rooted at the API base (`{backend}/api`)
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    api_url: String,
}

impl HttpTransport {
    /// Create a transport for `backend_base`; `/api` is appended
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] if the HTTP client cannot be built.
    pub fn new(backend_base: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_url: format!("{}/api", backend_base.trim_end_matches('/')),
        })
    }

    /// The API base every request path is appended to
    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = format!("{}{}", self.api_url, request.path);

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        let body = decode_body(&text);

        if status.is_success() {
            Ok(ApiResponse {
                status: status.as_u16(),
                body,
            })
        } else {
            tracing::debug!(method = %request.method, path = %request.path, status = status.as_u16(), "API error response");
            Err(ApiError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// JSON when it parses, the raw text otherwise, `Null` when empty
fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

impl Transport for HttpTransport {
    fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
        Box::pin(self.execute(request))
    }
}

/// Transport that attaches the session's bearer token and recovers from 401
///
/// Auth routes never carry a bearer and never trigger a refresh. Any other
/// request answered with 401 triggers one (shared) refresh and is retried
/// once with the new token. If the refresh fails, the original 401 is returned.
#[derive(Clone)]
pub struct AuthenticatedTransport {
    inner: Arc<dyn Transport>,
    session: SessionManager,
}

impl AuthenticatedTransport {
    /// Wrap `inner`; `session` should refresh through an unwrapped transport
    #[must_use]
    pub fn new(inner: Arc<dyn Transport>, session: SessionManager) -> Self {
        Self { inner, session }
    }

    /// The session whose tokens are attached
    #[must_use]
    pub const fn session(&self) -> &SessionManager {
        &self.session
    }

    async fn execute(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let auth_flow = is_auth_route(&request.path);
        if !auth_flow {
            request.bearer = self.session.access_token();
        }

        match self.inner.send(request.clone()).await {
            Err(error) if error.status() == Some(401) && !auth_flow => {
                match self.session.refresh().await {
                    Ok(token) => {
                        tracing::debug!(path = %request.path, "Retrying request after token refresh");
                        request.bearer = Some(token);
                        self.inner.send(request).await
                    },
                    Err(cause) => {
                        tracing::debug!(path = %request.path, cause = %cause, "Request stays unauthorized");
                        Err(error)
                    },
                }
            },
            other => other,
        }
    }
}

impl Transport for AuthenticatedTransport {
    fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
        Box::pin(self.execute(request))
    }
}

impl std::fmt::Debug for AuthenticatedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedTransport")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

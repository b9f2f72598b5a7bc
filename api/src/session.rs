//! Bearer-token session with single-flight refresh.
//!
//! [`SessionManager`] owns the access/refresh token pair (persisted through an
//! injected [`TokenStorage`]) and refreshes it with at most one refresh call in
//! flight. Callers that hit a 401 while a refresh is running wait for that
//! refresh instead of starting their own.

use crate::transport::{ApiRequest, Transport};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;

/// Path of the refresh endpoint below the API base
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Route fragments that never carry a bearer token and never trigger a refresh
const AUTH_ROUTES: &[&str] = &[
    "/login",
    "/register",
    "/forgot",
    "/request-reset",
    "/reset",
    REFRESH_PATH,
];

/// Whether `path` belongs to the authentication flow
#[must_use]
pub fn is_auth_route(path: &str) -> bool {
    let lowered = path.to_ascii_lowercase();
    AUTH_ROUTES.iter().any(|route| lowered.contains(route))
}

/// Errors from the refresh flow
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No refresh token is stored
    #[error("No refresh token available")]
    NoRefreshToken,

    /// The refresh endpoint answered without an access token
    #[error("Refresh response carried no access token")]
    MissingAccessToken,

    /// The refresh call failed
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
}

/// Access and refresh token pair
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tokens {
    /// Bearer token
    pub access: Option<String>,
    /// Token exchanged at [`REFRESH_PATH`]
    pub refresh: Option<String>,
}

/// Where tokens live between sessions
pub trait TokenStorage: Send + Sync {
    /// Load the stored pair
    fn load(&self) -> Tokens;

    /// Replace the stored pair
    fn save(&self, tokens: &Tokens);
}

/// Process-local token storage
#[derive(Debug, Default)]
pub struct InMemoryTokenStorage {
    tokens: Mutex<Tokens>,
}

impl InMemoryTokenStorage {
    /// Storage pre-filled with `tokens`
    #[must_use]
    pub const fn with_tokens(tokens: Tokens) -> Self {
        Self {
            tokens: Mutex::new(tokens),
        }
    }
}

impl TokenStorage for InMemoryTokenStorage {
    fn load(&self) -> Tokens {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, tokens: &Tokens) {
        *self.tokens.lock().unwrap_or_else(PoisonError::into_inner) = tokens.clone();
    }
}

type RefreshFuture = Shared<BoxFuture<'static, Result<String, AuthError>>>;

struct Inner {
    storage: Arc<dyn TokenStorage>,
    tokens: RwLock<Tokens>,
    /// Unauthenticated transport used for the refresh call
    refresher: Arc<dyn Transport>,
    in_flight: Mutex<Option<RefreshFuture>>,
}

/// Explicit session object replacing module-level token state
///
/// Cheap to clone; clones share tokens and the in-flight refresh.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Create a session backed by `storage`, refreshing through `refresher`
    ///
    /// `refresher` must not inject bearer tokens itself.
    #[must_use]
    pub fn new(storage: Arc<dyn TokenStorage>, refresher: Arc<dyn Transport>) -> Self {
        let tokens = storage.load();
        Self {
            inner: Arc::new(Inner {
                storage,
                tokens: RwLock::new(tokens),
                refresher,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Current access token
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.inner.current().access
    }

    /// Store a new token pair (after login)
    pub fn set_tokens(&self, tokens: Tokens) {
        self.inner.replace(tokens);
    }

    /// Forget both tokens
    pub fn clear(&self) {
        self.inner.replace(Tokens::default());
    }

    /// Refresh the access token, sharing any refresh already in flight
    ///
    /// On failure both tokens are cleared.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when there is no refresh token or the refresh call fails.
    pub async fn refresh(&self) -> Result<String, AuthError> {
        let flight = {
            let mut slot = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            if let Some(existing) = slot.as_ref() {
                tracing::debug!("Joining in-flight token refresh");
                existing.clone()
            } else {
                let inner = Arc::clone(&self.inner);
                let flight = async move { inner.perform_refresh().await }.boxed().shared();
                *slot = Some(flight.clone());
                flight
            }
        };

        let result = flight.clone().await;

        let mut slot = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&flight)) {
            *slot = None;
        }

        result
    }
}

impl Inner {
    fn current(&self) -> Tokens {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace(&self, tokens: Tokens) {
        self.storage.save(&tokens);
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = tokens;
    }

    async fn perform_refresh(&self) -> Result<String, AuthError> {
        let Some(refresh_token) = self.current().refresh else {
            self.replace(Tokens::default());
            return Err(AuthError::NoRefreshToken);
        };

        tracing::debug!("Refreshing access token");

        let request = ApiRequest::post(REFRESH_PATH, json!({ "refreshToken": refresh_token }));
        let body = match self.refresher.send(request).await {
            Ok(response) => response.body,
            Err(error) => {
                tracing::warn!(error = %error, "Token refresh failed, clearing session");
                self.replace(Tokens::default());
                return Err(AuthError::RefreshFailed(error.user_message("refresh rejected")));
            },
        };

        let access = body.get("accessToken").and_then(Value::as_str).map(str::to_string);
        let Some(access) = access.filter(|t| !t.is_empty()) else {
            tracing::warn!("Refresh response carried no access token, clearing session");
            self.replace(Tokens::default());
            return Err(AuthError::MissingAccessToken);
        };

        let refresh = body
            .get("refreshToken")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map_or(Some(refresh_token), |t| Some(t.to_string()));

        self.replace(Tokens {
            access: Some(access.clone()),
            refresh,
        });
        Ok(access)
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tokens = self.inner.current();
        f.debug_struct("SessionManager")
            .field("has_access_token", &tokens.access.is_some())
            .field("has_refresh_token", &tokens.refresh.is_some())
            .finish_non_exhaustive()
    }
}

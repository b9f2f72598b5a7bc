//! Ranked candidate endpoints.
//!
//! Several backend deployments expose the same operation under different
//! routes. [`first_success`] walks a ranked list, moving on only when the
//! error says "not here" and aborting on anything else.

use crate::error::ApiError;
use std::future::Future;

/// Result of a successful attempt and the endpoint that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    /// The attempt's value
    pub value: T,
    /// Path of the candidate that answered
    pub endpoint: String,
}

/// Errors that move on to the next candidate: 404 and 405
#[must_use]
pub const fn route_missing(error: &ApiError) -> bool {
    error.is_not_supported()
}

/// Route missing, or the answer carried nothing usable
#[must_use]
pub const fn route_missing_or_unusable(error: &ApiError) -> bool {
    error.is_not_supported() || matches!(error, ApiError::MalformedResponse(_))
}

/// Owned candidate list for [`first_success`]
///
/// Collected up front so no borrowing iterator is held across an await.
#[must_use]
pub fn candidates(paths: &[&str]) -> Vec<String> {
    paths.iter().map(|path| (*path).to_string()).collect()
}

/// Try each candidate in order until one succeeds
///
/// Calls stop at the first success; no candidate after it is attempted.
/// An error for which `retry_on` returns `false` aborts immediately.
/// Cancellation always aborts.
///
/// # Errors
///
/// - The first non-retryable error
/// - [`ApiError::NoEndpointAvailable`] if every candidate reported a missing route
/// - Otherwise the last retryable error
pub async fn first_success<T, I, F, Fut>(
    resource: &'static str,
    candidates: I,
    retry_on: fn(&ApiError) -> bool,
    mut attempt: F,
) -> Result<Attempted<T>, ApiError>
where
    I: IntoIterator<Item = String>,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut last_error = None;

    for endpoint in candidates {
        match attempt(endpoint.clone()).await {
            Ok(value) => {
                tracing::debug!(resource, endpoint = %endpoint, "Candidate endpoint succeeded");
                return Ok(Attempted { value, endpoint });
            },
            Err(error) if !error.is_cancelled() && retry_on(&error) => {
                tracing::debug!(resource, endpoint = %endpoint, error = %error, "Trying next candidate");
                last_error = Some(error);
            },
            Err(error) => {
                tracing::warn!(resource, endpoint = %endpoint, error = %error, "Candidate endpoint failed");
                return Err(error);
            },
        }
    }

    Err(match last_error {
        Some(error) if !error.is_not_supported() => error,
        _ => ApiError::NoEndpointAvailable { resource },
    })
}

//! Checkout failures as the surface shows them

use cinepay_api::ApiError;
use thiserror::Error;

/// A checkout failure, already converted from transport and parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// Local input problem (empty selection, empty code); nothing was sent
    #[error("{0}")]
    Validation(String),

    /// Every candidate route for the resource was missing
    #[error("The {0} service is not available right now.")]
    EndpointNotSupported(&'static str),

    /// The backend rejected the request
    #[error("{0}")]
    Business(String),

    /// Success status, but no usable identity or URL in the answer
    #[error("{0}")]
    MalformedResponse(String),

    /// No seat map could be found for the screening
    #[error("{0}")]
    SeatMapUnavailable(String),

    /// The owning surface went away
    #[error("Cancelled")]
    Cancelled,

    /// The request never got an answer
    #[error("{0}")]
    Transport(String),
}

impl CheckoutError {
    /// Convert an API error, using `fallback` when no readable message exists
    #[must_use]
    pub fn from_api(error: &ApiError, fallback: &str) -> Self {
        match error {
            ApiError::Validation(_) => Self::Validation(error.user_message(fallback)),
            ApiError::NoEndpointAvailable { resource } => Self::EndpointNotSupported(resource),
            ApiError::Status { .. } => Self::Business(error.user_message(fallback)),
            ApiError::MalformedResponse(_) => Self::MalformedResponse(error.user_message(fallback)),
            ApiError::NotFound(_) => Self::SeatMapUnavailable(fallback.to_string()),
            ApiError::Cancelled => Self::Cancelled,
            ApiError::Transport(_) | ApiError::Decode(_) => {
                tracing::warn!(%error, "Request failed without a usable answer");
                Self::Transport(fallback.to_string())
            },
        }
    }

    /// Whether the failure came from the owner cancelling
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

//! # Cinepay API
//!
//! Client for the cinema backend used by the checkout flow.
//!
//! ## Layers
//!
//! - [`transport`]: the [`Transport`] seam and request/response types
//! - [`client`]: reqwest transport plus bearer injection with 401 recovery
//! - [`session`]: token pair with single-flight refresh
//! - [`fallback`]: ranked candidate endpoints
//! - [`extract`]: ordered extraction strategies for loosely shaped bodies
//! - Services: [`seats`], [`promotion`], [`orders`], [`payment`]
//!
//! ## Example
//!
//! ```ignore
//! use cinepay_api::{ApiStack, ResourceId};
//! use cinepay_core::CancellationToken;
//!
//! let (api, _session) = ApiStack::connect("http://localhost:5000", Duration::from_secs(20), storage)?;
//! let layout = api.seats.fetch(&ResourceId::Numeric(12), &CancellationToken::new()).await?;
//! ```

pub mod client;
pub mod error;
pub mod extract;
pub mod fallback;
pub mod mocks;
pub mod orders;
pub mod payment;
pub mod promotion;
pub mod seats;
pub mod session;
pub mod transport;

pub use client::{AuthenticatedTransport, HttpTransport};
pub use error::ApiError;
pub use extract::ResourceId;
pub use orders::{Order, OrderHistory, OrderRecord, OrderRequest, OrderSubmitter, ServerAmounts, TicketLine};
pub use payment::{PaymentLink, PaymentSession, PaymentSessionManager, SessionRequest};
pub use promotion::{AmountInput, Promotion, PromotionDecision, PromotionValidator};
pub use seats::{Seat, SeatLayout, SeatLayoutProvider, SeatStatus};
pub use session::{AuthError, InMemoryTokenStorage, SessionManager, TokenStorage, Tokens};
pub use transport::{ApiRequest, ApiResponse, Method, Transport};

use std::sync::Arc;
use std::time::Duration;

/// All services wired over one transport
#[derive(Clone, Debug)]
pub struct ApiStack {
    /// Seat layouts
    pub seats: SeatLayoutProvider,
    /// Promotion validation and listing
    pub promotions: PromotionValidator,
    /// Order creation
    pub orders: OrderSubmitter,
    /// Order history
    pub history: OrderHistory,
    /// Payment sessions
    pub payments: PaymentSessionManager,
}

impl ApiStack {
    /// Wire every service over `transport`
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            seats: SeatLayoutProvider::new(Arc::clone(&transport)),
            promotions: PromotionValidator::new(Arc::clone(&transport)),
            orders: OrderSubmitter::new(Arc::clone(&transport)),
            history: OrderHistory::new(Arc::clone(&transport)),
            payments: PaymentSessionManager::new(transport),
        }
    }

    /// Production wiring: HTTP transport with an authenticated session
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] if the HTTP client cannot be built.
    pub fn connect(
        backend_base: &str,
        timeout: Duration,
        storage: Arc<dyn TokenStorage>,
    ) -> Result<(Self, SessionManager), ApiError> {
        let http: Arc<dyn Transport> = Arc::new(HttpTransport::new(backend_base, timeout)?);
        let session = SessionManager::new(storage, Arc::clone(&http));
        let authenticated = AuthenticatedTransport::new(http, session.clone());
        Ok((Self::new(Arc::new(authenticated)), session))
    }
}

//! Dependencies injected into the checkout reducer.

use crate::config::Config;
use cinepay_api::{ApiStack, ResourceId};

/// Environment for the checkout surface
#[derive(Debug, Clone)]
pub struct CheckoutEnvironment {
    /// Backend services
    pub api: ApiStack,
    /// Return URL and provider defaults
    pub config: Config,
    /// Signed-in user, sent along with promotion validation
    pub user_id: Option<ResourceId>,
}

impl CheckoutEnvironment {
    /// Creates a new checkout environment
    #[must_use]
    pub const fn new(api: ApiStack, config: Config) -> Self {
        Self {
            api,
            config,
            user_id: None,
        }
    }

    /// Attach the signed-in user
    #[must_use]
    pub fn with_user(mut self, user_id: ResourceId) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

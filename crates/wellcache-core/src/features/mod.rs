//! Feature services: the cache, the coordinator and the remote store wired
//! together for one signed-in user.

pub mod error;
pub mod feed;
pub mod history;
pub mod plan;

pub use error::FeatureError;
pub use feed::social_feed;
pub use history::HistoryFeature;
pub use plan::PlanFeature;

use std::sync::Arc;

use crate::auth::Session;
use crate::cache::CacheKey;
use crate::config::{Config, TtlPolicy};
use crate::mutation::Coordinator;
use crate::remote::RemoteDataService;

/// Everything a feature service needs. Clone is cheap.
#[derive(Clone)]
pub struct FeatureContext {
    pub remote: Arc<dyn RemoteDataService>,
    pub coordinator: Coordinator,
    pub namespace: String,
    pub user_id: Option<String>,
    pub ttl: TtlPolicy,
}

impl FeatureContext {
    pub fn new(
        remote: Arc<dyn RemoteDataService>,
        coordinator: Coordinator,
        namespace: impl Into<String>,
        user_id: Option<String>,
        ttl: TtlPolicy,
    ) -> Self {
        Self {
            remote,
            coordinator,
            namespace: namespace.into(),
            user_id,
            ttl,
        }
    }

    pub fn from_session(
        remote: Arc<dyn RemoteDataService>,
        coordinator: Coordinator,
        config: &Config,
        session: &Session,
    ) -> Self {
        Self::new(
            remote,
            coordinator,
            config.namespace.clone(),
            session.user_id().map(String::from),
            config.ttls(),
        )
    }

    /// Cache key for `resource`, or `None` when nobody is signed in.
    pub fn key(&self, resource: &str) -> Option<CacheKey> {
        CacheKey::for_user(&self.namespace, self.user_id.as_deref(), resource)
    }

    pub(crate) fn require_user(&self) -> Result<&str, FeatureError> {
        self.user_id.as_deref().ok_or(FeatureError::NotSignedIn)
    }
}

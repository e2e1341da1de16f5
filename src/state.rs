use std::sync::Arc;

use crate::credentials::CredentialCache;
use crate::datalayer::db_ops::LifecycleStatus;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Credential cache whose freshness is reported
    pub cache: CredentialCache,
    /// Lifecycle manager, erased over its connector
    pub lifecycle: Arc<dyn LifecycleStatus>,
}

impl AppState {
    pub fn new(cache: CredentialCache, lifecycle: Arc<dyn LifecycleStatus>) -> Self {
        Self { cache, lifecycle }
    }
}

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::credentials::CredentialCacheConfig;
use crate::datalayer::db_ops::connection_pool::builder::validate_idle_within_open;

/// Connector configuration loaded from the environment
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Connection string; any embedded secret is replaced by issued tokens
    pub database_url: String,
    /// Username used when the connection string carries none
    pub username: Option<String>,
    /// Delay between activating a new pool and closing the old one
    pub grace_period: Duration,
    /// Upper bound on the random delay added to each proactive refresh
    pub refresh_jitter: Duration,
    pub cache: CredentialCacheConfig,
    pub pool: PoolPolicy,
}

/// Limits applied to every pool the lifecycle manager builds.
///
/// A zero duration leaves the pooling layer's own default in place.
/// `max_lifetime` should stay below the credential cache's effective
/// lifetime so pooled connections are recycled before their token ages out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_idle_within_open"))]
pub struct PoolPolicy {
    #[validate(range(min = 1))]
    pub max_open: u32,
    pub max_idle: u32,
    /// Connections kept warm; never more than `max_idle`
    pub min_idle: u32,
    pub max_lifetime: Duration,
    pub max_idle_time: Duration,
    pub acquire_timeout: Duration,
}

use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::warn;
use validator::{Validate, ValidationError};

use crate::credentials::CredentialCacheConfig;
use crate::datalayer::db_ops::constants;
use crate::datalayer::db_ops::constants::{DbConfig, PoolPolicy};
use crate::errors::ConfigError;

/*
This is the default pool policy.
- max_open: 10
- max_idle: 5
- min_idle: 2
- max_lifetime: 10 minutes (below the 14 minute effective token lifetime)
- max_idle_time: 5 minutes
- acquire_timeout: 30 seconds
Every field can be overridden from the environment (DB_POOL_*).
*/
impl Default for PoolPolicy {
    fn default() -> Self {
        Self {
            max_open: constants::env_u32("DB_POOL_MAX_OPEN", 10),
            max_idle: constants::env_u32("DB_POOL_MAX_IDLE", 5),
            min_idle: constants::env_u32("DB_POOL_MIN_IDLE", 2),
            max_lifetime: constants::env_duration_secs(
                "DB_POOL_MAX_LIFETIME_SECS",
                Duration::from_secs(600),
            ),
            max_idle_time: constants::env_duration_secs(
                "DB_POOL_MAX_IDLE_TIME_SECS",
                Duration::from_secs(300),
            ),
            acquire_timeout: constants::env_duration_secs(
                "DB_POOL_ACQUIRE_TIMEOUT_SECS",
                Duration::from_secs(30),
            ),
        }
    }
}

// Builder pattern for PoolPolicy
impl PoolPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_max_open(mut self, max_open: u32) -> Self {
        self.max_open = max_open;
        self
    }

    pub fn set_max_idle(mut self, max_idle: u32) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn set_min_idle(mut self, min_idle: u32) -> Self {
        self.min_idle = min_idle;
        self
    }

    pub fn set_max_lifetime(mut self, max_lifetime: Duration) -> Self {
        self.max_lifetime = max_lifetime;
        self
    }

    pub fn set_max_idle_time(mut self, max_idle_time: Duration) -> Self {
        self.max_idle_time = max_idle_time;
        self
    }

    pub fn set_acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    /// Structural checks plus `max_lifetime < effective_lifetime`.
    pub fn validate_against(&self, effective_lifetime: Duration) -> Result<(), ConfigError> {
        self.validate()?;

        if !self.max_lifetime.is_zero() && self.max_lifetime >= effective_lifetime {
            return Err(ConfigError::PoolLifetimeExceedsToken {
                max_lifetime: self.max_lifetime,
                effective_lifetime,
            });
        }
        Ok(())
    }

    /// Logs a warning instead of failing when the policy and token lifetime
    /// disagree. Returns whether the policy is consistent.
    pub fn check_against(&self, effective_lifetime: Duration) -> bool {
        match self.validate_against(effective_lifetime) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Pool policy is inconsistent with the token lifetime");
                false
            }
        }
    }

    /// Applies every non-zero field to `options`.
    ///
    /// sqlx has no cap on idle connections; `max_idle` bounds the number of
    /// connections kept warm instead, and idle ones beyond that are reaped by
    /// `max_idle_time`.
    pub fn apply(&self, mut options: PgPoolOptions) -> PgPoolOptions {
        if self.max_open > 0 {
            options = options.max_connections(self.max_open);
        }
        let warm = self.min_idle.min(self.max_idle).min(self.max_open);
        if warm > 0 {
            options = options.min_connections(warm);
        }
        if !self.max_lifetime.is_zero() {
            options = options.max_lifetime(self.max_lifetime);
        }
        if !self.max_idle_time.is_zero() {
            options = options.idle_timeout(self.max_idle_time);
        }
        if !self.acquire_timeout.is_zero() {
            options = options.acquire_timeout(self.acquire_timeout);
        }
        options
    }
}

pub fn validate_idle_within_open(policy: &PoolPolicy) -> Result<(), ValidationError> {
    if policy.max_idle > policy.max_open {
        return Err(ValidationError::new("max_idle_exceeds_max_open"));
    }
    Ok(())
}

/*
This is the default connector configuration.
- database_url: DATABASE_URL or a local development DSN
- username: DB_USER, only used when the DSN names no user
- grace_period: 5 seconds (DB_GRACE_PERIOD_SECS)
- refresh_jitter: 10 seconds (TOKEN_REFRESH_JITTER_SECS)
*/
impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: constants::env_string("DATABASE_URL")
                .unwrap_or_else(|| constants::DEFAULT_DATABASE_URL.to_string()),
            username: constants::env_string("DB_USER"),
            grace_period: constants::env_duration_secs(
                "DB_GRACE_PERIOD_SECS",
                constants::DEFAULT_GRACE_PERIOD,
            ),
            refresh_jitter: constants::env_duration_secs(
                "TOKEN_REFRESH_JITTER_SECS",
                Duration::from_secs(10),
            ),
            cache: CredentialCacheConfig::default(),
            pool: PoolPolicy::default(),
        }
    }
}

// Builder pattern for DbConfig
impl DbConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_database_url(mut self, database_url: String) -> Self {
        self.database_url = database_url;
        self
    }

    pub fn set_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Zero falls back to the 5 second default.
    pub fn set_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = if grace_period.is_zero() {
            constants::DEFAULT_GRACE_PERIOD
        } else {
            grace_period
        };
        self
    }

    pub fn set_refresh_jitter(mut self, refresh_jitter: Duration) -> Self {
        self.refresh_jitter = refresh_jitter;
        self
    }

    pub fn set_cache(mut self, cache: CredentialCacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn set_pool(mut self, pool: PoolPolicy) -> Self {
        self.pool = pool;
        self
    }

    /// Validates lifetimes and pool policy, returning the effective token
    /// lifetime.
    pub fn validate(&self) -> Result<Duration, ConfigError> {
        let effective_lifetime = self.cache.effective_lifetime()?;
        self.pool.validate_against(effective_lifetime)?;
        Ok(effective_lifetime)
    }
}

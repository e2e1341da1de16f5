use std::time::Duration;

use crate::errors::credential_errors::CacheError;

/// Errors produced while decomposing or rewriting a connection string.
///
/// These always indicate a configuration mistake, never a transient failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DsnError {
    #[error("connection string is empty")]
    Empty,

    #[error("malformed connection string: {0}")]
    Malformed(String),

    #[error("cannot extract endpoint: no host found in connection string")]
    EndpointNotFound,

    #[error("invalid port in connection string: {0}")]
    InvalidPort(String),

    #[error("username not found in connection string")]
    UsernameNotFound,

    #[error("username not found in connection string and not supplied by configuration")]
    UsernameUnresolved,
}

/// Errors raised while validating credential, pool or service configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("refresh buffer {refresh_buffer:?} must be shorter than token lifetime {token_lifetime:?}")]
    InvalidTokenLifetime {
        token_lifetime: Duration,
        refresh_buffer: Duration,
    },

    #[error("effective token lifetime must be greater than zero")]
    ZeroEffectiveLifetime,

    #[error(
        "pool max lifetime {max_lifetime:?} must be shorter than the effective token lifetime {effective_lifetime:?}"
    )]
    PoolLifetimeExceedsToken {
        max_lifetime: Duration,
        effective_lifetime: Duration,
    },

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    #[error("invalid pool policy: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Errors from building, swapping or retiring connection pools.
///
/// Only `start`/`acquire` hand these to callers; a rotation triggered by a
/// refresh notification logs them and keeps the previous pool.
#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    #[error("failed to build connection pool: {0}")]
    Database(#[from] sqlx::Error),

    #[error("connector failed: {0}")]
    Connector(String),

    #[error("failed to close retired pool: {0}")]
    Close(String),

    #[error(transparent)]
    Dsn(#[from] DsnError),

    #[error("could not obtain credentials: {0}")]
    Credentials(#[from] CacheError),

    #[error("connection lifecycle manager has not been started")]
    NotStarted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_error_display() {
        let error = DsnError::EndpointNotFound;
        assert_eq!(
            error.to_string(),
            "cannot extract endpoint: no host found in connection string"
        );
    }

    #[test]
    fn test_username_errors_are_distinct() {
        let missing = DsnError::UsernameNotFound.to_string();
        let unresolved = DsnError::UsernameUnresolved.to_string();

        assert_ne!(missing, unresolved);
        assert!(unresolved.contains("not supplied by configuration"));
    }

    #[test]
    fn test_token_lifetime_error_mentions_both_durations() {
        let error = ConfigError::InvalidTokenLifetime {
            token_lifetime: Duration::from_secs(60),
            refresh_buffer: Duration::from_secs(120),
        };
        let msg = error.to_string();
        assert!(msg.contains("120s"));
        assert!(msg.contains("60s"));
    }

    #[test]
    fn test_rotation_error_wraps_dsn_error_transparently() {
        let error: RotationError = DsnError::EndpointNotFound.into();
        assert_eq!(error.to_string(), DsnError::EndpointNotFound.to_string());
    }

    #[test]
    fn test_error_source_for_database_variant() {
        use std::error::Error;
        let error = RotationError::Database(sqlx::Error::PoolTimedOut);
        assert!(error.source().is_some());
    }
}

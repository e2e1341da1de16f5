use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::credential_errors::CacheError;
use crate::errors::dberrors::{ConfigError, DsnError, RotationError};

/// Error type for the service's HTTP surface
#[derive(Debug)]
pub enum ServiceError {
    // Credential Errors
    CredentialsUnavailable(String),
    CredentialsStale {
        token_age_secs: u64,
        effective_lifetime_secs: u64,
    },

    // Connection Errors
    PoolUnavailable,
    RotationFailed(String),

    // Configuration Errors
    InvalidDsn(String),
    ConfigurationError(String),

    // Internal Errors
    InternalServerError(String),
}

/// Error response structure sent to clients
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::CredentialsUnavailable(reason) => {
                write!(f, "Database credentials unavailable: {}", reason)
            }
            ServiceError::CredentialsStale {
                token_age_secs,
                effective_lifetime_secs,
            } => write!(
                f,
                "Database token is stale: age {}s exceeds effective lifetime {}s",
                token_age_secs, effective_lifetime_secs
            ),

            ServiceError::PoolUnavailable => write!(f, "No active database connection pool"),
            ServiceError::RotationFailed(reason) => {
                write!(f, "Connection rotation failed: {}", reason)
            }

            ServiceError::InvalidDsn(reason) => write!(f, "Invalid connection string: {}", reason),
            ServiceError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),

            ServiceError::InternalServerError(msg) => write!(f, "Internal server error: {}", msg),
        }
    }
}

impl std::error::Error for ServiceError {}

impl ServiceError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 503 Service Unavailable
            ServiceError::CredentialsUnavailable(_)
            | ServiceError::CredentialsStale { .. }
            | ServiceError::PoolUnavailable
            | ServiceError::RotationFailed(_) => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            ServiceError::InvalidDsn(_)
            | ServiceError::ConfigurationError(_)
            | ServiceError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::CredentialsUnavailable(_) => "CREDENTIALS_UNAVAILABLE",
            ServiceError::CredentialsStale { .. } => "CREDENTIALS_STALE",
            ServiceError::PoolUnavailable => "POOL_UNAVAILABLE",
            ServiceError::RotationFailed(_) => "ROTATION_FAILED",
            ServiceError::InvalidDsn(_) => "INVALID_DSN",
            ServiceError::ConfigurationError(_) => "CONFIGURATION_ERROR",
            ServiceError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Convert error to JSON details for response
    pub fn to_details(&self) -> Option<serde_json::Value> {
        match self {
            ServiceError::CredentialsStale {
                token_age_secs,
                effective_lifetime_secs,
            } => Some(serde_json::json!({
                "token_age_seconds": token_age_secs,
                "effective_lifetime_seconds": effective_lifetime_secs
            })),
            _ => None,
        }
    }
}

/// Implement IntoResponse for Axum integration
impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
                details: self.to_details(),
            },
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<CacheError> for ServiceError {
    fn from(err: CacheError) -> Self {
        ServiceError::CredentialsUnavailable(err.to_string())
    }
}

impl From<RotationError> for ServiceError {
    fn from(err: RotationError) -> Self {
        match err {
            RotationError::NotStarted => ServiceError::PoolUnavailable,
            RotationError::Credentials(e) => ServiceError::CredentialsUnavailable(e.to_string()),
            other => ServiceError::RotationFailed(other.to_string()),
        }
    }
}

impl From<DsnError> for ServiceError {
    fn from(err: DsnError) -> Self {
        ServiceError::InvalidDsn(err.to_string())
    }
}

impl From<ConfigError> for ServiceError {
    fn from(err: ConfigError) -> Self {
        ServiceError::ConfigurationError(err.to_string())
    }
}

/// Conversion from validation errors
impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ConfigurationError(err.to_string())
    }
}

/// Type alias for Results using ServiceError
pub type ServiceResult<T> = Result<T, ServiceError>;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};

use crate::credentials::CredentialStatus;
use crate::datalayer::db_ops::LifecycleSnapshot;
use crate::errors::{ServiceError, ServiceResult};
use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: i64,
    pub credentials: CredentialStatus,
    pub pool: LifecycleSnapshot,
}

/// Health check endpoint handler
///
/// Always 200; `status` is "degraded" when the token is stale or no pool is
/// active. Use `/health/ready` for a gate.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let credentials = state.cache.status();
    let pool = state.lifecycle.snapshot();

    let status = if credentials.fresh && pool.generation.is_some() {
        "healthy"
    } else {
        "degraded"
    };

    let response = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        credentials,
        pool,
    };

    (StatusCode::OK, Json(response))
}

/// Liveness probe endpoint
///
/// Returns 200 OK while the process is running.
pub async fn liveness() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe endpoint
///
/// 503 when the cached token has outlived its effective lifetime or no pool
/// generation is active.
pub async fn readiness(State(state): State<AppState>) -> ServiceResult<StatusCode> {
    let credentials = state.cache.status();
    if !credentials.fresh {
        return Err(ServiceError::CredentialsStale {
            token_age_secs: credentials.token_age_ms / 1000,
            effective_lifetime_secs: credentials.effective_lifetime_ms / 1000,
        });
    }

    if state.lifecycle.snapshot().generation.is_none() {
        return Err(ServiceError::PoolUnavailable);
    }

    Ok(StatusCode::OK)
}

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument, warn};

use crate::controllayer::health;
use crate::errors::ServiceResult;
use crate::state::AppState;

#[instrument(skip_all, fields(service = "health_check"))]
pub async fn health_check(state: State<AppState>) -> impl IntoResponse {
    debug!("Health check request received");
    health::health_check(state).await
}

pub async fn liveness() -> impl IntoResponse {
    health::liveness().await
}

/// Readiness handler; logs why the service is not ready
#[instrument(skip_all, fields(service = "readiness"))]
pub async fn readiness(state: State<AppState>) -> ServiceResult<StatusCode> {
    health::readiness(state).await.map_err(|e| {
        warn!(error = %e, "Service is not ready");
        e
    })
}

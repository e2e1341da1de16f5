use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use iam_db_connector::controllayer::health::HealthResponse;
use iam_db_connector::credentials::{
    CredentialCache, CredentialCacheConfig, Credentials, StaticTokenProvider,
};
use iam_db_connector::datalayer::db_ops::{
    ConnectionLifecycleManager, ManagedPool, PoolConnector, PoolStats,
};
use iam_db_connector::datalayer::dsn::{DsnComponents, parse_dsn};
use iam_db_connector::errors::{ErrorResponse, RotationError};
use iam_db_connector::routes::create_router;
use iam_db_connector::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const SECRET: &str = "iam-issued-secret-token";

struct StubPool;

#[async_trait]
impl ManagedPool for StubPool {
    fn stats(&self) -> PoolStats {
        PoolStats::from_counts(4, 3)
    }

    async fn close(&self) -> Result<(), RotationError> {
        Ok(())
    }
}

struct StubConnector {
    refuse: bool,
}

#[async_trait]
impl PoolConnector for StubConnector {
    type Pool = StubPool;

    async fn connect(
        &self,
        _components: &DsnComponents,
        _credentials: &Credentials,
    ) -> Result<StubPool, RotationError> {
        if self.refuse {
            return Err(RotationError::Connector("database unreachable".to_string()));
        }
        Ok(StubPool)
    }
}

type Manager = Arc<ConnectionLifecycleManager<StubConnector>>;

/// Helper function to create a test router over a stub connector
fn create_test_app(refuse: bool) -> (Router, CredentialCache, Manager) {
    let provider = Arc::new(StaticTokenProvider::new(Credentials::new("app_user", SECRET)));
    let cache = CredentialCache::new(
        provider,
        CredentialCacheConfig::new()
            .set_effective_lifetime(Duration::from_secs(30))
            .set_endpoint("db.example.com:5432"),
    )
    .unwrap();
    let manager = Arc::new(ConnectionLifecycleManager::new(
        StubConnector { refuse },
        parse_dsn("postgres://app_user@db.example.com:5432/app").unwrap(),
        Duration::from_secs(5),
    ));

    let router = create_router(AppState::new(cache.clone(), manager.clone()));
    (router, cache, manager)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, axum::body::Bytes) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body)
}

#[tokio::test]
async fn test_liveness_probe_returns_200_with_no_body() {
    let (app, _, _) = create_test_app(false);

    let (status, body) = get(&app, "/health/live").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.len(), 0);
}

#[tokio::test]
async fn test_health_before_start_is_degraded() {
    let (app, _, _) = create_test_app(false);

    let (status, body) = get(&app, "/health").await;
    let health: HealthResponse = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health.status, "degraded");
    assert!(!health.credentials.fresh);
    assert!(health.pool.generation.is_none());
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_readiness_before_start_reports_stale_credentials() {
    let (app, _, _) = create_test_app(false);

    let (status, body) = get(&app, "/health/ready").await;
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error.error.code, "CREDENTIALS_STALE");
    assert!(error.error.details.is_some());
}

#[tokio::test]
async fn test_started_service_is_healthy_and_ready() {
    let (app, cache, manager) = create_test_app(false);
    let generation = manager.start(&cache).await.unwrap();

    let (status, body) = get(&app, "/health").await;
    let health: HealthResponse = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health.status, "healthy");
    assert!(health.credentials.fresh);
    assert_eq!(health.credentials.username.as_deref(), Some("app_user"));
    assert_eq!(health.pool.generation, Some(generation.id()));
    assert_eq!(health.pool.stats, Some(PoolStats::from_counts(4, 3)));

    let (status, body) = get(&app, "/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.len(), 0);
}

#[tokio::test]
async fn test_health_never_contains_secret() {
    let (app, cache, manager) = create_test_app(false);
    manager.start(&cache).await.unwrap();

    let (_, body) = get(&app, "/health").await;
    let text = String::from_utf8(body.to_vec()).unwrap();

    assert!(!text.contains(SECRET));
    assert!(text.contains(&Credentials::new("app_user", SECRET).fingerprint()));
}

#[tokio::test]
async fn test_readiness_without_pool_reports_pool_unavailable() {
    let (app, cache, manager) = create_test_app(true);
    assert!(manager.start(&cache).await.is_err());

    let (status, body) = get(&app, "/health/ready").await;
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error.error.code, "POOL_UNAVAILABLE");
}

#[tokio::test(start_paused = true)]
async fn test_readiness_fails_once_token_ages_out() {
    let (app, cache, manager) = create_test_app(false);
    manager.start(&cache).await.unwrap();
    assert_eq!(get(&app, "/health/ready").await.0, StatusCode::OK);

    tokio::time::advance(Duration::from_secs(31)).await;

    let (status, body) = get(&app, "/health/ready").await;
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error.error.code, "CREDENTIALS_STALE");

    let details = error.error.details.unwrap();
    assert_eq!(details["token_age_seconds"], 31);
    assert_eq!(details["effective_lifetime_seconds"], 30);
}

#[tokio::test]
async fn test_health_json_content_type() {
    let (app, _, _) = create_test_app(false);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok());
    assert!(content_type.unwrap_or_default().contains("application/json"));
}

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use tracing::{error, info, instrument, warn};

use crate::credentials::Credentials;
use crate::datalayer::db_ops::constants::PoolPolicy;
use crate::datalayer::db_ops::db_health::PoolStats;
use crate::datalayer::dsn::DsnComponents;
use crate::errors::RotationError;

/*
Seams the lifecycle manager is generic over.

A `PoolConnector` turns DSN components plus freshly issued credentials into a
pool; a `ManagedPool` is whatever the connector produced. The manager only
ever reads statistics from a pool and eventually closes it.
*/

/// A connection pool (or connection factory) the lifecycle manager can retire
#[async_trait]
pub trait ManagedPool: Send + Sync + 'static {
    fn stats(&self) -> PoolStats;

    /// Closes the pool, waiting for checked-out connections to return.
    async fn close(&self) -> Result<(), RotationError>;
}

/// Builds pools authenticated with a given set of credentials
#[async_trait]
pub trait PoolConnector: Send + Sync + 'static {
    type Pool: ManagedPool;

    async fn connect(
        &self,
        components: &DsnComponents,
        credentials: &Credentials,
    ) -> Result<Self::Pool, RotationError>;
}

#[async_trait]
impl ManagedPool for PgPool {
    fn stats(&self) -> PoolStats {
        PoolStats::from_counts(self.size(), self.num_idle() as u32)
    }

    async fn close(&self) -> Result<(), RotationError> {
        PgPool::close(self).await;
        Ok(())
    }
}

/// Connector producing sqlx PostgreSQL pools
#[derive(Debug, Clone)]
pub struct PgConnector {
    policy: PoolPolicy,
}

impl PgConnector {
    pub fn new(policy: PoolPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PoolPolicy {
        &self.policy
    }

    /// Connect options for `components` authenticated with `credentials`.
    ///
    /// `sslmode`, `sslrootcert` and `application_name` map to their own
    /// settings; every other option is sent as a server runtime parameter.
    pub fn connect_options(components: &DsnComponents, credentials: &Credentials) -> PgConnectOptions {
        let username = if credentials.username().is_empty() {
            components.username.as_deref().unwrap_or_default()
        } else {
            credentials.username()
        };

        let mut options = PgConnectOptions::new()
            .host(&components.host)
            .port(components.port)
            .username(username)
            .password(credentials.secret());
        if let Some(database) = &components.database {
            options = options.database(database);
        }

        let mut runtime_params = Vec::new();
        for (key, value) in &components.options {
            match key.as_str() {
                "sslmode" => match value.parse::<PgSslMode>() {
                    Ok(mode) => options = options.ssl_mode(mode),
                    Err(_) => warn!(sslmode = %value, "Ignoring unknown sslmode"),
                },
                "sslrootcert" => options = options.ssl_root_cert(value.as_str()),
                "application_name" => options = options.application_name(value),
                _ => runtime_params.push((key.as_str(), value.as_str())),
            }
        }
        if !runtime_params.is_empty() {
            options = options.options(runtime_params);
        }

        options
    }
}

#[async_trait]
impl PoolConnector for PgConnector {
    type Pool = PgPool;

    #[instrument(skip_all, fields(service = "PgConnector", endpoint = %components.endpoint()))]
    async fn connect(
        &self,
        components: &DsnComponents,
        credentials: &Credentials,
    ) -> Result<PgPool, RotationError> {
        info!(
            max_open = self.policy.max_open,
            fingerprint = %credentials.fingerprint(),
            "Creating connection pool"
        );

        let pool = self
            .policy
            .apply(PgPoolOptions::new())
            .connect_with(Self::connect_options(components, credentials))
            .await
            .map_err(|e| {
                error!("Failed to create connection pool: {}", e);
                e
            })?;

        info!("Connection pool created successfully");
        Ok(pool)
    }
}

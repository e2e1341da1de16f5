use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::credentials::{CredentialCache, Credentials, RefreshCallback, RefreshEvent};
use crate::datalayer::db_ops::connection_pool::connection_pool::{ManagedPool, PoolConnector};
use crate::datalayer::db_ops::constants::DEFAULT_GRACE_PERIOD;
use crate::datalayer::db_ops::db_health::{PoolStats, log_pool_stats};
use crate::datalayer::dsn::DsnComponents;
use crate::errors::RotationError;

/// One pool together with the credentials it was built from.
///
/// Handed out as `Arc` so in-flight work keeps its generation alive across a
/// rotation; the pool itself is closed once the grace period has passed.
#[derive(Debug)]
pub struct PoolGeneration<P> {
    id: Uuid,
    pool: P,
    created_at: DateTime<Utc>,
    fingerprint: String,
    endpoint: String,
    sequence: u64,
}

impl<P: ManagedPool> PoolGeneration<P> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Fingerprint of the token this pool authenticates with
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Refresh sequence number of the credentials behind this pool
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Result of a single rotation attempt
#[derive(Debug)]
pub enum RotationOutcome {
    /// New generation is active; `retirement` closes the old pool after the
    /// grace period (absent when there was no previous pool).
    Rotated {
        generation: Uuid,
        retirement: Option<JoinHandle<()>>,
    },
    /// Building the replacement failed; the previous pool stays active.
    Retained { error: RotationError },
    /// The active generation already uses these or newer credentials.
    Superseded { current: Uuid },
}

impl RotationOutcome {
    pub fn is_rotated(&self) -> bool {
        matches!(self, RotationOutcome::Rotated { .. })
    }
}

/// Lifecycle state reported by the health endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleSnapshot {
    pub generation: Option<Uuid>,
    pub created_at: Option<DateTime<Utc>>,
    pub fingerprint: Option<String>,
    pub endpoint: Option<String>,
    pub stats: Option<PoolStats>,
    pub rotations: u64,
    pub failed_rotations: u64,
    pub grace_period_ms: u64,
}

/// Object-safe view of a lifecycle manager, independent of its connector.
pub trait LifecycleStatus: Send + Sync {
    fn snapshot(&self) -> LifecycleSnapshot;
}

/*
Moves the client onto new credentials without interrupting in-flight work.

On every refresh notification:
1. log statistics of the current pool
2. build a replacement pool with the new credentials
3. swap the current reference under the write lock (no I/O while held)
4. spawn a task that sleeps for the grace period and then
5. closes the old pool, logging the outcome

When step 2 fails the current pool is left in place and the next refresh
tries again. Rotations run one at a time; a notification whose sequence is
not newer than the active generation's is dropped, so a late rotation for an
old token never replaces a pool built from a newer one.
*/
pub struct ConnectionLifecycleManager<C: PoolConnector> {
    connector: C,
    components: DsnComponents,
    grace_period: Duration,
    current: RwLock<Option<Arc<PoolGeneration<C::Pool>>>>,
    rotation_gate: tokio::sync::Mutex<()>,
    rotations: AtomicU64,
    failed_rotations: AtomicU64,
}

impl<C: PoolConnector> ConnectionLifecycleManager<C> {
    /// A zero `grace_period` selects the 5 second default.
    pub fn new(connector: C, components: DsnComponents, grace_period: Duration) -> Self {
        let grace_period = if grace_period.is_zero() {
            DEFAULT_GRACE_PERIOD
        } else {
            grace_period
        };

        Self {
            connector,
            components,
            grace_period,
            current: RwLock::new(None),
            rotation_gate: tokio::sync::Mutex::new(()),
            rotations: AtomicU64::new(0),
            failed_rotations: AtomicU64::new(0),
        }
    }

    /// The generation new work should use, if any.
    pub fn current(&self) -> Option<Arc<PoolGeneration<C::Pool>>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn components(&self) -> &DsnComponents {
        &self.components
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Builds the first pool and subscribes to the cache's refresh
    /// notifications.
    ///
    /// Unlike later rotations, a failure here is returned: there is no
    /// previous pool to fall back on.
    pub async fn start(
        self: &Arc<Self>,
        cache: &CredentialCache,
    ) -> Result<Arc<PoolGeneration<C::Pool>>, RotationError> {
        let (credentials, sequence) = cache.get_versioned().await?;

        if let RotationOutcome::Retained { error } = self
            .publish(&credentials, cache.endpoint(), Some(sequence))
            .await
        {
            return Err(error);
        }

        cache.subscribe(self.refresh_callback());
        info!("Connection lifecycle manager started");

        self.current().ok_or(RotationError::NotStarted)
    }

    /// Application path: makes sure credentials are fresh and returns the
    /// generation built from them.
    ///
    /// When the get refreshed the token, the rotation runs inline instead of
    /// waiting for the refresh callback. If that build fails the previous
    /// generation is returned.
    pub async fn acquire(
        &self,
        cache: &CredentialCache,
    ) -> Result<Arc<PoolGeneration<C::Pool>>, RotationError> {
        let (credentials, sequence) = cache.get_versioned().await?;
        let current = self.current().ok_or(RotationError::NotStarted)?;
        if current.sequence >= sequence {
            return Ok(current);
        }

        debug!(
            generation = %current.id,
            sequence,
            "Active pool predates the cached credentials, rotating inline"
        );
        self.publish(&credentials, cache.endpoint(), Some(sequence))
            .await;
        self.current().ok_or(RotationError::NotStarted)
    }

    /// Callback to register with [`CredentialCache::subscribe`].
    ///
    /// Runs the rotation on a spawned task so the refreshing caller is never
    /// blocked. Holds only a weak reference to the manager.
    pub fn refresh_callback(self: &Arc<Self>) -> RefreshCallback {
        let manager = Arc::downgrade(self);

        Arc::new(move |event: &RefreshEvent| {
            let Some(manager) = manager.upgrade() else {
                debug!("Lifecycle manager dropped, ignoring refresh notification");
                return;
            };
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                warn!("No tokio runtime available, skipping pool rotation");
                return;
            };

            let event = event.clone();
            runtime.spawn(async move {
                manager
                    .publish(&event.credentials, &event.endpoint, Some(event.sequence))
                    .await;
            });
        })
    }

    /// Swaps in a pool built from `credentials` and schedules retirement of
    /// the previous one. `endpoint` overrides the configured host and port
    /// when non-empty.
    ///
    /// Manual rotations always replace the active pool; the new generation
    /// keeps the sequence number of the one it replaces.
    pub async fn rotate(&self, credentials: &Credentials, endpoint: &str) -> RotationOutcome {
        self.publish(credentials, endpoint, None).await
    }

    #[instrument(skip_all, fields(service = "ConnectionLifecycleManager", fingerprint = %credentials.fingerprint(), sequence = ?sequence))]
    async fn publish(
        &self,
        credentials: &Credentials,
        endpoint: &str,
        sequence: Option<u64>,
    ) -> RotationOutcome {
        let _gate = self.rotation_gate.lock().await;

        let active = self.current();
        if let (Some(sequence), Some(active)) = (sequence, active.as_ref()) {
            if active.sequence >= sequence {
                debug!(
                    generation = %active.id,
                    active_sequence = active.sequence,
                    sequence,
                    "Active pool is already as new, skipping rotation"
                );
                return RotationOutcome::Superseded { current: active.id };
            }
        }

        match active.as_ref() {
            Some(previous) => log_pool_stats(
                "before_rotation",
                &previous.id.to_string(),
                previous.pool.stats(),
            ),
            None => debug!("No active pool, building the first generation"),
        }

        let components = if endpoint.is_empty() || endpoint == self.components.endpoint() {
            self.components.clone()
        } else {
            match self.components.with_endpoint(endpoint) {
                Ok(components) => components,
                Err(e) => return self.retain(e.into()),
            }
        };

        let pool = match self.connector.connect(&components, credentials).await {
            Ok(pool) => pool,
            Err(e) => return self.retain(e),
        };

        let generation = Arc::new(PoolGeneration {
            id: Uuid::new_v4(),
            pool,
            created_at: Utc::now(),
            fingerprint: credentials.fingerprint(),
            endpoint: components.endpoint(),
            sequence: sequence
                .or_else(|| active.as_ref().map(|previous| previous.sequence))
                .unwrap_or_default(),
        });
        let id = generation.id;

        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(generation);
        self.rotations.fetch_add(1, Ordering::SeqCst);

        info!(
            generation = %id,
            replaced = ?previous.as_ref().map(|p| p.id),
            "Activated new pool generation"
        );

        RotationOutcome::Rotated {
            generation: id,
            retirement: previous.map(|previous| self.schedule_retirement(previous)),
        }
    }

    /// Closes the current pool immediately.
    pub async fn shutdown(&self) {
        let current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(generation) = current else {
            return;
        };
        info!(generation = %generation.id, "Shutting down connection pool...");
        match generation.pool.close().await {
            Ok(()) => info!("Connection pool closed"),
            Err(e) => warn!(error = %e, "Failed to close connection pool on shutdown"),
        }
    }

    fn retain(&self, error: RotationError) -> RotationOutcome {
        self.failed_rotations.fetch_add(1, Ordering::SeqCst);
        error!(
            error = %error,
            "Failed to build replacement pool, current pool stays active until the next refresh"
        );
        RotationOutcome::Retained { error }
    }

    fn schedule_retirement(&self, retired: Arc<PoolGeneration<C::Pool>>) -> JoinHandle<()> {
        let grace_period = self.grace_period;
        debug!(
            generation = %retired.id,
            grace_period_ms = grace_period.as_millis() as u64,
            "Scheduling pool retirement"
        );

        tokio::spawn(async move {
            tokio::time::sleep(grace_period).await;

            log_pool_stats("retiring", &retired.id.to_string(), retired.pool.stats());
            match retired.pool.close().await {
                Ok(()) => info!(generation = %retired.id, "Retired pool closed"),
                Err(e) => warn!(
                    generation = %retired.id,
                    error = %e,
                    "Failed to close retired pool"
                ),
            }
        })
    }
}

impl<C: PoolConnector> LifecycleStatus for ConnectionLifecycleManager<C> {
    fn snapshot(&self) -> LifecycleSnapshot {
        let current = self.current();

        LifecycleSnapshot {
            generation: current.as_ref().map(|g| g.id),
            created_at: current.as_ref().map(|g| g.created_at),
            fingerprint: current.as_ref().map(|g| g.fingerprint.clone()),
            endpoint: current.as_ref().map(|g| g.endpoint.clone()),
            stats: current.as_ref().map(|g| g.pool.stats()),
            rotations: self.rotations.load(Ordering::SeqCst),
            failed_rotations: self.failed_rotations.load(Ordering::SeqCst),
            grace_period_ms: self.grace_period.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    struct CountingPool;

    #[async_trait]
    impl ManagedPool for CountingPool {
        fn stats(&self) -> PoolStats {
            PoolStats::from_counts(1, 1)
        }

        async fn close(&self) -> Result<(), RotationError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingConnector {
        seen_endpoints: std::sync::Mutex<Vec<String>>,
        builds: AtomicU32,
    }

    #[async_trait]
    impl PoolConnector for CountingConnector {
        type Pool = CountingPool;

        async fn connect(
            &self,
            components: &DsnComponents,
            _credentials: &Credentials,
        ) -> Result<CountingPool, RotationError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            self.seen_endpoints
                .lock()
                .unwrap()
                .push(components.endpoint());
            Ok(CountingPool)
        }
    }

    fn components() -> DsnComponents {
        crate::datalayer::dsn::parse_dsn("postgres://app@db.example.com:5432/app").unwrap()
    }

    #[test]
    fn test_zero_grace_period_uses_default() {
        let manager =
            ConnectionLifecycleManager::new(CountingConnector::default(), components(), Duration::ZERO);
        assert_eq!(manager.grace_period(), DEFAULT_GRACE_PERIOD);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_rotation_has_nothing_to_retire() {
        let manager = ConnectionLifecycleManager::new(
            CountingConnector::default(),
            components(),
            Duration::from_secs(1),
        );

        let outcome = manager
            .rotate(&Credentials::new("app", "t1"), "")
            .await;

        match outcome {
            RotationOutcome::Rotated { retirement, .. } => assert!(retirement.is_none()),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(manager.current().is_some());
        assert_eq!(manager.snapshot().rotations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_endpoint_overrides_configured_host() {
        let manager = ConnectionLifecycleManager::new(
            CountingConnector::default(),
            components(),
            Duration::from_secs(1),
        );

        manager
            .rotate(&Credentials::new("app", "t1"), "replica.example.com:6432")
            .await;

        let seen = manager.connector().seen_endpoints.lock().unwrap().clone();
        assert_eq!(seen, vec!["replica.example.com:6432".to_string()]);
        assert_eq!(
            manager.current().unwrap().endpoint(),
            "replica.example.com:6432"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_notification_endpoint_keeps_current_pool() {
        let manager = ConnectionLifecycleManager::new(
            CountingConnector::default(),
            components(),
            Duration::from_secs(1),
        );
        manager.rotate(&Credentials::new("app", "t1"), "").await;
        let before = manager.current().unwrap().id();

        let outcome = manager
            .rotate(&Credentials::new("app", "t2"), "db.example.com:notaport")
            .await;

        assert!(!outcome.is_rotated());
        assert_eq!(manager.current().unwrap().id(), before);
        assert_eq!(manager.snapshot().failed_rotations, 1);
        assert_eq!(manager.connector().builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_clears_current() {
        let manager = ConnectionLifecycleManager::new(
            CountingConnector::default(),
            components(),
            Duration::from_secs(1),
        );
        manager.rotate(&Credentials::new("app", "t1"), "").await;

        manager.shutdown().await;

        assert!(manager.current().is_none());
        assert!(manager.snapshot().generation.is_none());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, instrument, warn};

use crate::credentials::provider::TokenProvider;
use crate::credentials::types::{Credentials, RefreshEvent};
use crate::datalayer::db_ops::constants::env_duration_secs;
use crate::errors::{CacheError, ConfigError, ProviderError};

/// Validity window of an IAM database token.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(15 * 60);
/// Safety margin subtracted from the token lifetime.
pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(60);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Observer invoked synchronously after every successful refresh.
pub type RefreshCallback = Arc<dyn Fn(&RefreshEvent) + Send + Sync>;

/// Configuration of a [`CredentialCache`]
#[derive(Debug, Clone)]
pub struct CredentialCacheConfig {
    /// Total validity of a token issued by the provider
    pub token_lifetime: Duration,
    /// Time before expiry at which a cached token stops being served
    pub refresh_buffer: Duration,
    /// Replaces `token_lifetime - refresh_buffer` outright (tests)
    pub effective_lifetime_override: Option<Duration>,
    /// Upper bound on a single provider call; zero disables the bound
    pub fetch_timeout: Duration,
    /// `host:port` the tokens are issued for, forwarded to refresh callbacks
    pub endpoint: String,
}

/*
Defaults:
- token_lifetime: 15 minutes (TOKEN_LIFETIME_SECS)
- refresh_buffer: 1 minute (TOKEN_REFRESH_BUFFER_SECS)
- fetch_timeout: 30 seconds (TOKEN_FETCH_TIMEOUT_SECS)
*/
impl Default for CredentialCacheConfig {
    fn default() -> Self {
        Self {
            token_lifetime: env_duration_secs("TOKEN_LIFETIME_SECS", DEFAULT_TOKEN_LIFETIME),
            refresh_buffer: env_duration_secs("TOKEN_REFRESH_BUFFER_SECS", DEFAULT_REFRESH_BUFFER),
            effective_lifetime_override: None,
            fetch_timeout: env_duration_secs("TOKEN_FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT),
            endpoint: String::new(),
        }
    }
}

impl CredentialCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_token_lifetime(mut self, token_lifetime: Duration) -> Self {
        self.token_lifetime = token_lifetime;
        self
    }

    pub fn set_refresh_buffer(mut self, refresh_buffer: Duration) -> Self {
        self.refresh_buffer = refresh_buffer;
        self
    }

    pub fn set_effective_lifetime(mut self, effective_lifetime: Duration) -> Self {
        self.effective_lifetime_override = Some(effective_lifetime);
        self
    }

    pub fn set_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn set_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Lifetime during which a cached token is served without a refresh.
    pub fn effective_lifetime(&self) -> Result<Duration, ConfigError> {
        if let Some(effective) = self.effective_lifetime_override {
            if effective.is_zero() {
                return Err(ConfigError::ZeroEffectiveLifetime);
            }
            return Ok(effective);
        }

        if self.refresh_buffer >= self.token_lifetime {
            return Err(ConfigError::InvalidTokenLifetime {
                token_lifetime: self.token_lifetime,
                refresh_buffer: self.refresh_buffer,
            });
        }

        let effective = self.token_lifetime - self.refresh_buffer;
        if effective.is_zero() {
            return Err(ConfigError::ZeroEffectiveLifetime);
        }
        Ok(effective)
    }
}

/// Point-in-time view of the cache, reported by the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialStatus {
    pub fresh: bool,
    pub token_age_ms: u64,
    pub effective_lifetime_ms: u64,
    pub username: Option<String>,
    pub fingerprint: Option<String>,
    pub cached_at: Option<DateTime<Utc>>,
    pub refresh_count: u64,
}

#[derive(Clone)]
struct CachedCredentialEntry {
    credentials: Credentials,
    cached_at: Instant,
    cached_at_utc: DateTime<Utc>,
    sequence: u64,
}

struct CacheInner {
    provider: Arc<dyn TokenProvider>,
    effective_lifetime: Duration,
    fetch_timeout: Duration,
    endpoint: String,
    // credentials and timestamp are only ever written together
    entry: Mutex<Option<CachedCredentialEntry>>,
    refresh_gate: tokio::sync::Mutex<()>,
    callbacks: RwLock<Vec<RefreshCallback>>,
    refresh_count: AtomicU64,
}

/*
TTL cache in front of a token provider.

`get` serves the cached credentials while they are younger than the effective
lifetime and only then goes to the provider. Callers that race past an expired
entry queue on the refresh gate and re-check freshness, so a burst of callers
at expiry results in a single provider call.

The provider call and the store run on a spawned task: dropping the caller's
future stops the wait but never the refresh itself.
*/
#[derive(Clone)]
pub struct CredentialCache {
    inner: Arc<CacheInner>,
}

impl CredentialCache {
    /// Creates a cache over `provider`.
    ///
    /// Fails when the configured lifetimes do not leave a positive
    /// effective lifetime.
    pub fn new(
        provider: Arc<dyn TokenProvider>,
        config: CredentialCacheConfig,
    ) -> Result<Self, ConfigError> {
        let effective_lifetime = config.effective_lifetime()?;

        info!(
            effective_lifetime_secs = effective_lifetime.as_secs_f64(),
            endpoint = %config.endpoint,
            "Creating credential cache"
        );

        Ok(Self {
            inner: Arc::new(CacheInner {
                provider,
                effective_lifetime,
                fetch_timeout: config.fetch_timeout,
                endpoint: config.endpoint,
                entry: Mutex::new(None),
                refresh_gate: tokio::sync::Mutex::new(()),
                callbacks: RwLock::new(Vec::new()),
                refresh_count: AtomicU64::new(0),
            }),
        })
    }

    /// Creates a cache with the default (environment-backed) configuration
    pub fn with_defaults(provider: Arc<dyn TokenProvider>) -> Result<Self, ConfigError> {
        Self::new(provider, CredentialCacheConfig::default())
    }

    /// Returns cached credentials while fresh, otherwise refreshes.
    pub async fn get(&self) -> Result<Credentials, CacheError> {
        self.get_versioned().await.map(|(credentials, _)| credentials)
    }

    /// Like [`get`](Self::get), also returning the refresh sequence number
    /// the credentials were stored under (see [`RefreshEvent::sequence`]).
    pub async fn get_versioned(&self) -> Result<(Credentials, u64), CacheError> {
        if let Some(fresh) = self.inner.fresh_credentials() {
            return Ok(fresh);
        }

        let _gate = self.inner.refresh_gate.lock().await;
        if let Some(fresh) = self.inner.fresh_credentials() {
            debug!("Credentials were refreshed by a concurrent caller");
            return Ok(fresh);
        }

        debug!(
            token_age_ms = self.token_age().as_millis() as u64,
            "Cached credentials are stale or missing, refreshing"
        );
        self.refresh_versioned().await
    }

    /// Fetches new credentials from the provider regardless of freshness.
    ///
    /// On failure the previously cached entry is left untouched.
    pub async fn refresh(&self) -> Result<Credentials, CacheError> {
        self.refresh_versioned()
            .await
            .map(|(credentials, _)| credentials)
    }

    #[instrument(skip(self), fields(service = "CredentialCache"))]
    async fn refresh_versioned(&self) -> Result<(Credentials, u64), CacheError> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.fetch_and_store().await }.in_current_span())
            .await
            .map_err(|e| CacheError::RefreshAborted(e.to_string()))?
    }

    /// Time since the cached credentials were stored, zero if never cached.
    pub fn token_age(&self) -> Duration {
        self.inner
            .lock_entry()
            .as_ref()
            .map(|entry| entry.cached_at.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_fresh(&self) -> bool {
        self.inner.fresh_credentials().is_some()
    }

    pub fn effective_lifetime(&self) -> Duration {
        self.inner.effective_lifetime
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Number of successful provider calls so far
    pub fn refresh_count(&self) -> u64 {
        self.inner.refresh_count.load(Ordering::SeqCst)
    }

    /// Registers an observer for successful refreshes.
    pub fn subscribe(&self, callback: RefreshCallback) {
        self.inner
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }

    pub fn status(&self) -> CredentialStatus {
        let entry = self.inner.lock_entry().clone();
        let token_age = entry
            .as_ref()
            .map(|e| e.cached_at.elapsed())
            .unwrap_or(Duration::ZERO);

        CredentialStatus {
            fresh: entry.is_some() && token_age < self.inner.effective_lifetime,
            token_age_ms: token_age.as_millis() as u64,
            effective_lifetime_ms: self.inner.effective_lifetime.as_millis() as u64,
            username: entry.as_ref().map(|e| e.credentials.username().to_string()),
            fingerprint: entry.as_ref().map(|e| e.credentials.fingerprint()),
            cached_at: entry.as_ref().map(|e| e.cached_at_utc),
            refresh_count: self.refresh_count(),
        }
    }
}

impl std::fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCache")
            .field("effective_lifetime", &self.inner.effective_lifetime)
            .field("endpoint", &self.inner.endpoint)
            .field("token_age", &self.token_age())
            .field("refresh_count", &self.refresh_count())
            .finish()
    }
}

impl CacheInner {
    fn lock_entry(&self) -> MutexGuard<'_, Option<CachedCredentialEntry>> {
        self.entry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fresh_credentials(&self) -> Option<(Credentials, u64)> {
        self.lock_entry()
            .as_ref()
            .filter(|entry| entry.cached_at.elapsed() < self.effective_lifetime)
            .map(|entry| (entry.credentials.clone(), entry.sequence))
    }

    async fn fetch_and_store(&self) -> Result<(Credentials, u64), CacheError> {
        let started = Instant::now();

        let fetched = if self.fetch_timeout.is_zero() {
            self.provider.fetch_token().await
        } else {
            tokio::time::timeout(self.fetch_timeout, self.provider.fetch_token())
                .await
                .unwrap_or(Err(ProviderError::Timeout(self.fetch_timeout)))
        };

        let credentials = match fetched {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!(error = %e, "Token refresh failed, cached credentials left unchanged");
                return Err(e.into());
            }
        };

        // sequence and entry are published under one lock so they agree
        let count = {
            let mut entry = self.lock_entry();
            let count = self.refresh_count.fetch_add(1, Ordering::SeqCst) + 1;
            *entry = Some(CachedCredentialEntry {
                credentials: credentials.clone(),
                cached_at: Instant::now(),
                cached_at_utc: Utc::now(),
                sequence: count,
            });
            count
        };

        info!(
            username = credentials.username(),
            fingerprint = %credentials.fingerprint(),
            latency_ms = started.elapsed().as_millis() as u64,
            refresh_count = count,
            "Credentials refreshed"
        );

        self.notify(&credentials, count);
        Ok((credentials, count))
    }

    fn notify(&self, credentials: &Credentials, sequence: u64) {
        let callbacks = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if callbacks.is_empty() {
            return;
        }

        let event = RefreshEvent {
            credentials: credentials.clone(),
            endpoint: self.endpoint.clone(),
            sequence,
        };
        for callback in callbacks {
            callback(&event);
        }
    }
}

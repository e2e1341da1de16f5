use rand::Rng;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::credentials::cache::CredentialCache;

/*
Proactive refresh timer.

Long-lived idle pools never call `get`, so nothing would rotate them before
their token ages out. The refresher calls `refresh` on a fixed interval (plus
a random jitter so that many instances do not hit the identity provider in
lockstep); every success fans out to the cache's refresh callbacks.

A failed refresh is logged and the loop simply waits for the next tick.
Dropping the refresher without calling `shutdown` also stops the loop.
*/
pub struct CredentialRefresher {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl CredentialRefresher {
    /// Starts the background loop on the current tokio runtime.
    pub fn spawn(cache: CredentialCache, interval: Duration, max_jitter: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        info!(
            interval_secs = interval.as_secs_f64(),
            max_jitter_ms = max_jitter.as_millis() as u64,
            "Starting proactive credential refresher"
        );

        let handle = tokio::spawn(async move {
            loop {
                let delay = interval + jitter(max_jitter);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_rx.changed() => {
                        debug!("Credential refresher received shutdown");
                        break;
                    }
                }

                match cache.refresh().await {
                    Ok(credentials) => debug!(
                        fingerprint = %credentials.fingerprint(),
                        "Proactive credential refresh succeeded"
                    ),
                    Err(e) => warn!(
                        error = %e,
                        "Proactive credential refresh failed, retrying on next tick"
                    ),
                }
            }
            info!("Credential refresher stopped");
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Starts a refresher ticking once per effective lifetime of `cache`.
    pub fn spawn_default(cache: CredentialCache) -> Self {
        let interval = cache.effective_lifetime();
        Self::spawn(cache, interval, Duration::ZERO)
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stops the loop and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Credential refresher task ended abnormally");
        }
    }
}

fn jitter(max_jitter: Duration) -> Duration {
    if max_jitter.is_zero() {
        return Duration::ZERO;
    }
    let max_ms = max_jitter.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

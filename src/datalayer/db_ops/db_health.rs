use serde::{Deserialize, Serialize};
use tracing::info;

/// Connection counts of a single pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub open: u32,
    pub in_use: u32,
    pub idle: u32,
}

impl PoolStats {
    /// Derives `in_use` from the open and idle counts.
    pub fn from_counts(open: u32, idle: u32) -> Self {
        Self {
            open,
            in_use: open.saturating_sub(idle),
            idle,
        }
    }
}

/// Logs pool statistics under `context`, e.g. before a rotation.
pub fn log_pool_stats(context: &str, generation: &str, stats: PoolStats) {
    info!(
        context,
        generation,
        open = stats.open,
        in_use = stats.in_use,
        idle = stats.idle,
        "Pool statistics"
    );
}

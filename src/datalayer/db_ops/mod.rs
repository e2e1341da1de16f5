pub mod connection_pool;
pub mod constants;
pub mod db_health;

pub use crate::datalayer::db_ops::constants::{DbConfig, PoolPolicy};
pub use connection_pool::{
    ConnectionLifecycleManager, LifecycleSnapshot, LifecycleStatus, ManagedPool, PgConnector,
    PoolConnector, PoolGeneration, RotationOutcome,
};
pub use db_health::{PoolStats, log_pool_stats};

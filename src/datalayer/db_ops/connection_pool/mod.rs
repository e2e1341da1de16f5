pub mod builder;
pub mod connection_pool;
pub mod lifecycle;

pub use builder::validate_idle_within_open;
pub use connection_pool::{ManagedPool, PgConnector, PoolConnector};
pub use lifecycle::{
    ConnectionLifecycleManager, LifecycleSnapshot, LifecycleStatus, PoolGeneration,
    RotationOutcome,
};

pub mod db_ops;
pub mod dsn;

pub use db_ops::{ConnectionLifecycleManager, DbConfig, PgConnector, PoolPolicy, PoolStats};
pub use dsn::{DsnComponents, parse_dsn};

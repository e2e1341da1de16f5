pub mod constants;
pub mod env;
pub mod types;
pub use constants::{DEFAULT_DATABASE_URL, DEFAULT_GRACE_PERIOD, DEFAULT_POSTGRES_PORT};
pub use env::{env_duration_secs, env_string, env_u32};
pub use types::{DbConfig, PoolPolicy};

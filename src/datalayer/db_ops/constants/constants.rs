use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "postgres://app_user@localhost:5432/app_db";
pub const DEFAULT_POSTGRES_PORT: u16 = 5432;

// Time an old pool keeps serving in-flight work after a rotation
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

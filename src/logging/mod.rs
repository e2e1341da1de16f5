pub mod subscriber;

pub use subscriber::{LoggingConfig, init_logging};

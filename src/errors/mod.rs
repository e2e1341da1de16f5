pub mod credential_errors;
pub mod dberrors;
pub mod errors;

pub use credential_errors::{CacheError, ProviderError};
pub use dberrors::{ConfigError, DsnError, RotationError};
pub use errors::{ErrorDetail, ErrorResponse, ServiceError, ServiceResult};

pub mod cache;
pub mod provider;
pub mod refresher;
pub mod types;

pub use cache::{
    CredentialCache, CredentialCacheConfig, CredentialStatus, RefreshCallback,
    DEFAULT_REFRESH_BUFFER, DEFAULT_TOKEN_LIFETIME,
};
pub use provider::{FnTokenProvider, StaticTokenProvider, TokenProvider};
pub use refresher::CredentialRefresher;
pub use types::{Credentials, RefreshEvent};

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::credentials::types::Credentials;
use crate::errors::ProviderError;

/// Source of fresh database credentials.
///
/// Implementations perform the actual round trip to the identity system
/// (or a local keystore). The cache only ever calls [`fetch_token`] and
/// treats the call as opaque and fallible.
///
/// [`fetch_token`]: TokenProvider::fetch_token
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self) -> Result<Credentials, ProviderError>;
}

#[async_trait]
impl<T: TokenProvider + ?Sized> TokenProvider for Arc<T> {
    async fn fetch_token(&self) -> Result<Credentials, ProviderError> {
        (**self).fetch_token().await
    }
}

/// Provider that always hands out the same credentials.
///
/// Useful for local development against a password-authenticated database.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    credentials: Credentials,
}

impl StaticTokenProvider {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Pairs `username` with the token in `DB_AUTH_TOKEN`.
    pub fn from_env(username: impl Into<String>) -> Result<Self, ProviderError> {
        let token = std::env::var("DB_AUTH_TOKEN")
            .map_err(|_| ProviderError::MissingCredential("DB_AUTH_TOKEN".to_string()))?;

        Ok(Self::new(Credentials::new(username, token)))
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn fetch_token(&self) -> Result<Credentials, ProviderError> {
        Ok(self.credentials.clone())
    }
}

/// Adapts an async closure into a [`TokenProvider`].
pub struct FnTokenProvider<F> {
    fetch: F,
}

impl<F, Fut> FnTokenProvider<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Credentials, ProviderError>> + Send,
{
    pub fn new(fetch: F) -> Self {
        Self { fetch }
    }
}

#[async_trait]
impl<F, Fut> TokenProvider for FnTokenProvider<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Credentials, ProviderError>> + Send,
{
    async fn fetch_token(&self) -> Result<Credentials, ProviderError> {
        (self.fetch)().await
    }
}

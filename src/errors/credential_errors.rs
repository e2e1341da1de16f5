use std::time::Duration;

/// Failure reported by a token provider.
///
/// The cache propagates these verbatim; it never falls back to a stale token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("token request failed: {0}")]
    Request(String),

    #[error("identity provider rejected the request: {0}")]
    Unauthorized(String),

    #[error("token request timed out after {0:?}")]
    Timeout(Duration),

    #[error("missing credential source: {0}")]
    MissingCredential(String),
}

/// Errors returned by the credential cache.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("credential refresh task aborted: {0}")]
    RefreshAborted(String),
}

impl CacheError {
    /// Returns the provider failure behind this error, if any.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            CacheError::Provider(e) => Some(e),
            CacheError::RefreshAborted(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_is_transparent() {
        let inner = ProviderError::Unauthorized("expired role session".to_string());
        let error = CacheError::from(inner.clone());

        assert_eq!(error.to_string(), inner.to_string());
        assert_eq!(error.provider_error(), Some(&inner));
    }

    #[test]
    fn test_timeout_display() {
        let error = ProviderError::Timeout(Duration::from_secs(30));
        assert_eq!(error.to_string(), "token request timed out after 30s");
    }

    #[test]
    fn test_aborted_has_no_provider_error() {
        let error = CacheError::RefreshAborted("task panicked".to_string());
        assert!(error.provider_error().is_none());
    }
}

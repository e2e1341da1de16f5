use sha2::{Digest, Sha256};
use std::fmt;

/// Number of hex characters of the SHA-256 digest shown in logs.
const FINGERPRINT_LEN: usize = 12;

/// A username plus short-lived secret used to authenticate a connection.
///
/// Produced by a [`TokenProvider`](super::TokenProvider) and never mutated
/// afterwards. Two values are equal when both fields are equal.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    secret: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Short, non-reversible identifier of the secret, safe to log.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.secret)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &format_args!("<redacted:{}>", self.fingerprint()))
            .finish()
    }
}

/// Payload handed to refresh callbacks after every successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshEvent {
    pub credentials: Credentials,
    /// `host:port` the credentials were issued for; empty when unknown.
    pub endpoint: String,
    /// Position of this refresh among all successful refreshes of the cache,
    /// starting at 1. Later refreshes carry larger values.
    pub sequence: u64,
}

/// Hex prefix of the SHA-256 digest of `secret`.
pub fn fingerprint(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(FINGERPRINT_LEN);
    encoded
}

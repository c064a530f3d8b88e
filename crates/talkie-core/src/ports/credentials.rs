//! Credential store port.
//!
//! Credential persistence and the key-entry UI belong to an external
//! collaborator. The pipeline only ever asks "is there a key right
//! now" — absence is a hard precondition failure for synthesis, never
//! a prompt.

use async_trait::async_trait;

/// An opaque synthesis API key.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for the request header.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

// Keys must never end up in logs; Debug shows only the length.
impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiKey(len={})", self.0.len())
    }
}

/// Read access to the stored synthesis credential.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// The current credential, if one is configured.
    async fn get(&self) -> Option<ApiKey>;
}

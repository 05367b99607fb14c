//! API key storage and lookup.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "LDB_API_KEY";

/// A registered client's API key, sent as `X-ClientId`.
#[derive(Clone)]
pub struct ClientId {
    key: SecretString,
}

impl ClientId {
    /// Wrap an API key.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: SecretString::from(key.into()),
        }
    }

    /// Wrap `key` unless it is empty or whitespace.
    pub fn non_empty(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            None
        } else {
            Some(Self::new(key.trim()))
        }
    }

    /// The raw key for the request header.
    ///
    /// This method exposes the secret - use carefully.
    pub fn expose_secret(&self) -> &str {
        self.key.expose_secret()
    }
}

impl std::fmt::Debug for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ClientId").field(&"[REDACTED]").finish()
    }
}

impl PartialEq for ClientId {
    fn eq(&self, other: &Self) -> bool {
        self.expose_secret() == other.expose_secret()
    }
}

impl Eq for ClientId {}

/// Source of the API key, if any.
///
/// Implement this to pull the key from a secrets manager. Returning `None`
/// means the client runs anonymously with the lower quotas.
pub trait ClientIdProvider: Send + Sync {
    /// The key to send, or `None` for anonymous access.
    fn client_id(&self) -> Option<&ClientId>;
}

/// A key held directly in memory.
#[derive(Debug, Clone)]
pub struct StaticClientId {
    client_id: ClientId,
}

impl StaticClientId {
    /// Create a provider for a fixed key.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            client_id: ClientId::new(key),
        }
    }
}

impl ClientIdProvider for StaticClientId {
    fn client_id(&self) -> Option<&ClientId> {
        Some(&self.client_id)
    }
}

impl ClientIdProvider for Option<ClientId> {
    fn client_id(&self) -> Option<&ClientId> {
        self.as_ref()
    }
}

impl<P: ClientIdProvider + ?Sized> ClientIdProvider for Arc<P> {
    fn client_id(&self) -> Option<&ClientId> {
        (**self).client_id()
    }
}

/// A key read once from the environment.
///
/// A missing or blank variable yields an anonymous provider rather than an
/// error.
#[derive(Debug, Clone, Default)]
pub struct EnvClientId {
    client_id: Option<ClientId>,
}

impl EnvClientId {
    /// Read [`API_KEY_ENV`].
    pub fn from_env() -> Self {
        Self::from_env_var(API_KEY_ENV)
    }

    /// Read a custom variable.
    pub fn from_env_var(var: &str) -> Self {
        Self::from_lookup(var, |name| std::env::var(name).ok())
    }

    /// Read `var` through `lookup` instead of the process environment.
    pub fn from_lookup<F>(var: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            client_id: lookup(var).and_then(ClientId::non_empty),
        }
    }

    /// Take the key out of the provider.
    pub fn into_client_id(self) -> Option<ClientId> {
        self.client_id
    }
}

impl ClientIdProvider for EnvClientId {
    fn client_id(&self) -> Option<&ClientId> {
        self.client_id.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_debug_redacted() {
        let id = ClientId::new("super_secret");
        let debug_str = format!("{:?}", id);
        assert!(!debug_str.contains("super_secret"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_static_provider() {
        let provider = StaticClientId::new("key");
        assert_eq!(provider.client_id().unwrap().expose_secret(), "key");
    }

    #[test]
    fn test_blank_env_value_is_anonymous() {
        let provider = EnvClientId::from_lookup(API_KEY_ENV, |_| Some("   ".to_string()));
        assert!(provider.client_id().is_none());

        let provider = EnvClientId::from_lookup(API_KEY_ENV, |_| None);
        assert!(provider.client_id().is_none());
    }

    #[test]
    fn test_env_value_is_trimmed() {
        let provider = EnvClientId::from_lookup(API_KEY_ENV, |name| {
            (name == API_KEY_ENV).then(|| " abc \n".to_string())
        });
        assert_eq!(provider.client_id(), Some(&ClientId::new("abc")));
    }

    #[test]
    fn test_shared_provider() {
        let provider: Arc<dyn ClientIdProvider> = Arc::new(StaticClientId::new("k"));
        assert!(provider.client_id().is_some());
    }
}

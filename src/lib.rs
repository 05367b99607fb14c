//! # LDB API Client
//!
//! A Rust client for the LDB (Bank Danych Lokalnych) statistical REST API
//! with local quota enforcement.
//!
//! ## Features
//!
//! - Async and blocking clients for every LDB endpoint group
//! - Multi-window sliding quota governors that reject calls before they are sent
//! - Quota history persisted across restarts in a small JSON ledger
//! - Transparent pagination and in-memory response caching
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ldb_api_client::{Ldb, LdbConfig};
//! use ldb_api_client::rest::{DataByVariable, FetchOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ldb = Ldb::new(LdbConfig::from_env()?)?;
//!     let client = ldb.client()?;
//!
//!     let data = client
//!         .fetch_all(&DataByVariable::new("60559").year(2021), &FetchOptions::default())
//!         .await?;
//!     println!("{} rows", data.len());
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod rate_limit;
pub mod rest;

use std::sync::Arc;

// Re-export commonly used types at crate root
pub use config::{Language, LdbConfig};
pub use error::LdbError;
pub use rest::{BlockingLdbClient, LdbClient};

use rate_limit::GovernorRegistry;
use rest::{LdbClientBuilder, ResponseCache};

/// Result type alias using LdbError
pub type Result<T> = std::result::Result<T, LdbError>;

/// Application entry point.
///
/// Owns the one [`GovernorRegistry`] (and response cache) an application
/// should have, and hands out clients that all share them. Clients built
/// elsewhere do not see this registry's quota state.
#[derive(Debug, Clone)]
pub struct Ldb {
    config: LdbConfig,
    registry: Arc<GovernorRegistry>,
    cache: Option<Arc<ResponseCache>>,
}

impl Ldb {
    /// Resolve quotas, open the ledger and prepare the shared state.
    pub fn new(config: LdbConfig) -> Result<Self> {
        let registry = Arc::new(GovernorRegistry::from_config(&config)?);
        Ok(Self::with_registry(config, registry))
    }

    /// [`new`](Self::new) with [`LdbConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        Self::new(LdbConfig::from_env()?)
    }

    /// Use an already built registry, e.g. one on a manual clock in tests.
    pub fn with_registry(config: LdbConfig, registry: Arc<GovernorRegistry>) -> Self {
        let cache = config
            .use_cache
            .then(|| Arc::new(ResponseCache::new(config.cache_expire_after)));

        tracing::debug!(
            registered = config.is_registered(),
            language = %config.language,
            cache = cache.is_some(),
            "LDB client state initialized"
        );

        Self {
            config,
            registry,
            cache,
        }
    }

    /// The configuration clients are built from.
    pub fn config(&self) -> &LdbConfig {
        &self.config
    }

    /// The shared quota registry.
    pub fn registry(&self) -> &Arc<GovernorRegistry> {
        &self.registry
    }

    /// A builder preloaded with the configuration and shared state, for
    /// per-client tweaks such as a timeout.
    pub fn client_builder(&self) -> LdbClientBuilder {
        let builder =
            LdbClientBuilder::from_config(&self.config).registry(Arc::clone(&self.registry));
        match &self.cache {
            Some(cache) => builder.cache(Arc::clone(cache)),
            None => builder.use_cache(false),
        }
    }

    /// An async client sharing this application's governors.
    pub fn client(&self) -> Result<LdbClient> {
        self.client_builder().build()
    }

    /// A blocking client sharing this application's governors.
    pub fn blocking_client(&self) -> Result<BlockingLdbClient> {
        self.client_builder().build_blocking()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::LedgerConfig;

    fn config() -> LdbConfig {
        LdbConfig {
            ledger: LedgerConfig {
                enabled: false,
                ..LedgerConfig::default()
            },
            ..LdbConfig::default()
        }
    }

    #[test]
    fn test_clients_share_registry_and_cache() {
        let ldb = Ldb::new(config()).unwrap();
        let first = ldb.client().unwrap();
        let second = ldb.client().unwrap();

        assert!(Arc::ptr_eq(first.registry(), second.registry()));
        assert!(Arc::ptr_eq(first.registry(), ldb.registry()));
        assert!(Arc::ptr_eq(first.cache().unwrap(), second.cache().unwrap()));
    }

    #[test]
    fn test_cache_disabled_by_config() {
        let ldb = Ldb::new(LdbConfig {
            use_cache: false,
            ..config()
        })
        .unwrap();
        assert!(ldb.client().unwrap().cache().is_none());
    }

    #[test]
    fn test_registration_follows_api_key() {
        let ldb = Ldb::new(config().with_api_key("key")).unwrap();
        assert!(ldb.registry().quotas().registered());
        assert!(ldb.config().is_registered());
    }
}

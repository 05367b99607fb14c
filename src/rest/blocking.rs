//! Blocking LDB REST API client.
//!
//! Mirrors [`LdbClient`](crate::rest::LdbClient) on top of
//! `reqwest::blocking`, drawing on the registry's
//! [`SyncRateGovernor`](crate::rate_limit::SyncRateGovernor). Do not use it
//! from inside an async runtime.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::config::Language;
use crate::error::LdbError;
use crate::rate_limit::GovernorRegistry;
use crate::rest::cache::ResponseCache;
use crate::rest::client::{ClientShared, LdbClientBuilder};
use crate::rest::endpoints::Endpoint;
use crate::rest::pagination::{Collected, FetchOptions, PageCursor, process_body};

/// The blocking LDB REST API client.
///
/// # Example
///
/// ```rust,no_run
/// use ldb_api_client::rest::{BlockingLdbClient, Resource};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = BlockingLdbClient::new()?;
///     let metadata = client.fetch_single(&Resource::Years.metadata())?;
///     println!("{metadata}");
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct BlockingLdbClient {
    http_client: reqwest::blocking::Client,
    shared: Arc<ClientShared>,
}

impl BlockingLdbClient {
    /// Create an anonymous client with default settings, drawing on the
    /// process-wide anonymous registry.
    pub fn new() -> Result<Self, LdbError> {
        Self::builder().build_blocking()
    }

    /// Create a new client builder; finish with
    /// [`build_blocking`](LdbClientBuilder::build_blocking).
    pub fn builder() -> LdbClientBuilder {
        LdbClientBuilder::new()
    }

    pub(crate) fn from_parts(
        http_client: reqwest::blocking::Client,
        shared: Arc<ClientShared>,
    ) -> Self {
        Self {
            http_client,
            shared,
        }
    }

    /// The registry whose sync governor this client draws on.
    pub fn registry(&self) -> &Arc<GovernorRegistry> {
        &self.shared.registry
    }

    /// Response language.
    pub fn language(&self) -> Language {
        self.shared.language
    }

    /// API root.
    pub fn base_url(&self) -> &Url {
        &self.shared.base_url
    }

    /// Response cache, when enabled.
    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.shared.cache.as_ref()
    }

    /// Fetch one non-paginated document.
    pub fn fetch_single<E: Endpoint>(&self, endpoint: &E) -> Result<Value, LdbError> {
        let url = self.shared.url_for(endpoint, None)?;
        self.get_json(url)
    }

    /// Fetch one document and deserialize it into `T`.
    pub fn fetch_as<T, E>(&self, endpoint: &E) -> Result<T, LdbError>
    where
        T: DeserializeOwned,
        E: Endpoint,
    {
        Ok(serde_json::from_value(self.fetch_single(endpoint)?)?)
    }

    /// Fetch one non-paginated response and split it into items and metadata.
    pub fn fetch_single_results<E: Endpoint>(
        &self,
        endpoint: &E,
        results_key: &str,
    ) -> Result<Collected, LdbError> {
        Collected::from_response(self.fetch_single(endpoint)?, results_key)
    }

    /// Fetch pages per `options` and merge their items.
    pub fn fetch_all<E: Endpoint>(
        &self,
        endpoint: &E,
        options: &FetchOptions,
    ) -> Result<Collected, LdbError> {
        let mut collected = Collected::default();
        for page in self.pages(endpoint, options)? {
            collected.push_page(page?, &options.results_key)?;
        }

        tracing::debug!(
            path = %endpoint.path(),
            pages = collected.pages,
            items = collected.len(),
            "Fetched paginated results"
        );
        Ok(collected)
    }

    /// Iterate raw pages per `options`, fetching each on demand.
    pub fn pages<E: Endpoint>(
        &self,
        endpoint: &E,
        options: &FetchOptions,
    ) -> Result<Pages<'_>, LdbError> {
        let first = self.shared.url_for(endpoint, Some(options.page_size))?;
        Ok(Pages {
            client: self,
            cursor: PageCursor::new(first, options),
        })
    }

    fn get_json(&self, url: Url) -> Result<Value, LdbError> {
        if let Some(hit) = self.shared.cached(&url) {
            return Ok(hit);
        }

        self.shared.registry.sync_governor().acquire()?;

        tracing::debug!(url = %url, "GET");
        let response = self.http_client.get(url.clone()).send()?;
        let status = response.status().as_u16();
        let body = response.text()?;

        let value = process_body(status, &body)?;
        self.shared.store(&url, &value);
        Ok(value)
    }
}

impl std::fmt::Debug for BlockingLdbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingLdbClient")
            .field("base_url", &self.shared.base_url.as_str())
            .field("language", &self.shared.language)
            .field("registered", &self.shared.registry.quotas().registered())
            .field("cache", &self.shared.cache.is_some())
            .finish()
    }
}

/// Lazy page iterator returned by [`BlockingLdbClient::pages`].
///
/// Yields at most one error, after which it is exhausted.
#[derive(Debug)]
pub struct Pages<'a> {
    client: &'a BlockingLdbClient,
    cursor: PageCursor,
}

impl Iterator for Pages<'_> {
    type Item = Result<Value, LdbError>;

    fn next(&mut self) -> Option<Self::Item> {
        let url = self.cursor.next_url()?;

        let page = match self.client.get_json(url) {
            Ok(page) => page,
            Err(e) => {
                self.cursor.finish();
                return Some(Err(e));
            }
        };

        match self.cursor.accept(&page) {
            Ok(true) => Some(Ok(page)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

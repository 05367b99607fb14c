//! LDB REST API client (async) and the builder shared with the blocking client.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use reqwest_tracing::TracingMiddleware;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::auth::{ClientId, ClientIdProvider};
use crate::config::{DEFAULT_CACHE_EXPIRY, Language, LdbConfig};
use crate::error::LdbError;
use crate::rate_limit::GovernorRegistry;
use crate::rest::blocking::BlockingLdbClient;
use crate::rest::cache::ResponseCache;
use crate::rest::endpoints::{BDL_BASE_URL, Endpoint, endpoint_url};
use crate::rest::pagination::{Collected, FetchOptions, PageCursor, process_body};

/// Header carrying the API key.
pub const CLIENT_ID_HEADER: &str = "x-clientid";

/// A stream of raw pages, as returned by [`LdbClient::pages`].
pub type PageStream = BoxStream<'static, Result<Value, LdbError>>;

/// Settings every clone of a client shares.
#[derive(Debug)]
pub(crate) struct ClientShared {
    pub(crate) base_url: Url,
    pub(crate) language: Language,
    pub(crate) registry: Arc<GovernorRegistry>,
    pub(crate) cache: Option<Arc<ResponseCache>>,
}

impl ClientShared {
    pub(crate) fn url_for<E: Endpoint + ?Sized>(
        &self,
        endpoint: &E,
        page_size: Option<u32>,
    ) -> Result<Url, LdbError> {
        endpoint_url(&self.base_url, endpoint, self.language, page_size)
    }

    pub(crate) fn cached(&self, url: &Url) -> Option<Value> {
        let hit = self.cache.as_ref()?.get(url.as_str())?;
        tracing::trace!(url = %url, "Serving response from cache");
        Some(hit)
    }

    pub(crate) fn store(&self, url: &Url, body: &Value) {
        if let Some(cache) = &self.cache {
            cache.insert(url.as_str(), body.clone());
        }
    }
}

/// The async LDB REST API client.
///
/// Every request that reaches the network first passes the shared
/// [`AsyncRateGovernor`](crate::rate_limit::AsyncRateGovernor); a request that
/// would exceed a quota fails with [`LdbError::QuotaExceeded`] and is never
/// sent. Cloning is cheap and clones share the governor and cache.
///
/// # Example
///
/// ```rust,no_run
/// use ldb_api_client::rest::{FetchOptions, LdbClient, UnitQuery};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = LdbClient::new()?;
///
///     let voivodeships = client
///         .fetch_all(&UnitQuery::units().level(2), &FetchOptions::default())
///         .await?;
///     println!("{} units", voivodeships.len());
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct LdbClient {
    http_client: ClientWithMiddleware,
    shared: Arc<ClientShared>,
}

impl LdbClient {
    /// Create an anonymous client with default settings, drawing on the
    /// process-wide anonymous registry.
    pub fn new() -> Result<Self, LdbError> {
        Self::builder().build()
    }

    /// Create a new client builder.
    pub fn builder() -> LdbClientBuilder {
        LdbClientBuilder::new()
    }

    /// The registry whose async governor this client draws on.
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
    pub async fn fetch_single<E: Endpoint>(&self, endpoint: &E) -> Result<Value, LdbError> {
        let url = self.shared.url_for(endpoint, None)?;
        self.get_json(url).await
    }

    /// Fetch one document and deserialize it into `T`.
    pub async fn fetch_as<T, E>(&self, endpoint: &E) -> Result<T, LdbError>
    where
        T: DeserializeOwned,
        E: Endpoint,
    {
        Ok(serde_json::from_value(self.fetch_single(endpoint).await?)?)
    }

    /// Fetch one non-paginated response and split it into items and metadata.
    pub async fn fetch_single_results<E: Endpoint>(
        &self,
        endpoint: &E,
        results_key: &str,
    ) -> Result<Collected, LdbError> {
        let body = self.fetch_single(endpoint).await?;
        Collected::from_response(body, results_key)
    }

    /// Fetch pages per `options` and merge their items.
    pub async fn fetch_all<E: Endpoint>(
        &self,
        endpoint: &E,
        options: &FetchOptions,
    ) -> Result<Collected, LdbError> {
        let results_key = options.results_key.clone();
        let mut pages = self.pages(endpoint, options)?;
        let mut collected = Collected::default();

        while let Some(page) = pages.try_next().await? {
            collected.push_page(page, &results_key)?;
        }

        tracing::debug!(
            path = %endpoint.path(),
            pages = collected.pages,
            items = collected.len(),
            "Fetched paginated results"
        );
        Ok(collected)
    }

    /// Stream raw pages per `options`.
    ///
    /// Each page is fetched lazily and passes the governor on its own. The
    /// stream ends after the first error.
    pub fn pages<E: Endpoint>(
        &self,
        endpoint: &E,
        options: &FetchOptions,
    ) -> Result<PageStream, LdbError> {
        let first = self.shared.url_for(endpoint, Some(options.page_size))?;
        let cursor = PageCursor::new(first, options);

        let pages = stream::try_unfold((self.clone(), cursor), |(client, cursor)| {
            client.next_page(cursor)
        });

        Ok(pages.boxed())
    }

    async fn next_page(
        self,
        mut cursor: PageCursor,
    ) -> Result<Option<(Value, (LdbClient, PageCursor))>, LdbError> {
        let Some(url) = cursor.next_url() else {
            return Ok(None);
        };

        let page = match self.get_json(url).await {
            Ok(page) => page,
            Err(e) => {
                tracing::debug!(
                    pages = cursor.pages_fetched(),
                    results_key = cursor.results_key(),
                    error = %e,
                    "Pagination aborted"
                );
                return Err(e);
            }
        };

        if cursor.accept(&page)? {
            Ok(Some((page, (self, cursor))))
        } else {
            Ok(None)
        }
    }

    async fn get_json(&self, url: Url) -> Result<Value, LdbError> {
        if let Some(hit) = self.shared.cached(&url) {
            return Ok(hit);
        }

        self.shared.registry.async_governor().acquire().await?;

        tracing::debug!(url = %url, "GET");
        let response = self.http_client.get(url.clone()).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        let value = process_body(status, &body)?;
        self.shared.store(&url, &value);
        Ok(value)
    }
}

impl std::fmt::Debug for LdbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdbClient")
            .field("base_url", &self.shared.base_url.as_str())
            .field("language", &self.shared.language)
            .field("registered", &self.shared.registry.quotas().registered())
            .field("cache", &self.shared.cache.is_some())
            .finish()
    }
}

/// Builder for [`LdbClient`] and [`BlockingLdbClient`].
pub struct LdbClientBuilder {
    base_url: String,
    client_id: Option<ClientId>,
    language: Language,
    registry: Option<Arc<GovernorRegistry>>,
    use_cache: bool,
    cache_ttl: Duration,
    cache: Option<Arc<ResponseCache>>,
    proxy_url: Option<String>,
    proxy_username: Option<String>,
    proxy_password: Option<SecretString>,
    user_agent: Option<String>,
    timeout: Option<Duration>,
    max_retries: u32,
}

impl LdbClientBuilder {
    /// Anonymous, English, cached for an hour, no retries.
    pub fn new() -> Self {
        Self {
            base_url: BDL_BASE_URL.to_string(),
            client_id: None,
            language: Language::default(),
            registry: None,
            use_cache: true,
            cache_ttl: DEFAULT_CACHE_EXPIRY,
            cache: None,
            proxy_url: None,
            proxy_username: None,
            proxy_password: None,
            user_agent: None,
            timeout: None,
            max_retries: 0,
        }
    }

    /// Take every client-level setting from `config`.
    ///
    /// The quota registry is not built here; pass a shared one with
    /// [`registry`](Self::registry).
    pub fn from_config(config: &LdbConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            client_id: config.api_key.clone(),
            language: config.language,
            registry: None,
            use_cache: config.use_cache,
            cache_ttl: config.cache_expire_after,
            cache: None,
            proxy_url: config.proxy_url.clone(),
            proxy_username: config.proxy_username.clone(),
            proxy_password: config.proxy_password.clone(),
            user_agent: None,
            timeout: None,
            max_retries: config.max_retries,
        }
    }

    /// Set the API root.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Send `client_id` as `X-ClientId`.
    pub fn client_id(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    /// Take the API key, if any, from `provider`.
    pub fn client_id_provider(mut self, provider: &dyn ClientIdProvider) -> Self {
        self.client_id = provider.client_id().cloned();
        self
    }

    /// Set the response language.
    pub fn language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// Draw on a shared quota registry.
    ///
    /// Without one the client uses [`GovernorRegistry::process_default`].
    pub fn registry(mut self, registry: Arc<GovernorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Turn response caching on or off.
    pub fn use_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    /// Lifetime of cached responses.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Share an existing response cache. Implies caching is on.
    pub fn cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.use_cache = true;
        self.cache = Some(cache);
        self
    }

    /// Route requests through an HTTP(S) proxy.
    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.proxy_url = Some(url.into());
        self
    }

    /// Basic-auth credentials for the proxy.
    pub fn proxy_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.proxy_username = Some(username.into());
        self.proxy_password = Some(SecretString::from(password.into()));
        self
    }

    /// Override the user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Retries for transient failures (async client only).
    ///
    /// Retried attempts bypass the quota governor.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Build the async client.
    pub fn build(self) -> Result<LdbClient, LdbError> {
        let headers = self.default_headers()?;
        let proxy = self.build_proxy()?;

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(proxy) = proxy {
            builder = builder.proxy(proxy);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let reqwest_client = builder.build()?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(self.max_retries);
        let http_client = ClientBuilder::new(reqwest_client)
            .with(TracingMiddleware::default())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(LdbClient {
            http_client,
            shared: Arc::new(self.into_shared()?),
        })
    }

    /// Build the blocking client.
    ///
    /// Must not be called from within an async runtime.
    pub fn build_blocking(self) -> Result<BlockingLdbClient, LdbError> {
        let headers = self.default_headers()?;
        let proxy = self.build_proxy()?;

        let mut builder = reqwest::blocking::Client::builder().default_headers(headers);
        if let Some(proxy) = proxy {
            builder = builder.proxy(proxy);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        Ok(BlockingLdbClient::from_parts(
            http_client,
            Arc::new(self.into_shared()?),
        ))
    }

    fn default_headers(&self) -> Result<HeaderMap, LdbError> {
        let mut headers = HeaderMap::new();

        let user_agent = self
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("ldb-api-client/{}", env!("CARGO_PKG_VERSION")));
        let header_value = HeaderValue::from_str(&user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static("ldb-api-client"));
        headers.insert(USER_AGENT, header_value);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(client_id) = &self.client_id {
            let mut value = HeaderValue::from_str(client_id.expose_secret()).map_err(|_| {
                LdbError::Config("API key contains characters not allowed in a header".to_string())
            })?;
            value.set_sensitive(true);
            headers.insert(HeaderName::from_static(CLIENT_ID_HEADER), value);
        }

        Ok(headers)
    }

    fn build_proxy(&self) -> Result<Option<reqwest::Proxy>, LdbError> {
        let Some(url) = &self.proxy_url else {
            return Ok(None);
        };

        let mut proxy = reqwest::Proxy::all(url.as_str())?;
        if let (Some(username), Some(password)) = (&self.proxy_username, &self.proxy_password) {
            proxy = proxy.basic_auth(username, password.expose_secret());
        }
        Ok(Some(proxy))
    }

    fn into_shared(self) -> Result<ClientShared, LdbError> {
        let base_url = Url::parse(self.base_url.trim_end_matches('/'))?;
        let registered = self.client_id.is_some();

        let registry = match self.registry {
            Some(registry) => {
                if registry.quotas().registered() != registered {
                    tracing::warn!(
                        registered,
                        registry_registered = registry.quotas().registered(),
                        "Quota registry was resolved for a different registration status"
                    );
                }
                registry
            }
            None => {
                tracing::debug!(registered, "No quota registry given, using the process default");
                GovernorRegistry::process_default(registered)?
            }
        };

        let cache = if self.use_cache {
            Some(
                self.cache
                    .unwrap_or_else(|| Arc::new(ResponseCache::new(self.cache_ttl))),
            )
        } else {
            None
        };

        Ok(ClientShared {
            base_url,
            language: self.language,
            registry,
            cache,
        })
    }
}

impl Default for LdbClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LdbClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdbClientBuilder")
            .field("base_url", &self.base_url)
            .field("has_client_id", &self.client_id.is_some())
            .field("language", &self.language)
            .field("use_cache", &self.use_cache)
            .field("proxy_url", &self.proxy_url)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::QuotaPeriod;

    #[test]
    fn test_default_headers_include_client_id() {
        let builder = LdbClientBuilder::new().client_id(ClientId::new("abc"));
        let headers = builder.default_headers().unwrap();

        assert_eq!(headers.get(CLIENT_ID_HEADER).unwrap(), "abc");
        assert!(headers.get(CLIENT_ID_HEADER).unwrap().is_sensitive());
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/json");
        assert!(
            headers
                .get(USER_AGENT)
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("ldb-api-client/")
        );
    }

    #[test]
    fn test_anonymous_headers_omit_client_id() {
        let headers = LdbClientBuilder::new().default_headers().unwrap();
        assert!(headers.get(CLIENT_ID_HEADER).is_none());
    }

    #[test]
    fn test_default_registry_matches_registration() {
        let client = LdbClient::builder()
            .client_id(ClientId::new("abc"))
            .use_cache(false)
            .build()
            .unwrap();

        assert!(client.registry().quotas().registered());
        assert!(client.cache().is_none());
        assert_eq!(client.base_url().as_str(), "https://bdl.stat.gov.pl/api/v1");
    }

    #[test]
    fn test_default_clients_share_one_budget() {
        let first = LdbClient::builder().use_cache(false).build().unwrap();
        let second = LdbClient::builder().use_cache(false).build().unwrap();
        let blocking = LdbClient::builder()
            .use_cache(false)
            .build_blocking()
            .unwrap();

        assert!(Arc::ptr_eq(first.registry(), second.registry()));
        assert!(Arc::ptr_eq(first.registry(), blocking.registry()));

        let governor = first.registry().sync_governor();
        governor.acquire().unwrap();
        let seen_by_second = second
            .registry()
            .sync_governor()
            .timestamps(QuotaPeriod::Second);
        assert_eq!(seen_by_second, governor.timestamps(QuotaPeriod::Second));
        assert!(!seen_by_second.is_empty());
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let err = LdbClient::builder().base_url("not a url").build().unwrap_err();
        assert!(matches!(err, LdbError::Url(_)));
    }

    #[test]
    fn test_build_proxy_only_when_configured() {
        assert!(LdbClientBuilder::new().build_proxy().unwrap().is_none());

        let builder = LdbClientBuilder::new()
            .proxy("http://proxy.local:3128")
            .proxy_auth("user", "pass");
        assert!(builder.build_proxy().unwrap().is_some());
    }

    #[test]
    fn test_proxy_with_credentials() {
        let client = LdbClient::builder()
            .proxy("http://proxy.local:3128")
            .proxy_auth("user", "pass")
            .build();
        assert!(client.is_ok());
    }
}

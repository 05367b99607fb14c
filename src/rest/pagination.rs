//! Response decoding and page traversal.
//!
//! List endpoints return pages shaped like
//! `{"totalRecords": .., "page": 0, "pageSize": 100, "links": {"next": ..}, "results": [..]}`.
//! The first request carries `page-size`; later requests follow `links.next`
//! verbatim. Traversal stops at the first page with an empty results array,
//! when `next` is missing, or once the page cap is reached.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use url::Url;

use crate::error::{ApiError, LdbError};

/// Default page size sent with the first request.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Default key holding a page's items.
pub const RESULTS_KEY: &str = "results";

/// Page bookkeeping members left out of [`Collected::metadata`].
const PAGE_KEYS: [&str; 3] = ["page", "pageSize", "links"];

/// How far and how wide to paginate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Items per page, sent as `page-size`.
    pub page_size: u32,
    /// Stop after this many non-empty pages. `None` or zero means no cap.
    pub max_pages: Option<u32>,
    /// When false only the first page is fetched.
    pub all_pages: bool,
    /// Member holding each page's items.
    pub results_key: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: None,
            all_pages: true,
            results_key: RESULTS_KEY.to_string(),
        }
    }
}

impl FetchOptions {
    /// Set the page size.
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Cap the number of pages.
    pub fn max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    /// Fetch only the first page.
    pub fn first_page_only(mut self) -> Self {
        self.all_pages = false;
        self
    }

    /// Read items from a member other than `results`.
    pub fn results_key(mut self, key: impl Into<String>) -> Self {
        self.results_key = key.into();
        self
    }

    fn page_cap(&self) -> Option<u32> {
        if !self.all_pages {
            return Some(1);
        }
        self.max_pages.filter(|&cap| cap > 0)
    }
}

/// Items gathered from one or more pages, plus the first page's metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collected {
    /// Items in page order.
    pub results: Vec<Value>,
    /// First page minus the results, `page`, `pageSize` and `links` members.
    pub metadata: Map<String, Value>,
    /// Pages merged into `results`.
    pub pages: u32,
}

impl Collected {
    /// Split a single response into its items and metadata.
    pub fn from_response(body: Value, results_key: &str) -> Result<Self, LdbError> {
        let mut collected = Self::default();
        collected.push_page(body, results_key)?;
        Ok(collected)
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Check if no items were gathered.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// `totalRecords` from the metadata, when the API reported it.
    pub fn total_records(&self) -> Option<u64> {
        self.metadata.get("totalRecords").and_then(Value::as_u64)
    }

    /// Deserialize every item into `T`.
    pub fn deserialize_results<T: DeserializeOwned>(&self) -> Result<Vec<T>, LdbError> {
        self.results
            .iter()
            .map(|item| serde_json::from_value(item.clone()).map_err(LdbError::from))
            .collect()
    }

    /// Append one page. Metadata is taken from the first page only.
    pub(crate) fn push_page(&mut self, body: Value, results_key: &str) -> Result<(), LdbError> {
        let Value::Object(mut members) = body else {
            return Err(missing_key(results_key));
        };
        let results = members
            .remove(results_key)
            .ok_or_else(|| missing_key(results_key))?;

        match results {
            Value::Array(items) => self.results.extend(items),
            Value::Null => {}
            other => {
                return Err(LdbError::InvalidResponse(format!(
                    "'{}' is not an array: {}",
                    results_key, other
                )));
            }
        }

        if self.pages == 0 {
            for key in PAGE_KEYS {
                members.remove(key);
            }
            self.metadata = members;
        }
        self.pages += 1;
        Ok(())
    }
}

/// Where the next page comes from and when to stop.
#[derive(Debug, Clone)]
pub(crate) struct PageCursor {
    results_key: String,
    page_cap: Option<u32>,
    fetched: u32,
    next: Option<Url>,
}

impl PageCursor {
    pub(crate) fn new(first: Url, options: &FetchOptions) -> Self {
        Self {
            results_key: options.results_key.clone(),
            page_cap: options.page_cap(),
            fetched: 0,
            next: Some(first),
        }
    }

    pub(crate) fn results_key(&self) -> &str {
        &self.results_key
    }

    /// URL of the next page, or `None` once traversal is over.
    pub(crate) fn next_url(&self) -> Option<Url> {
        self.next.clone()
    }

    /// Feed a fetched page; returns whether it should be yielded.
    ///
    /// A page without the results member is an error. An empty page ends
    /// traversal and is not yielded.
    pub(crate) fn accept(&mut self, page: &Value) -> Result<bool, LdbError> {
        self.next = None;

        let results = page
            .get(&self.results_key)
            .ok_or_else(|| missing_key(&self.results_key))?;
        let has_items = match results {
            Value::Array(items) => !items.is_empty(),
            Value::Null => false,
            _ => true,
        };
        if !has_items {
            return Ok(false);
        }

        self.fetched += 1;
        if self.page_cap.is_some_and(|cap| self.fetched >= cap) {
            return Ok(true);
        }

        if let Some(next) = next_link(page) {
            self.next = Some(Url::parse(next)?);
        }
        Ok(true)
    }

    /// End traversal early, e.g. after a failed request.
    pub(crate) fn finish(&mut self) {
        self.next = None;
    }

    pub(crate) fn pages_fetched(&self) -> u32 {
        self.fetched
    }
}

/// `links.next` of a page, if present and non-empty.
pub fn next_link(page: &Value) -> Option<&str> {
    page.get("links")
        .and_then(|links| links.get("next"))
        .and_then(Value::as_str)
        .filter(|next| !next.is_empty())
}

/// Turn a raw HTTP response into JSON, mapping failures to errors.
///
/// Non-2xx statuses become [`LdbError::Status`] with the body attached; a body
/// carrying an `error` member becomes [`LdbError::Api`].
pub(crate) fn process_body(status: u16, body: &str) -> Result<Value, LdbError> {
    if !(200..300).contains(&status) {
        return Err(LdbError::Status {
            status,
            body: body.to_string(),
        });
    }

    let value: Value = serde_json::from_str(body).map_err(|e| {
        LdbError::InvalidResponse(format!("Failed to parse response: {}. Body: {}", e, body))
    })?;

    if let Some(api_error) = ApiError::from_body(&value) {
        return Err(LdbError::Api(api_error));
    }
    Ok(value)
}

fn missing_key(key: &str) -> LdbError {
    LdbError::InvalidResponse(format!("Response does not contain key '{}'", key))
}

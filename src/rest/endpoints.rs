//! LDB REST API paths and URL construction.

use std::borrow::Cow;

use serde::Serialize;
use url::Url;

use crate::config::Language;
use crate::error::LdbError;

/// Base URL for the LDB (BDL) REST API.
pub const BDL_BASE_URL: &str = "https://bdl.stat.gov.pl/api/v1";

/// Resource paths relative to the base URL.
pub mod paths {
    /// Years with available data.
    pub const YEARS: &str = "years";
    /// Territorial unit aggregation levels.
    pub const LEVELS: &str = "levels";
    /// API version.
    pub const VERSION: &str = "version";
    /// Subject tree.
    pub const SUBJECTS: &str = "subjects";
    /// Variables.
    pub const VARIABLES: &str = "variables";
    /// Territorial units.
    pub const UNITS: &str = "units";
    /// Territorial unit search.
    pub const UNITS_SEARCH: &str = "units/search";
    /// Statistical localities.
    pub const LOCALITIES: &str = "units/localities";
    /// Statistical locality search.
    pub const LOCALITIES_SEARCH: &str = "units/localities/search";
    /// Data by variable, followed by the variable id.
    pub const DATA_BY_VARIABLE: &str = "data/by-variable";
    /// Data by unit, followed by the unit id.
    pub const DATA_BY_UNIT: &str = "data/by-unit";
    /// Locality data by unit, followed by the unit id.
    pub const DATA_LOCALITIES_BY_UNIT: &str = "data/localities/by-unit";
    /// Data root, used for metadata.
    pub const DATA: &str = "data";
    /// Measure units.
    pub const MEASURES: &str = "measures";
    /// Attributes.
    pub const ATTRIBUTES: &str = "attributes";
    /// Aggregates.
    pub const AGGREGATES: &str = "aggregates";
    /// Suffix of every resource's metadata path.
    pub const METADATA: &str = "metadata";
}

/// A GET request the clients know how to send.
///
/// The serialized form of the value becomes the query string, so path
/// parameters are marked `#[serde(skip)]` and optional filters use
/// `skip_serializing_if`.
pub trait Endpoint: Serialize {
    /// Path relative to the API root, e.g. `units/011212000000`.
    fn path(&self) -> Cow<'_, str>;
}

/// Build the full URL for `endpoint`.
///
/// `page-size` is added when given; `lang` is always appended last.
pub(crate) fn endpoint_url<E>(
    base: &Url,
    endpoint: &E,
    language: Language,
    page_size: Option<u32>,
) -> Result<Url, LdbError>
where
    E: Endpoint + ?Sized,
{
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| LdbError::Config(format!("base URL '{}' cannot hold a path", base)))?;
        segments.pop_if_empty();
        for segment in endpoint.path().split('/').filter(|s| !s.is_empty()) {
            segments.push(segment);
        }
    }

    let query = serde_urlencoded::to_string(endpoint)
        .map_err(|e| LdbError::InvalidRequest(e.to_string()))?;
    url.set_query(if query.is_empty() {
        None
    } else {
        Some(query.as_str())
    });

    {
        let mut pairs = url.query_pairs_mut();
        if let Some(size) = page_size {
            pairs.append_pair("page-size", &size.to_string());
        }
        pairs.append_pair("lang", language.as_str());
    }

    Ok(url)
}

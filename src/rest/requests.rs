//! Typed requests for the LDB endpoint groups.
//!
//! Each request implements [`Endpoint`]; hand it to
//! [`LdbClient::fetch_all`](crate::rest::LdbClient::fetch_all) for paginated
//! lists or [`LdbClient::fetch_single`](crate::rest::LdbClient::fetch_single)
//! for single documents.
//!
//! ```rust
//! use ldb_api_client::rest::{DataByVariable, Endpoint, Resource, UnitQuery};
//!
//! let units = UnitQuery::units().level(2);
//! assert_eq!(units.path(), "units");
//!
//! let data = DataByVariable::new("60559").year(2021).unit_level(2);
//! assert_eq!(data.path(), "data/by-variable/60559");
//!
//! assert_eq!(Resource::Units.metadata().path(), "units/metadata");
//! ```

use std::borrow::Cow;

use serde::ser::{Serialize, SerializeSeq, Serializer};

use crate::rest::endpoints::{Endpoint, paths};

/// Resource families that expose `/{id}` and `/metadata` routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// `/years`
    Years,
    /// `/levels`
    Levels,
    /// `/subjects`
    Subjects,
    /// `/variables`
    Variables,
    /// `/units`
    Units,
    /// `/units/localities`
    Localities,
    /// `/data`
    Data,
    /// `/measures`
    Measures,
    /// `/attributes`
    Attributes,
    /// `/aggregates`
    Aggregates,
}

impl Resource {
    /// Collection path.
    pub fn path(&self) -> &'static str {
        match self {
            Resource::Years => paths::YEARS,
            Resource::Levels => paths::LEVELS,
            Resource::Subjects => paths::SUBJECTS,
            Resource::Variables => paths::VARIABLES,
            Resource::Units => paths::UNITS,
            Resource::Localities => paths::LOCALITIES,
            Resource::Data => paths::DATA,
            Resource::Measures => paths::MEASURES,
            Resource::Attributes => paths::ATTRIBUTES,
            Resource::Aggregates => paths::AGGREGATES,
        }
    }

    /// Request for one item of this resource.
    pub fn get(self, id: impl Into<String>) -> GetById {
        GetById::new(self, id)
    }

    /// Request for this resource's metadata document.
    pub fn metadata(self) -> Metadata {
        Metadata::new(self)
    }
}

/// `GET /{resource}/{id}`
#[derive(Debug, Clone, serde::Serialize)]
pub struct GetById {
    #[serde(skip)]
    resource: Resource,
    #[serde(skip)]
    id: String,
}

impl GetById {
    /// Request item `id` of `resource`.
    pub fn new(resource: Resource, id: impl Into<String>) -> Self {
        Self {
            resource,
            id: id.into(),
        }
    }
}

impl Endpoint for GetById {
    fn path(&self) -> Cow<'_, str> {
        Cow::Owned(format!("{}/{}", self.resource.path(), self.id))
    }
}

/// `GET /{resource}/metadata`
#[derive(Debug, Clone, serde::Serialize)]
pub struct Metadata {
    #[serde(skip)]
    resource: Resource,
}

impl Metadata {
    /// Request the metadata of `resource`.
    pub fn new(resource: Resource) -> Self {
        Self { resource }
    }
}

impl Endpoint for Metadata {
    fn path(&self) -> Cow<'_, str> {
        Cow::Owned(format!("{}/{}", self.resource.path(), paths::METADATA))
    }
}

/// `GET /version`
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct GetVersion {}

impl Endpoint for GetVersion {
    fn path(&self) -> Cow<'_, str> {
        Cow::Borrowed(paths::VERSION)
    }
}

/// A collection whose only filter is the sort order.
///
/// Covers `/years`, `/levels`, `/measures` and `/aggregates`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SortedList {
    #[serde(skip)]
    resource: Resource,
    /// Sort order, e.g. `id`, `-id`, `name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
}

impl SortedList {
    /// List every item of `resource`.
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            sort: None,
        }
    }

    /// Set the sort order.
    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }
}

impl Endpoint for SortedList {
    fn path(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.resource.path())
    }
}

/// `GET /subjects`
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ListSubjects {
    /// Parent subject; top-level subjects when absent.
    #[serde(rename = "parent-id", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Sort order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
}

impl ListSubjects {
    /// Children of `parent_id`.
    pub fn children_of(parent_id: impl Into<String>) -> Self {
        Self {
            parent_id: Some(parent_id.into()),
            sort: None,
        }
    }
}

impl Endpoint for ListSubjects {
    fn path(&self) -> Cow<'_, str> {
        Cow::Borrowed(paths::SUBJECTS)
    }
}

/// `GET /variables`
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ListVariables {
    /// Subject the variables belong to.
    #[serde(rename = "subject-id", skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    /// Category filter.
    #[serde(rename = "category-id", skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    /// Aggregate filter.
    #[serde(rename = "aggregate-id", skip_serializing_if = "Option::is_none")]
    pub aggregate_id: Option<String>,
    /// Name substring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Sort order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
}

impl ListVariables {
    /// Variables of one subject.
    pub fn for_subject(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: Some(subject_id.into()),
            ..Self::default()
        }
    }
}

impl Endpoint for ListVariables {
    fn path(&self) -> Cow<'_, str> {
        Cow::Borrowed(paths::VARIABLES)
    }
}

/// Which unit collection a [`UnitQuery`] targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnitScope {
    /// `/units`
    #[default]
    Units,
    /// `/units/search`
    SearchUnits,
    /// `/units/localities`
    Localities,
    /// `/units/localities/search`
    SearchLocalities,
}

/// Listing or searching territorial units and statistical localities.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct UnitQuery {
    #[serde(skip)]
    scope: UnitScope,
    /// Name substring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Aggregation level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    /// Parent unit.
    #[serde(rename = "parent-id", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Sort order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
}

impl UnitQuery {
    /// `/units`
    pub fn units() -> Self {
        Self::default()
    }

    /// `/units/search?name=...`
    pub fn search_units(name: impl Into<String>) -> Self {
        Self {
            scope: UnitScope::SearchUnits,
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// `/units/localities`
    pub fn localities() -> Self {
        Self {
            scope: UnitScope::Localities,
            ..Self::default()
        }
    }

    /// `/units/localities/search?name=...`
    pub fn search_localities(name: impl Into<String>) -> Self {
        Self {
            scope: UnitScope::SearchLocalities,
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// The targeted collection.
    pub fn scope(&self) -> UnitScope {
        self.scope
    }

    /// Restrict to one aggregation level.
    pub fn level(mut self, level: u8) -> Self {
        self.level = Some(level);
        self
    }

    /// Restrict to children of `parent_id`.
    pub fn parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Set the sort order.
    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }
}

impl Endpoint for UnitQuery {
    fn path(&self) -> Cow<'_, str> {
        Cow::Borrowed(match self.scope {
            UnitScope::Units => paths::UNITS,
            UnitScope::SearchUnits => paths::UNITS_SEARCH,
            UnitScope::Localities => paths::LOCALITIES,
            UnitScope::SearchLocalities => paths::LOCALITIES_SEARCH,
        })
    }
}

/// `GET /data/by-variable/{var-id}`
#[derive(Debug, Clone, serde::Serialize)]
pub struct DataByVariable {
    #[serde(skip)]
    variable_id: String,
    /// Year filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// Aggregation level of the returned units.
    #[serde(rename = "unit-level", skip_serializing_if = "Option::is_none")]
    pub unit_level: Option<u8>,
    /// Parent unit.
    #[serde(rename = "parent-id", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl DataByVariable {
    /// Data for one variable.
    pub fn new(variable_id: impl Into<String>) -> Self {
        Self {
            variable_id: variable_id.into(),
            year: None,
            unit_level: None,
            parent_id: None,
        }
    }

    /// Restrict to one year.
    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    /// Restrict to units of one level.
    pub fn unit_level(mut self, level: u8) -> Self {
        self.unit_level = Some(level);
        self
    }

    /// Restrict to children of `parent_id`.
    pub fn parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

impl Endpoint for DataByVariable {
    fn path(&self) -> Cow<'_, str> {
        Cow::Owned(format!("{}/{}", paths::DATA_BY_VARIABLE, self.variable_id))
    }
}

/// `GET /data/by-unit/{unit-id}?var-id=...`
#[derive(Debug, Clone, serde::Serialize)]
pub struct DataByUnit {
    #[serde(skip)]
    unit_id: String,
    /// Variable to report.
    #[serde(rename = "var-id")]
    pub variable_id: String,
    /// Year filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

impl DataByUnit {
    /// One variable's data for one unit.
    pub fn new(unit_id: impl Into<String>, variable_id: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            variable_id: variable_id.into(),
            year: None,
        }
    }

    /// Restrict to one year.
    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }
}

impl Endpoint for DataByUnit {
    fn path(&self) -> Cow<'_, str> {
        Cow::Owned(format!("{}/{}", paths::DATA_BY_UNIT, self.unit_id))
    }
}

/// `GET /data/by-variable/{var-id}/locality/{locality-id}`
#[derive(Debug, Clone, serde::Serialize)]
pub struct DataByVariableLocality {
    #[serde(skip)]
    variable_id: String,
    #[serde(skip)]
    locality_id: String,
    /// Year filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

impl DataByVariableLocality {
    /// One variable's data within one locality.
    pub fn new(variable_id: impl Into<String>, locality_id: impl Into<String>) -> Self {
        Self {
            variable_id: variable_id.into(),
            locality_id: locality_id.into(),
            year: None,
        }
    }

    /// Restrict to one year.
    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }
}

impl Endpoint for DataByVariableLocality {
    fn path(&self) -> Cow<'_, str> {
        Cow::Owned(format!(
            "{}/{}/locality/{}",
            paths::DATA_BY_VARIABLE,
            self.variable_id,
            self.locality_id
        ))
    }
}

/// `GET /data/localities/by-unit/{unit-id}`
#[derive(Debug, Clone, serde::Serialize)]
pub struct DataLocalitiesByUnit {
    #[serde(skip)]
    unit_id: String,
    /// Variable filter.
    #[serde(rename = "var-id", skip_serializing_if = "Option::is_none")]
    pub variable_id: Option<String>,
    /// Year filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

impl DataLocalitiesByUnit {
    /// Locality data for one unit.
    pub fn new(unit_id: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            variable_id: None,
            year: None,
        }
    }

    /// Restrict to one variable.
    pub fn variable(mut self, variable_id: impl Into<String>) -> Self {
        self.variable_id = Some(variable_id.into());
        self
    }

    /// Restrict to one year.
    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }
}

impl Endpoint for DataLocalitiesByUnit {
    fn path(&self) -> Cow<'_, str> {
        Cow::Owned(format!("{}/{}", paths::DATA_LOCALITIES_BY_UNIT, self.unit_id))
    }
}

/// `GET /attributes`
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ListAttributes {
    /// Variable filter.
    #[serde(rename = "variable-id", skip_serializing_if = "Option::is_none")]
    pub variable_id: Option<String>,
}

impl Endpoint for ListAttributes {
    fn path(&self) -> Cow<'_, str> {
        Cow::Borrowed(paths::ATTRIBUTES)
    }
}

/// Any path with free-form query parameters.
///
/// For filters the typed requests do not model.
#[derive(Debug, Clone, Default)]
pub struct RawEndpoint {
    path: String,
    params: Vec<(String, String)>,
}

impl RawEndpoint {
    /// Request `path` with no parameters.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: Vec::new(),
        }
    }

    /// Append a query parameter. Repeated names are sent repeatedly.
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }
}

impl Serialize for RawEndpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.params.len()))?;
        for pair in &self.params {
            seq.serialize_element(pair)?;
        }
        seq.end()
    }
}

impl Endpoint for RawEndpoint {
    fn path(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.path.trim_matches('/'))
    }
}

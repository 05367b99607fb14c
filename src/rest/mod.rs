//! LDB REST API clients.
//!
//! [`LdbClient`] (async) and [`BlockingLdbClient`] send GET requests to the LDB
//! API after clearing them with the shared quota governors, follow
//! pagination links and cache responses in memory.
//!
//! Requests are typed values implementing [`Endpoint`]; see [`requests`] for
//! the endpoint groups and [`RawEndpoint`] for anything else.

mod blocking;
mod cache;
mod client;
mod endpoints;
mod pagination;
pub mod requests;

pub use blocking::{BlockingLdbClient, Pages};
pub use cache::ResponseCache;
pub use client::{CLIENT_ID_HEADER, LdbClient, LdbClientBuilder, PageStream};
pub use endpoints::{BDL_BASE_URL, Endpoint, paths};
pub use pagination::{Collected, DEFAULT_PAGE_SIZE, FetchOptions, RESULTS_KEY, next_link};
pub use requests::{
    DataByUnit, DataByVariable, DataByVariableLocality, DataLocalitiesByUnit, GetById,
    GetVersion, ListAttributes, ListSubjects, ListVariables, Metadata, RawEndpoint, Resource,
    SortedList, UnitQuery, UnitScope,
};

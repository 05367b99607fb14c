//! Client identification for the LDB API.
//!
//! The LDB API has no request signing. Registered callers send their key in
//! the `X-ClientId` header and receive higher quotas; everyone else is
//! anonymous. This module holds that key without leaking it into logs.

mod client_id;

pub use client_id::{ClientId, ClientIdProvider, EnvClientId, StaticClientId, API_KEY_ENV};

//! Local quota enforcement for the LDB API.
//!
//! The LDB API bounds call counts over several windows at once (per second,
//! per 15 minutes, per 12 hours and per 7 days), with higher limits for
//! callers that send an API key. This module enforces those windows locally so
//! that a process fails fast instead of being throttled or banned remotely.
//!
//! ## Building blocks
//!
//! - [`QuotaTable`]: which periods apply and their limits.
//! - [`SlidingWindowCounter`] / [`QuotaWindows`]: the sliding-window admission
//!   algorithm, all-or-nothing across periods.
//! - [`QuotaLedger`]: call history persisted to a JSON file, so restarts do not
//!   reset the budget.
//! - [`SyncRateGovernor`] / [`AsyncRateGovernor`]: the algorithm behind a
//!   blocking mutex or an async lock.
//! - [`GovernorRegistry`]: the one pair of governors an application shares.
//!
//! ## Example
//!
//! ```rust
//! use ldb_api_client::rate_limit::{AsyncRateGovernor, QuotaTable};
//!
//! # tokio_test::block_on(async {
//! let quotas = QuotaTable::from_entries([(1, 2u32), (900, 100u32)])
//!     .unwrap()
//!     .resolve(false)
//!     .unwrap();
//! let governor = AsyncRateGovernor::new(&quotas, None);
//!
//! governor.acquire().await.unwrap();
//! governor.acquire().await.unwrap();
//! let err = governor.acquire().await.unwrap_err();
//! assert!(err.is_quota_exceeded());
//! # });
//! ```

mod governor;
mod ledger;
mod quota;
mod registry;
mod window;

pub use governor::{AsyncRateGovernor, Clock, GovernorCore, ManualClock, SyncRateGovernor, SystemClock};
pub use ledger::{
    CacheLocation, GovernorKind, LEDGER_FILE_NAME, LedgerConfig, QuotaLedger, ledger_key,
};
pub use quota::{QuotaLimit, QuotaPeriod, QuotaTable, ResolvedQuotas};
pub use registry::GovernorRegistry;
pub use window::{Admission, QuotaWindows, SlidingWindowCounter, WindowSaturated};

/// Published BDL quotas as `(anonymous, registered)` limits.
pub mod limits {
    use super::QuotaLimit;

    /// Calls per second.
    pub const PER_SECOND: QuotaLimit = QuotaLimit::ByRegistration(5, 10);
    /// Calls per 15 minutes.
    pub const PER_15_MINUTES: QuotaLimit = QuotaLimit::ByRegistration(100, 500);
    /// Calls per 12 hours.
    pub const PER_12_HOURS: QuotaLimit = QuotaLimit::ByRegistration(1_000, 5_000);
    /// Calls per 7 days.
    pub const PER_7_DAYS: QuotaLimit = QuotaLimit::ByRegistration(10_000, 50_000);
}

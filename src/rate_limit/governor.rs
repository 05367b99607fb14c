//! Multi-period quota governors.
//!
//! [`GovernorCore`] holds the per-period windows and runs the admission
//! algorithm; it has no locking of its own. Two thin wrappers put it behind a
//! synchronization primitive:
//!
//! - [`SyncRateGovernor`] for OS threads, behind a blocking mutex.
//! - [`AsyncRateGovernor`] for tasks, behind an async mutex. Waiting for that
//!   lock is the only suspension point.
//!
//! Neither governor sleeps. A saturated window is reported immediately as
//! [`LdbError::QuotaExceeded`] and the caller decides how to back off.
//!
//! # Example
//!
//! ```rust
//! use ldb_api_client::rate_limit::{QuotaTable, SyncRateGovernor};
//!
//! let quotas = QuotaTable::from_entries([(1, 2u32)]).unwrap().resolve(false).unwrap();
//! let governor = SyncRateGovernor::new(&quotas, None);
//!
//! governor.acquire().unwrap();
//! governor.acquire().unwrap();
//! assert!(governor.acquire().unwrap_err().is_quota_exceeded());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::LdbError;
use crate::rate_limit::ledger::{GovernorKind, QuotaLedger, ledger_key};
use crate::rate_limit::quota::{QuotaPeriod, ResolvedQuotas};
use crate::rate_limit::window::QuotaWindows;

/// Source of wall-clock time in epoch seconds.
///
/// Implement this trait to drive governors from a controlled clock.
pub trait Clock: Send + Sync {
    /// Current time in seconds since the Unix epoch.
    fn now(&self) -> f64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at `start` epoch seconds.
    pub fn new(start: f64) -> Self {
        Self {
            bits: AtomicU64::new(start.to_bits()),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, now: f64) {
        self.bits.store(now.to_bits(), Ordering::SeqCst);
    }

    /// Move forward by `secs`.
    pub fn advance(&self, secs: f64) {
        let current = f64::from_bits(self.bits.load(Ordering::SeqCst));
        self.set(current + secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

/// Admission state shared by both governor flavours.
#[derive(Debug)]
pub struct GovernorCore {
    kind: GovernorKind,
    registered: bool,
    windows: QuotaWindows,
    ledger: Option<Arc<QuotaLedger>>,
}

impl GovernorCore {
    /// Build the windows for `quotas`, seeded from `ledger` when it is enabled.
    pub fn new(
        kind: GovernorKind,
        quotas: &ResolvedQuotas,
        ledger: Option<Arc<QuotaLedger>>,
    ) -> Self {
        let registered = quotas.registered();
        let windows = match ledger.as_deref().filter(|l| l.is_enabled()) {
            Some(ledger) => QuotaWindows::with_history(quotas, |period| {
                ledger.get(&ledger_key(kind, registered, period))
            }),
            None => QuotaWindows::new(quotas),
        };

        Self {
            kind,
            registered,
            windows,
            ledger,
        }
    }

    /// Admit a call at `now` against every window, then persist the windows.
    ///
    /// The snapshot is written whether or not the call was admitted; a write
    /// failure takes precedence over the admission outcome, and an admitted
    /// call is not rolled back.
    pub fn admit(&mut self, now: f64) -> Result<(), LdbError> {
        let outcome = self.windows.admit(now);
        self.persist()?;

        match outcome {
            Ok(()) => {
                tracing::debug!(kind = ?self.kind, at = now, "Call admitted");
                Ok(())
            }
            Err(saturated) => {
                tracing::warn!(
                    kind = ?self.kind,
                    period = saturated.period.as_secs(),
                    limit = saturated.limit,
                    retry_after_secs = saturated.wait_secs,
                    "Local quota exceeded"
                );
                Err(saturated.into())
            }
        }
    }

    /// Remaining calls per period at `now`.
    pub fn remaining(&self, now: f64) -> Vec<(QuotaPeriod, u32)> {
        self.windows
            .iter()
            .map(|window| (window.period(), window.remaining(now)))
            .collect()
    }

    /// Retained timestamps for one period.
    pub fn timestamps(&self, period: QuotaPeriod) -> Vec<f64> {
        self.windows
            .window(period)
            .map(|window| window.timestamps())
            .unwrap_or_default()
    }

    fn persist(&self) -> Result<(), LdbError> {
        let Some(ledger) = self.ledger.as_deref().filter(|l| l.is_enabled()) else {
            return Ok(());
        };
        ledger.set_many(self.windows.iter().map(|window| {
            (
                ledger_key(self.kind, self.registered, window.period()),
                window.timestamps(),
            )
        }))
    }
}

/// Quota governor for blocking callers.
///
/// A single mutex covers the whole evaluate-and-record sequence, so concurrent
/// threads are admitted one at a time.
pub struct SyncRateGovernor {
    core: parking_lot::Mutex<GovernorCore>,
    clock: Arc<dyn Clock>,
}

impl SyncRateGovernor {
    /// Create a governor on the system clock.
    pub fn new(quotas: &ResolvedQuotas, ledger: Option<Arc<QuotaLedger>>) -> Self {
        Self::with_clock(quotas, ledger, Arc::new(SystemClock))
    }

    /// Create a governor reading time from `clock`.
    pub fn with_clock(
        quotas: &ResolvedQuotas,
        ledger: Option<Arc<QuotaLedger>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            core: parking_lot::Mutex::new(GovernorCore::new(GovernorKind::Sync, quotas, ledger)),
            clock,
        }
    }

    /// Admit one call or fail with [`LdbError::QuotaExceeded`].
    ///
    /// Fails with [`LdbError::Ledger`] if the snapshot cannot be written. An
    /// admitted call stays recorded in memory in that case and keeps counting
    /// against every window.
    pub fn acquire(&self) -> Result<(), LdbError> {
        let mut core = self.core.lock();
        let now = self.clock.now();
        core.admit(now)
    }

    /// Remaining calls per period right now.
    pub fn remaining(&self) -> Vec<(QuotaPeriod, u32)> {
        let core = self.core.lock();
        core.remaining(self.clock.now())
    }

    /// Retained timestamps for one period.
    pub fn timestamps(&self, period: QuotaPeriod) -> Vec<f64> {
        self.core.lock().timestamps(period)
    }
}

impl std::fmt::Debug for SyncRateGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRateGovernor").finish_non_exhaustive()
    }
}

/// Quota governor for async callers.
///
/// Uses one async lock per governor rather than one per period: admission must
/// be all-or-nothing across periods, which needs a single critical section.
pub struct AsyncRateGovernor {
    core: tokio::sync::Mutex<GovernorCore>,
    clock: Arc<dyn Clock>,
}

impl AsyncRateGovernor {
    /// Create a governor on the system clock.
    pub fn new(quotas: &ResolvedQuotas, ledger: Option<Arc<QuotaLedger>>) -> Self {
        Self::with_clock(quotas, ledger, Arc::new(SystemClock))
    }

    /// Create a governor reading time from `clock`.
    pub fn with_clock(
        quotas: &ResolvedQuotas,
        ledger: Option<Arc<QuotaLedger>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            core: tokio::sync::Mutex::new(GovernorCore::new(GovernorKind::Async, quotas, ledger)),
            clock,
        }
    }

    /// Admit one call or fail with [`LdbError::QuotaExceeded`].
    ///
    /// Ledger failures behave as in [`SyncRateGovernor::acquire`].
    ///
    /// With persistence enabled the snapshot is written with blocking file I/O
    /// while the lock is held, so a slow disk stalls the calling worker thread
    /// and every task waiting on this governor.
    pub async fn acquire(&self) -> Result<(), LdbError> {
        let mut core = self.core.lock().await;
        let now = self.clock.now();
        core.admit(now)
    }

    /// Remaining calls per period right now.
    pub async fn remaining(&self) -> Vec<(QuotaPeriod, u32)> {
        let core = self.core.lock().await;
        core.remaining(self.clock.now())
    }

    /// Retained timestamps for one period.
    pub async fn timestamps(&self, period: QuotaPeriod) -> Vec<f64> {
        self.core.lock().await.timestamps(period)
    }
}

impl std::fmt::Debug for AsyncRateGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncRateGovernor").finish_non_exhaustive()
    }
}

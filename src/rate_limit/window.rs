//! Sliding-window call counters.
//!
//! A [`SlidingWindowCounter`] tracks the timestamps of admitted calls for one
//! quota period. [`QuotaWindows`] groups one counter per configured period and
//! makes the admission decision for all of them at once: every window is
//! evaluated first, and the call is recorded only if every window had room.
//!
//! Timestamps are seconds since the Unix epoch as `f64`, the same unit the
//! quota ledger persists.
//!
//! # Example
//!
//! ```rust
//! use ldb_api_client::rate_limit::{QuotaPeriod, SlidingWindowCounter};
//!
//! let mut window = SlidingWindowCounter::new(QuotaPeriod::Second, 2);
//! assert!(window.check(100.0).is_ok());
//! window.record(100.0);
//! window.record(100.2);
//! assert!(window.check(100.5).is_err());
//! assert!(window.check(101.0).is_ok());
//! ```

use std::collections::VecDeque;

use crate::error::LdbError;
use crate::rate_limit::quota::{QuotaPeriod, ResolvedQuotas};

/// A rejected admission for one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSaturated {
    /// Period whose window is full
    pub period: QuotaPeriod,
    /// Limit of that window
    pub limit: u32,
    /// Seconds until the oldest call ages out of the window
    pub wait_secs: f64,
}

impl From<WindowSaturated> for LdbError {
    fn from(saturated: WindowSaturated) -> Self {
        LdbError::QuotaExceeded {
            limit: saturated.limit,
            period: saturated.period.as_secs(),
            retry_after_secs: saturated.wait_secs,
        }
    }
}

/// Call timestamps for a single quota period.
#[derive(Debug, Clone)]
pub struct SlidingWindowCounter {
    period: QuotaPeriod,
    limit: u32,
    /// Chronological, oldest first
    calls: VecDeque<f64>,
}

impl SlidingWindowCounter {
    /// Create an empty counter.
    pub fn new(period: QuotaPeriod, limit: u32) -> Self {
        Self {
            period,
            limit,
            calls: VecDeque::new(),
        }
    }

    /// Create a counter seeded with previously recorded timestamps.
    ///
    /// Non-finite values are dropped and the rest sorted, so a hand-edited
    /// ledger cannot break the chronological order eviction relies on.
    pub fn with_history(period: QuotaPeriod, limit: u32, history: Vec<f64>) -> Self {
        let mut history: Vec<f64> = history.into_iter().filter(|ts| ts.is_finite()).collect();
        history.sort_by(f64::total_cmp);

        Self {
            period,
            limit,
            calls: history.into(),
        }
    }

    /// The period this counter enforces.
    pub fn period(&self) -> QuotaPeriod {
        self.period
    }

    /// The resolved limit for this period.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Drop every call that is `period` seconds old or older.
    ///
    /// The deque is chronological, so this only trims a prefix.
    pub fn evict(&mut self, now: f64) {
        let cutoff = now - self.period.as_secs() as f64;
        while self.calls.front().is_some_and(|&ts| ts <= cutoff) {
            self.calls.pop_front();
        }
    }

    /// Check whether a call at `now` fits, without recording it.
    ///
    /// Usually runs right after [`evict`](Self::evict); stale entries that are
    /// still present are skipped by a binary search, never a scan.
    pub fn check(&self, now: f64) -> Result<(), WindowSaturated> {
        let first_live = self.first_live(now);
        let occupied = self.calls.len() - first_live;

        if occupied < self.limit as usize {
            return Ok(());
        }

        let oldest = self.calls.get(first_live).copied().unwrap_or(now);
        Err(WindowSaturated {
            period: self.period,
            limit: self.limit,
            wait_secs: (self.period.as_secs() as f64 - (now - oldest)).max(0.0),
        })
    }

    /// Append a call at `now`.
    pub fn record(&mut self, now: f64) {
        self.calls.push_back(now);
    }

    /// Evict, check and record in one step for a single window.
    pub fn check_and_record(&mut self, now: f64) -> Result<(), WindowSaturated> {
        self.evict(now);
        self.check(now)?;
        self.record(now);
        Ok(())
    }

    /// Number of calls currently retained.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Check if no calls are retained.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Remaining calls the window admits at `now`.
    pub fn remaining(&self, now: f64) -> u32 {
        let occupied = self.calls.len() - self.first_live(now);
        self.limit
            .saturating_sub(u32::try_from(occupied).unwrap_or(u32::MAX))
    }

    /// Index of the first call still inside the window at `now`.
    fn first_live(&self, now: f64) -> usize {
        let cutoff = now - self.period.as_secs() as f64;
        self.calls.partition_point(|&ts| ts <= cutoff)
    }

    /// Snapshot of retained timestamps, oldest first.
    pub fn timestamps(&self) -> Vec<f64> {
        self.calls.iter().copied().collect()
    }
}

/// Outcome of the evaluation phase: every window had room at `now`.
///
/// Only a value produced by [`QuotaWindows::evaluate`] can be committed.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use = "an admission has no effect until it is committed"]
pub struct Admission {
    now: f64,
}

impl Admission {
    /// Timestamp the call will be recorded at.
    pub fn at(&self) -> f64 {
        self.now
    }
}

/// One sliding window per configured period, admitted atomically.
#[derive(Debug, Clone)]
pub struct QuotaWindows {
    windows: Vec<SlidingWindowCounter>,
}

impl QuotaWindows {
    /// Create empty windows for every resolved period.
    pub fn new(quotas: &ResolvedQuotas) -> Self {
        Self::with_history(quotas, |_| Vec::new())
    }

    /// Create windows, seeding each from `history(period)`.
    pub fn with_history<F>(quotas: &ResolvedQuotas, mut history: F) -> Self
    where
        F: FnMut(QuotaPeriod) -> Vec<f64>,
    {
        let windows = quotas
            .limits()
            .iter()
            .map(|&(period, limit)| {
                SlidingWindowCounter::with_history(period, limit, history(period))
            })
            .collect();
        Self { windows }
    }

    /// Evict stale calls from every window and check each for room.
    ///
    /// Nothing is recorded. The first saturated window (shortest period
    /// first) is reported.
    pub fn evaluate(&mut self, now: f64) -> Result<Admission, WindowSaturated> {
        for window in &mut self.windows {
            window.evict(now);
        }
        for window in &self.windows {
            window.check(now)?;
        }
        Ok(Admission { now })
    }

    /// Record an evaluated call in every window.
    pub fn commit(&mut self, admission: Admission) {
        for window in &mut self.windows {
            window.record(admission.now);
        }
    }

    /// Evaluate and, if every window has room, commit.
    pub fn admit(&mut self, now: f64) -> Result<(), WindowSaturated> {
        let admission = self.evaluate(now)?;
        self.commit(admission);
        Ok(())
    }

    /// Iterate the per-period counters, shortest period first.
    pub fn iter(&self) -> impl Iterator<Item = &SlidingWindowCounter> {
        self.windows.iter()
    }

    /// Counter for a single period.
    pub fn window(&self, period: QuotaPeriod) -> Option<&SlidingWindowCounter> {
        self.windows.iter().find(|window| window.period() == period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::quota::QuotaTable;

    fn windows(entries: &[(u64, u32)]) -> QuotaWindows {
        let table = QuotaTable::from_entries(entries.iter().copied()).unwrap();
        QuotaWindows::new(&table.resolve(false).unwrap())
    }

    #[test]
    fn test_window_allows_within_limit() {
        let mut window = SlidingWindowCounter::new(QuotaPeriod::Second, 3);

        assert!(window.check_and_record(10.0).is_ok());
        assert!(window.check_and_record(10.1).is_ok());
        assert!(window.check_and_record(10.2).is_ok());
        let err = window.check_and_record(10.3).unwrap_err();
        assert_eq!(err.limit, 3);
        assert_eq!(err.period, QuotaPeriod::Second);
        assert!((err.wait_secs - 0.7).abs() < 1e-9);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_entry_exactly_one_period_old_is_evicted() {
        let mut window = SlidingWindowCounter::new(QuotaPeriod::Second, 1);

        window.check_and_record(10.0).unwrap();
        assert!(window.check_and_record(10.5).is_err());
        assert!(window.check_and_record(11.0).is_ok());
        assert_eq!(window.timestamps(), vec![11.0]);
    }

    #[test]
    fn test_history_is_sorted_and_filtered() {
        let window = SlidingWindowCounter::with_history(
            QuotaPeriod::FifteenMinutes,
            10,
            vec![5.0, f64::NAN, 1.0, 3.0],
        );
        assert_eq!(window.timestamps(), vec![1.0, 3.0, 5.0]);
        assert_eq!(window.remaining(6.0), 7);
    }

    #[test]
    fn test_failed_admission_records_nothing() {
        let mut quota = windows(&[(1, 2), (900, 100)]);
        quota.admit(0.0).unwrap();
        quota.admit(0.1).unwrap();

        let err = quota.admit(0.2).unwrap_err();
        assert_eq!(err.period, QuotaPeriod::Second);
        assert_eq!(err.limit, 2);

        assert_eq!(quota.window(QuotaPeriod::Second).unwrap().len(), 2);
        assert_eq!(quota.window(QuotaPeriod::FifteenMinutes).unwrap().len(), 2);
    }

    #[test]
    fn test_longer_window_failure_leaves_shorter_untouched() {
        let mut quota = windows(&[(1, 5), (900, 2)]);
        quota.admit(0.0).unwrap();
        quota.admit(2.0).unwrap();

        let err = quota.admit(4.0).unwrap_err();
        assert_eq!(err.period, QuotaPeriod::FifteenMinutes);
        assert!((err.wait_secs - 896.0).abs() < 1e-9);

        // Shorter window evicted its stale entries but gained nothing.
        assert_eq!(quota.window(QuotaPeriod::Second).unwrap().len(), 0);
        assert_eq!(quota.window(QuotaPeriod::FifteenMinutes).unwrap().len(), 2);
    }

    #[test]
    fn test_occupancy_never_exceeds_limit() {
        let mut quota = windows(&[(1, 3), (900, 20)]);
        let mut now = 0.0;
        for step in 0..200 {
            now += if step % 7 == 0 { 0.45 } else { 0.05 };
            let _ = quota.admit(now);
            for window in quota.iter() {
                assert!(window.len() <= window.limit() as usize);
                assert!(
                    window
                        .timestamps()
                        .iter()
                        .all(|&ts| ts > now - window.period().as_secs() as f64)
                );
            }
        }
    }

    #[test]
    fn test_check_counts_only_live_calls_without_eviction() {
        let history: Vec<f64> = (0..50_000).map(|i| i as f64 * 0.01).collect();
        let window = SlidingWindowCounter::with_history(QuotaPeriod::SevenDays, 50_000, history);

        // Full at 400s; a week after the first call one slot has aged out.
        let err = window.check(400.0).unwrap_err();
        assert!((err.wait_secs - (604_800.0 - 400.0)).abs() < 1e-6);
        assert_eq!(window.remaining(400.0), 0);

        let later = 604_800.0 + 0.005;
        assert!(window.check(later).is_ok());
        assert_eq!(window.remaining(later), 1);
        assert_eq!(window.len(), 50_000);
    }
}

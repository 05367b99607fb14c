//! Quota tables: which windows apply and how many calls each admits.
//!
//! A [`QuotaTable`] maps a [`QuotaPeriod`] to a [`QuotaLimit`]. A limit is
//! either fixed or depends on whether the caller presents an API key; the
//! table is resolved into plain integers exactly once, when a governor is
//! built, producing [`ResolvedQuotas`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LdbError;
use crate::rate_limit::limits;

/// A recognized quota window length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QuotaPeriod {
    /// 1 second
    Second,
    /// 15 minutes
    FifteenMinutes,
    /// 12 hours
    TwelveHours,
    /// 7 days
    SevenDays,
}

impl QuotaPeriod {
    /// All recognized periods, shortest first.
    pub const ALL: [QuotaPeriod; 4] = [
        QuotaPeriod::Second,
        QuotaPeriod::FifteenMinutes,
        QuotaPeriod::TwelveHours,
        QuotaPeriod::SevenDays,
    ];

    /// Length of the window in seconds.
    pub fn as_secs(&self) -> u64 {
        match self {
            QuotaPeriod::Second => 1,
            QuotaPeriod::FifteenMinutes => 900,
            QuotaPeriod::TwelveHours => 43_200,
            QuotaPeriod::SevenDays => 604_800,
        }
    }

    /// Look up a period by its length in seconds.
    pub fn from_secs(secs: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|period| period.as_secs() == secs)
    }
}

impl fmt::Display for QuotaPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_secs())
    }
}

impl TryFrom<u64> for QuotaPeriod {
    type Error = LdbError;

    fn try_from(secs: u64) -> Result<Self, Self::Error> {
        Self::from_secs(secs).ok_or_else(|| {
            LdbError::InvalidQuota(format!(
                "unsupported quota period {}s (expected one of 1, 900, 43200, 604800)",
                secs
            ))
        })
    }
}

/// The limit configured for one period.
///
/// In JSON a fixed limit is a bare integer and a registration-dependent one is
/// a two-element array `[anonymous, registered]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuotaLimit {
    /// Same limit for every caller.
    Fixed(u32),
    /// Limit chosen by registration status.
    ByRegistration(u32, u32),
}

impl QuotaLimit {
    /// Pick the effective limit for an anonymous or registered caller.
    pub fn resolve(&self, registered: bool) -> u32 {
        match *self {
            QuotaLimit::Fixed(limit) => limit,
            QuotaLimit::ByRegistration(anonymous, registered_limit) => {
                if registered {
                    registered_limit
                } else {
                    anonymous
                }
            }
        }
    }

    fn validate(&self, period: QuotaPeriod) -> Result<(), LdbError> {
        let zero = match *self {
            QuotaLimit::Fixed(limit) => limit == 0,
            QuotaLimit::ByRegistration(anonymous, registered) => anonymous == 0 || registered == 0,
        };
        if zero {
            return Err(LdbError::InvalidQuota(format!(
                "limit for period {}s must be a positive integer",
                period
            )));
        }
        Ok(())
    }
}

impl From<u32> for QuotaLimit {
    fn from(limit: u32) -> Self {
        QuotaLimit::Fixed(limit)
    }
}

impl From<(u32, u32)> for QuotaLimit {
    fn from((anonymous, registered): (u32, u32)) -> Self {
        QuotaLimit::ByRegistration(anonymous, registered)
    }
}

/// Mapping from quota period to its configured limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaTable {
    entries: BTreeMap<QuotaPeriod, QuotaLimit>,
}

impl QuotaTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The published BDL quotas, `(anonymous, registered)` per period.
    pub fn bdl_defaults() -> Self {
        Self::new()
            .with(QuotaPeriod::Second, limits::PER_SECOND)
            .with(QuotaPeriod::FifteenMinutes, limits::PER_15_MINUTES)
            .with(QuotaPeriod::TwelveHours, limits::PER_12_HOURS)
            .with(QuotaPeriod::SevenDays, limits::PER_7_DAYS)
    }

    /// Build a table from raw `(seconds, limit)` pairs, rejecting unknown
    /// periods and zero limits.
    pub fn from_entries<I, L>(entries: I) -> Result<Self, LdbError>
    where
        I: IntoIterator<Item = (u64, L)>,
        L: Into<QuotaLimit>,
    {
        let mut table = Self::new();
        for (secs, limit) in entries {
            let period = QuotaPeriod::try_from(secs)?;
            let limit = limit.into();
            limit.validate(period)?;
            table.entries.insert(period, limit);
        }
        Ok(table)
    }

    /// Parse a JSON object such as `{"1": 10, "900": [100, 500]}`.
    pub fn from_json(raw: &str) -> Result<Self, LdbError> {
        let parsed: BTreeMap<String, QuotaLimit> = serde_json::from_str(raw)
            .map_err(|e| LdbError::InvalidQuota(format!("malformed quota table: {}", e)))?;

        let mut entries = Vec::with_capacity(parsed.len());
        for (key, limit) in parsed {
            let secs = key.trim().parse::<u64>().map_err(|_| {
                LdbError::InvalidQuota(format!("quota period '{}' is not an integer", key))
            })?;
            entries.push((secs, limit));
        }
        Self::from_entries(entries)
    }

    /// Add or replace one entry.
    pub fn with(mut self, period: QuotaPeriod, limit: impl Into<QuotaLimit>) -> Self {
        self.entries.insert(period, limit.into());
        self
    }

    /// Overlay `overrides` on this table, entry by entry.
    pub fn merged_with(mut self, overrides: &QuotaTable) -> Self {
        for (period, limit) in &overrides.entries {
            self.entries.insert(*period, *limit);
        }
        self
    }

    /// Get the configured limit for a period.
    pub fn get(&self, period: QuotaPeriod) -> Option<QuotaLimit> {
        self.entries.get(&period).copied()
    }

    /// Number of configured periods.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no periods are configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries, shortest period first.
    pub fn iter(&self) -> impl Iterator<Item = (QuotaPeriod, QuotaLimit)> + '_ {
        self.entries.iter().map(|(period, limit)| (*period, *limit))
    }

    /// Resolve every entry to a plain limit for the given caller.
    pub fn resolve(&self, registered: bool) -> Result<ResolvedQuotas, LdbError> {
        if self.entries.is_empty() {
            return Err(LdbError::InvalidQuota(
                "quota table must configure at least one period".to_string(),
            ));
        }

        let mut limits = Vec::with_capacity(self.entries.len());
        for (period, limit) in &self.entries {
            limit.validate(*period)?;
            limits.push((*period, limit.resolve(registered)));
        }

        Ok(ResolvedQuotas { registered, limits })
    }
}

/// A quota table resolved for one caller: plain integer limits per period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedQuotas {
    registered: bool,
    limits: Vec<(QuotaPeriod, u32)>,
}

impl ResolvedQuotas {
    /// Whether these limits were resolved for a registered caller.
    pub fn registered(&self) -> bool {
        self.registered
    }

    /// Period/limit pairs, shortest period first.
    pub fn limits(&self) -> &[(QuotaPeriod, u32)] {
        &self.limits
    }

    /// The resolved limit for a period, if configured.
    pub fn limit(&self, period: QuotaPeriod) -> Option<u32> {
        self.limits
            .iter()
            .find(|(p, _)| *p == period)
            .map(|(_, limit)| *limit)
    }
}

//! The per-application pair of governors.
//!
//! Quota state must be shared by every client an application creates, or each
//! new client would start with a fresh budget. [`GovernorRegistry`] builds
//! exactly one [`SyncRateGovernor`] and one [`AsyncRateGovernor`] over one
//! shared [`QuotaLedger`]; clients receive it as an `Arc` and never construct
//! governors themselves.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ldb_api_client::rate_limit::{GovernorRegistry, QuotaTable};
//!
//! let quotas = QuotaTable::from_entries([(1, (5u32, 10u32))]).unwrap();
//! let registry = Arc::new(GovernorRegistry::new(&quotas, true, None).unwrap());
//!
//! registry.sync_governor().acquire().unwrap();
//! assert_eq!(registry.quotas().limits()[0].1, 10);
//! ```

use std::sync::Arc;

use parking_lot::{Mutex, const_mutex};

use crate::config::LdbConfig;
use crate::error::LdbError;
use crate::rate_limit::governor::{AsyncRateGovernor, Clock, SyncRateGovernor, SystemClock};
use crate::rate_limit::ledger::QuotaLedger;
use crate::rate_limit::quota::{QuotaTable, ResolvedQuotas};

/// Lazily built registries for anonymous (`[0]`) and registered (`[1]`) callers.
static PROCESS_DEFAULTS: Mutex<[Option<Arc<GovernorRegistry>>; 2]> = const_mutex([None, None]);

/// One sync and one async governor sharing a resolved quota table and ledger.
#[derive(Debug)]
pub struct GovernorRegistry {
    quotas: ResolvedQuotas,
    ledger: Option<Arc<QuotaLedger>>,
    sync: Arc<SyncRateGovernor>,
    asynchronous: Arc<AsyncRateGovernor>,
}

impl GovernorRegistry {
    /// Resolve `quotas` for the caller and build both governors.
    ///
    /// Fails with [`LdbError::InvalidQuota`] before any governor exists if the
    /// table is empty or holds a zero limit.
    pub fn new(
        quotas: &QuotaTable,
        registered: bool,
        ledger: Option<Arc<QuotaLedger>>,
    ) -> Result<Self, LdbError> {
        Self::with_clock(quotas, registered, ledger, Arc::new(SystemClock))
    }

    /// Like [`new`](Self::new), reading time from `clock`.
    pub fn with_clock(
        quotas: &QuotaTable,
        registered: bool,
        ledger: Option<Arc<QuotaLedger>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LdbError> {
        let resolved = quotas.resolve(registered)?;

        tracing::debug!(
            registered,
            periods = resolved.limits().len(),
            persistent = ledger.as_ref().is_some_and(|l| l.is_enabled()),
            "Building quota governors"
        );

        let sync = Arc::new(SyncRateGovernor::with_clock(
            &resolved,
            ledger.clone(),
            clock.clone(),
        ));
        let asynchronous = Arc::new(AsyncRateGovernor::with_clock(
            &resolved,
            ledger.clone(),
            clock,
        ));

        Ok(Self {
            quotas: resolved,
            ledger,
            sync,
            asynchronous,
        })
    }

    /// Build the registry an application described by `config` should share.
    ///
    /// Starts from the published BDL table, overlays `config.quotas` entry by
    /// entry, resolves limits by whether an API key is present and opens the
    /// ledger unless persistence is disabled.
    pub fn from_config(config: &LdbConfig) -> Result<Self, LdbError> {
        Self::for_caller(config, config.api_key.is_some())
    }

    /// The process-wide registry for anonymous or registered callers.
    ///
    /// Built on first use from [`LdbConfig::from_env`] with the ledger as
    /// configured there, then handed to every client that was not given a
    /// registry explicitly.
    pub fn process_default(registered: bool) -> Result<Arc<Self>, LdbError> {
        let mut slots = PROCESS_DEFAULTS.lock();
        let slot = &mut slots[usize::from(registered)];
        if let Some(registry) = slot {
            return Ok(Arc::clone(registry));
        }

        let registry = Arc::new(Self::for_caller(&LdbConfig::from_env()?, registered)?);
        *slot = Some(Arc::clone(&registry));
        Ok(registry)
    }

    fn for_caller(config: &LdbConfig, registered: bool) -> Result<Self, LdbError> {
        let table = match &config.quotas {
            Some(overrides) => QuotaTable::bdl_defaults().merged_with(overrides),
            None => QuotaTable::bdl_defaults(),
        };
        let ledger = QuotaLedger::shared(&config.ledger)?;
        Self::new(&table, registered, ledger)
    }

    /// The governor for blocking callers.
    pub fn sync_governor(&self) -> &Arc<SyncRateGovernor> {
        &self.sync
    }

    /// The governor for async callers.
    pub fn async_governor(&self) -> &Arc<AsyncRateGovernor> {
        &self.asynchronous
    }

    /// The resolved limits both governors enforce.
    pub fn quotas(&self) -> &ResolvedQuotas {
        &self.quotas
    }

    /// The shared ledger, if persistence is enabled.
    pub fn ledger(&self) -> Option<&Arc<QuotaLedger>> {
        self.ledger.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ClientId;
    use crate::config::LdbConfig;
    use crate::rate_limit::quota::QuotaPeriod;
    use crate::rate_limit::ledger::LedgerConfig;

    fn config_without_ledger() -> LdbConfig {
        LdbConfig {
            ledger: LedgerConfig {
                enabled: false,
                ..LedgerConfig::default()
            },
            ..LdbConfig::default()
        }
    }

    #[test]
    fn test_from_config_resolves_anonymous_defaults() {
        let registry = GovernorRegistry::from_config(&config_without_ledger()).unwrap();

        assert!(!registry.quotas().registered());
        assert_eq!(registry.quotas().limit(QuotaPeriod::Second), Some(5));
        assert_eq!(registry.quotas().limit(QuotaPeriod::SevenDays), Some(10_000));
        assert!(registry.ledger().is_none());
    }

    #[test]
    fn test_from_config_with_key_and_override() {
        let mut config = config_without_ledger();
        config.api_key = Some(ClientId::new("client-id"));
        config.quotas = Some(QuotaTable::new().with(QuotaPeriod::Second, 2u32));

        let registry = GovernorRegistry::from_config(&config).unwrap();

        assert!(registry.quotas().registered());
        assert_eq!(registry.quotas().limit(QuotaPeriod::Second), Some(2));
        assert_eq!(
            registry.quotas().limit(QuotaPeriod::FifteenMinutes),
            Some(500)
        );
    }

    #[test]
    fn test_invalid_table_fails_at_construction() {
        let table = QuotaTable::new().with(QuotaPeriod::Second, 0u32);
        assert!(matches!(
            GovernorRegistry::new(&table, false, None),
            Err(LdbError::InvalidQuota(_))
        ));
    }

    #[test]
    fn test_clones_share_the_same_governors() {
        let table = QuotaTable::from_entries([(1, 1u32)]).unwrap();
        let registry = Arc::new(GovernorRegistry::new(&table, false, None).unwrap());
        let other = registry.clone();

        registry.sync_governor().acquire().unwrap();
        assert!(other.sync_governor().acquire().is_err());
        assert!(Arc::ptr_eq(
            registry.async_governor(),
            other.async_governor()
        ));
    }

    #[test]
    fn test_process_default_is_built_once() {
        let first = GovernorRegistry::process_default(false).unwrap();
        let second = GovernorRegistry::process_default(false).unwrap();
        let registered = GovernorRegistry::process_default(true).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!first.quotas().registered());
        assert!(registered.quotas().registered());
        assert!(!Arc::ptr_eq(&first, &registered));

        // Both share one ledger file, so they must share one ledger instance.
        if let (Some(a), Some(b)) = (first.ledger(), registered.ledger()) {
            assert!(Arc::ptr_eq(a, b));
        }
    }
}

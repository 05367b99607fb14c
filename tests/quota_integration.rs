use std::path::PathBuf;
use std::sync::Arc;

use ldb_api_client::rate_limit::{
    CacheLocation, GovernorKind, GovernorRegistry, LEDGER_FILE_NAME, LedgerConfig, ManualClock,
    QuotaLedger, QuotaPeriod, QuotaTable, ledger_key,
};
use ldb_api_client::{Ldb, LdbConfig, LdbError};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "ldb_quota_it_{}_{}_{}",
        name,
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn persistent_config(dir: &PathBuf) -> LdbConfig {
    LdbConfig {
        quotas: Some(QuotaTable::from_entries([(1, 2u32)]).unwrap()),
        ledger: LedgerConfig {
            enabled: true,
            location: CacheLocation::Custom(dir.clone()),
        },
        ..LdbConfig::default()
    }
}

#[test]
fn test_sync_history_survives_restart() {
    let dir = scratch_dir("restart");

    let first = Ldb::new(persistent_config(&dir)).unwrap();
    first.registry().sync_governor().acquire().unwrap();
    first.registry().sync_governor().acquire().unwrap();
    drop(first);

    assert!(dir.join(LEDGER_FILE_NAME).exists());

    let restarted = Ldb::new(persistent_config(&dir)).unwrap();
    let err = restarted.registry().sync_governor().acquire().unwrap_err();
    assert!(err.is_quota_exceeded());
    assert!(err.retry_after().is_some());
}

#[tokio::test]
async fn test_async_history_is_kept_apart_from_sync() {
    let dir = scratch_dir("kinds");

    let first = Ldb::new(persistent_config(&dir)).unwrap();
    first.registry().sync_governor().acquire().unwrap();
    first.registry().sync_governor().acquire().unwrap();

    let restarted = Ldb::new(persistent_config(&dir)).unwrap();
    restarted.registry().async_governor().acquire().await.unwrap();

    let ledger = QuotaLedger::open(dir.join(LEDGER_FILE_NAME)).unwrap();
    assert_eq!(
        ledger
            .get(&ledger_key(GovernorKind::Sync, false, QuotaPeriod::Second))
            .len(),
        2
    );
    assert_eq!(
        ledger
            .get(&ledger_key(GovernorKind::Async, false, QuotaPeriod::Second))
            .len(),
        1
    );
}

#[test]
fn test_registered_and_anonymous_histories_are_separate() {
    let dir = scratch_dir("registration");

    let anonymous = Ldb::new(persistent_config(&dir)).unwrap();
    anonymous.registry().sync_governor().acquire().unwrap();
    anonymous.registry().sync_governor().acquire().unwrap();

    let registered = Ldb::new(persistent_config(&dir).with_api_key("secret")).unwrap();
    registered.registry().sync_governor().acquire().unwrap();
}

#[test]
fn test_window_reopens_after_period() {
    let clock = Arc::new(ManualClock::new(10_000.0));
    let table = QuotaTable::from_entries([(1, 1u32), (900, 3u32)]).unwrap();
    let registry = GovernorRegistry::with_clock(&table, false, None, clock.clone()).unwrap();
    let governor = registry.sync_governor();

    governor.acquire().unwrap();
    let err = governor.acquire().unwrap_err();
    match err {
        LdbError::QuotaExceeded {
            limit,
            period,
            retry_after_secs,
        } => {
            assert_eq!((limit, period), (1, 1));
            assert!((retry_after_secs - 1.0).abs() < 1e-9);
        }
        other => panic!("expected quota error, got {:?}", other),
    }

    clock.advance(1.0);
    governor.acquire().unwrap();
    clock.advance(1.0);
    governor.acquire().unwrap();

    // Second window is free again, the 15 minute one is not.
    clock.advance(1.0);
    let err = governor.acquire().unwrap_err();
    match err {
        LdbError::QuotaExceeded {
            period,
            retry_after_secs,
            ..
        } => {
            assert_eq!(period, 900);
            assert!((retry_after_secs - 897.0).abs() < 1e-9);
        }
        other => panic!("expected quota error, got {:?}", other),
    }

    // A rejected call is recorded nowhere.
    assert!(governor.timestamps(QuotaPeriod::Second).is_empty());
    assert_eq!(governor.timestamps(QuotaPeriod::FifteenMinutes).len(), 3);
}

#[test]
fn test_quotas_from_environment() {
    let dir = scratch_dir("env");
    let dir_str = dir.to_string_lossy().into_owned();

    let config = LdbConfig::from_lookup(|name| match name {
        "LDB_API_KEY" => Some("key".to_string()),
        "LDB_QUOTAS" => Some(r#"{"1": [1, 4], "900": 50}"#.to_string()),
        "LDB_CACHE_DIR" => Some(dir_str.clone()),
        _ => None,
    })
    .unwrap();

    let ldb = Ldb::new(config).unwrap();
    let quotas = ldb.registry().quotas();
    assert!(quotas.registered());
    assert_eq!(quotas.limit(QuotaPeriod::Second), Some(4));
    assert_eq!(quotas.limit(QuotaPeriod::FifteenMinutes), Some(50));
    assert_eq!(quotas.limit(QuotaPeriod::TwelveHours), Some(5_000));
    assert_eq!(
        ldb.registry().ledger().and_then(|ledger| ledger.path().map(PathBuf::from)),
        Some(dir.join(LEDGER_FILE_NAME))
    );
}

#[test]
fn test_invalid_quota_table_is_rejected() {
    let err = QuotaTable::from_entries([(60, 5u32)]).unwrap_err();
    assert!(matches!(err, LdbError::InvalidQuota(_)));

    let err = QuotaTable::from_entries([(1, 0u32)]).unwrap_err();
    assert!(matches!(err, LdbError::InvalidQuota(_)));

    let err = GovernorRegistry::new(&QuotaTable::new(), false, None).unwrap_err();
    assert!(matches!(err, LdbError::InvalidQuota(_)));
}

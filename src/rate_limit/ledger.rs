//! Durable record of granted call slots.
//!
//! The ledger is a single JSON object mapping a governor key such as
//! `sync_reg_900` to the epoch-second timestamps of calls admitted in that
//! window. The whole map is rewritten after every mutation so that a restarted
//! process picks up where the previous one stopped.
//!
//! Load failures are not fatal: a missing or malformed file yields an empty
//! ledger and the remote API's own limits remain the backstop. Write failures
//! are returned to the caller, since silently losing history could let the
//! process exceed the remote quota.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, const_mutex};

use crate::error::LdbError;
use crate::rate_limit::quota::QuotaPeriod;

/// Name of the ledger file inside the cache directory.
pub const LEDGER_FILE_NAME: &str = "quota_cache.json";

/// Application directory name used under cache roots.
const APP_DIR: &str = "ldb";

/// Where the ledger (and other cache files) live.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CacheLocation {
    /// `./.cache/ldb` relative to the working directory.
    #[default]
    Project,
    /// The platform user cache directory, e.g. `~/.cache/ldb`.
    Global,
    /// An explicit directory.
    Custom(PathBuf),
}

impl CacheLocation {
    /// Resolve the directory without touching the filesystem.
    pub fn dir(&self) -> Result<PathBuf, LdbError> {
        match self {
            CacheLocation::Project => Ok(PathBuf::from(".cache").join(APP_DIR)),
            CacheLocation::Global => dirs::cache_dir()
                .or_else(|| dirs::home_dir().map(|home| home.join(".cache")))
                .map(|root| root.join(APP_DIR))
                .ok_or_else(|| {
                    LdbError::Config("no user cache or home directory available".to_string())
                }),
            CacheLocation::Custom(dir) => Ok(dir.clone()),
        }
    }

    /// Resolve the directory and create it if needed.
    pub fn ensure_dir(&self) -> Result<PathBuf, LdbError> {
        let dir = self.dir()?;
        fs::create_dir_all(&dir).map_err(|source| LdbError::Ledger {
            path: dir.clone(),
            source,
        })?;
        Ok(dir)
    }

    /// Full path of a file inside the cache directory, creating the directory.
    pub fn file_path(&self, file_name: &str) -> Result<PathBuf, LdbError> {
        Ok(self.ensure_dir()?.join(file_name))
    }
}

/// Ledger persistence settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Whether call history is persisted at all.
    pub enabled: bool,
    /// Directory holding the ledger file.
    pub location: CacheLocation,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            location: CacheLocation::Project,
        }
    }
}

/// Which governor flavour a ledger entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GovernorKind {
    /// Blocking callers
    Sync,
    /// Async callers
    Async,
}

impl GovernorKind {
    fn as_str(&self) -> &'static str {
        match self {
            GovernorKind::Sync => "sync",
            GovernorKind::Async => "async",
        }
    }
}

/// Compose the ledger key for one governor window, e.g. `async_anon_900`.
pub fn ledger_key(kind: GovernorKind, registered: bool, period: QuotaPeriod) -> String {
    format!(
        "{}_{}_{}",
        kind.as_str(),
        if registered { "reg" } else { "anon" },
        period.as_secs()
    )
}

type Snapshot = BTreeMap<String, Vec<f64>>;

/// Ledgers currently open in this process, by file path.
static OPEN_LEDGERS: Mutex<BTreeMap<PathBuf, Weak<QuotaLedger>>> = const_mutex(BTreeMap::new());

/// File-backed map from ledger key to call timestamps.
///
/// All reads and writes are serialized by an internal mutex.
#[derive(Debug)]
pub struct QuotaLedger {
    /// `None` when persistence is disabled
    path: Option<PathBuf>,
    data: Mutex<Snapshot>,
}

impl QuotaLedger {
    /// Open the ledger at an explicit file path, loading any existing snapshot.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LdbError> {
        let path = path.into();

        ensure_parent_exists(&path)?;
        let snapshot = load_snapshot(&path);

        Ok(Self {
            path: Some(path),
            data: Mutex::new(snapshot),
        })
    }

    /// Open the ledger described by `config`, or a disabled one.
    pub fn from_config(config: &LedgerConfig) -> Result<Self, LdbError> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        Self::open(config.location.file_path(LEDGER_FILE_NAME)?)
    }

    /// The process-wide ledger for `config`, or `None` when persistence is off.
    ///
    /// Every caller asking for the same file gets the same instance while any
    /// of them holds it, so their snapshots never overwrite each other.
    pub fn shared(config: &LedgerConfig) -> Result<Option<Arc<Self>>, LdbError> {
        if !config.enabled {
            return Ok(None);
        }
        let path = config.location.file_path(LEDGER_FILE_NAME)?;

        let mut open = OPEN_LEDGERS.lock();
        if let Some(ledger) = open.get(&path).and_then(Weak::upgrade) {
            return Ok(Some(ledger));
        }
        open.retain(|_, ledger| ledger.strong_count() > 0);

        let ledger = Arc::new(Self::open(&path)?);
        open.insert(path, Arc::downgrade(&ledger));
        Ok(Some(ledger))
    }

    /// A ledger that remembers nothing: `get` is always empty and `set` is a no-op.
    pub fn disabled() -> Self {
        Self {
            path: None,
            data: Mutex::new(Snapshot::new()),
        }
    }

    /// Whether writes reach disk.
    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    /// Backing file, when enabled.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Timestamps recorded under `key`, empty if absent or disabled.
    pub fn get(&self, key: &str) -> Vec<f64> {
        if !self.is_enabled() {
            return Vec::new();
        }
        self.data.lock().get(key).cloned().unwrap_or_default()
    }

    /// Overwrite one entry and flush the whole map.
    pub fn set(&self, key: impl Into<String>, timestamps: Vec<f64>) -> Result<(), LdbError> {
        self.set_many([(key.into(), timestamps)])
    }

    /// Overwrite several entries with a single flush.
    pub fn set_many<I>(&self, entries: I) -> Result<(), LdbError>
    where
        I: IntoIterator<Item = (String, Vec<f64>)>,
    {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut guard = self.data.lock();
        for (key, timestamps) in entries {
            guard.insert(key, timestamps);
        }
        persist_locked(path, &guard)
    }

    /// Replace the in-memory map with the file's current contents.
    ///
    /// Useful when another process shares the file. Failures leave an empty map.
    pub fn reload(&self) {
        if let Some(path) = &self.path {
            *self.data.lock() = load_snapshot(path);
        }
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    /// Check if no keys are held.
    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}

fn load_snapshot(path: &Path) -> Snapshot {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Snapshot::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Unreadable quota ledger, starting empty");
            return Snapshot::new();
        }
    };

    if bytes.is_empty() {
        return Snapshot::new();
    }

    match serde_json::from_slice(&bytes) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Malformed quota ledger, starting empty");
            Snapshot::new()
        }
    }
}

fn ensure_parent_exists(path: &Path) -> Result<(), LdbError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| LdbError::Ledger {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

fn io_err(source: std::io::Error, at: &Path) -> LdbError {
    LdbError::Ledger {
        path: at.to_path_buf(),
        source,
    }
}

fn persist_locked(path: &Path, contents: &Snapshot) -> Result<(), LdbError> {
    ensure_parent_exists(path)?;

    let serialized = serde_json::to_vec(contents)?;
    let mut tmp_path = path.to_path_buf();
    tmp_path.set_extension("json.tmp");

    {
        let mut file = File::create(&tmp_path).map_err(|e| io_err(e, tmp_path.as_path()))?;
        file.write_all(&serialized)
            .map_err(|e| io_err(e, tmp_path.as_path()))?;
        file.sync_all().map_err(|e| io_err(e, tmp_path.as_path()))?;
    }

    fs::rename(&tmp_path, path).map_err(|e| io_err(e, path))
}

#[cfg(test)]
mod tests {
    use std::{env, process};

    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let unique = format!(
            "ldb_ledger_{}_{}_{}.json",
            name,
            process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        env::temp_dir().join(unique)
    }

    #[test]
    fn test_set_and_get_round_trip_through_file() {
        let path = temp_path("roundtrip");
        let ledger = QuotaLedger::open(&path).unwrap();

        ledger.set("foo", vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(ledger.get("foo"), vec![1.0, 2.0, 3.0]);

        let reopened = QuotaLedger::open(&path).unwrap();
        assert_eq!(reopened.get("foo"), vec![1.0, 2.0, 3.0]);
        assert!(reopened.get("missing").is_empty());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_disabled_ledger_ignores_writes() {
        let ledger = QuotaLedger::disabled();
        ledger.set("foo", vec![1.0, 2.0, 3.0]).unwrap();
        assert!(ledger.get("foo").is_empty());
        assert!(!ledger.is_enabled());
        assert!(ledger.path().is_none());
    }

    #[test]
    fn test_malformed_file_loads_empty() {
        let path = temp_path("malformed");
        fs::write(&path, b"{not json").unwrap();

        let ledger = QuotaLedger::open(&path).unwrap();
        assert!(ledger.is_empty());

        ledger.set("async_anon_1", vec![5.0]).unwrap();
        let contents: Snapshot = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(contents["async_anon_1"], vec![5.0]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_write_failure_is_reported() {
        // A directory where the file should be makes the rename fail.
        let path = temp_path("blocked");
        fs::create_dir_all(&path).unwrap();
        let ledger = QuotaLedger {
            path: Some(path.clone()),
            data: Mutex::new(Snapshot::new()),
        };

        let err = ledger.set("sync_anon_1", vec![1.0]).unwrap_err();
        assert!(matches!(err, LdbError::Ledger { .. }));

        let _ = fs::remove_dir_all(&path);
        let mut tmp = path.clone();
        tmp.set_extension("json.tmp");
        let _ = fs::remove_file(tmp);
    }

    #[test]
    fn test_ledger_key_format() {
        assert_eq!(
            ledger_key(GovernorKind::Sync, true, QuotaPeriod::FifteenMinutes),
            "sync_reg_900"
        );
        assert_eq!(
            ledger_key(GovernorKind::Async, false, QuotaPeriod::Second),
            "async_anon_1"
        );
    }

    #[test]
    fn test_custom_location_creates_directory() {
        let dir = temp_path("dir");
        let location = CacheLocation::Custom(dir.clone());

        let file = location.file_path(LEDGER_FILE_NAME).unwrap();
        assert!(dir.is_dir());
        assert_eq!(file, dir.join(LEDGER_FILE_NAME));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_shared_ledger_is_one_instance_per_file() {
        let dir = temp_path("shared");
        let config = LedgerConfig {
            enabled: true,
            location: CacheLocation::Custom(dir.clone()),
        };

        let first = QuotaLedger::shared(&config).unwrap().unwrap();
        let second = QuotaLedger::shared(&config).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        first.set("sync_anon_1", vec![1.0]).unwrap();
        second.set("async_anon_1", vec![2.0]).unwrap();
        drop((first, second));

        let reopened = QuotaLedger::shared(&config).unwrap().unwrap();
        assert_eq!(reopened.get("sync_anon_1"), vec![1.0]);
        assert_eq!(reopened.get("async_anon_1"), vec![2.0]);

        let disabled = LedgerConfig {
            enabled: false,
            ..config
        };
        assert!(QuotaLedger::shared(&disabled).unwrap().is_none());

        let _ = fs::remove_dir_all(&dir);
    }
}

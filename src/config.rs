//! Client configuration.
//!
//! Values resolve in the order direct value > environment > default: build an
//! [`LdbConfig`] from [`LdbConfig::from_env`] and overwrite the fields you want
//! to pin in code.
//!
//! | Variable | Field |
//! |---|---|
//! | `LDB_API_KEY` | [`api_key`](LdbConfig::api_key) |
//! | `LDB_LANGUAGE` | [`language`](LdbConfig::language) |
//! | `LDB_USE_CACHE` | [`use_cache`](LdbConfig::use_cache) |
//! | `LDB_CACHE_EXPIRY` | [`cache_expire_after`](LdbConfig::cache_expire_after) |
//! | `LDB_PROXY_URL`, `LDB_PROXY_USERNAME`, `LDB_PROXY_PASSWORD` | proxy settings |
//! | `LDB_QUOTAS` | [`quotas`](LdbConfig::quotas) |
//! | `LDB_QUOTA_CACHE_ENABLED` | [`ledger.enabled`](LedgerConfig::enabled) |
//! | `LDB_USE_GLOBAL_CACHE`, `LDB_CACHE_DIR` | [`ledger.location`](LedgerConfig::location) |
//! | `LDB_BASE_URL` | [`base_url`](LdbConfig::base_url) |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::auth::{API_KEY_ENV, ClientId};
use crate::error::LdbError;
use crate::rate_limit::{CacheLocation, LedgerConfig, QuotaTable};
use crate::rest::BDL_BASE_URL;

/// Default lifetime of cached responses.
pub const DEFAULT_CACHE_EXPIRY: Duration = Duration::from_secs(3600);

/// Response language requested through the `lang` query parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Polish
    Pl,
    /// English
    #[default]
    En,
}

impl Language {
    /// The code sent to the API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Pl => "pl",
            Language::En => "en",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = LdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pl" => Ok(Language::Pl),
            "en" => Ok(Language::En),
            other => Err(LdbError::Config(format!(
                "language must be one of: pl, en (got '{}')",
                other
            ))),
        }
    }
}

/// Everything needed to build clients and their shared quota governors.
#[derive(Debug, Clone)]
pub struct LdbConfig {
    /// API key; `None` means anonymous access with the lower quotas.
    pub api_key: Option<ClientId>,
    /// Response language.
    pub language: Language,
    /// Cache GET responses in memory.
    pub use_cache: bool,
    /// Lifetime of a cached response.
    pub cache_expire_after: Duration,
    /// HTTP(S) proxy URL.
    pub proxy_url: Option<String>,
    /// Proxy basic-auth user.
    pub proxy_username: Option<String>,
    /// Proxy basic-auth password.
    pub proxy_password: Option<SecretString>,
    /// Entries overriding the published quota table.
    pub quotas: Option<QuotaTable>,
    /// Quota ledger persistence.
    pub ledger: LedgerConfig,
    /// API root, without a trailing slash.
    pub base_url: String,
    /// Retries for transient HTTP failures.
    ///
    /// Retried attempts are not counted by the quota governors, so the default
    /// is zero.
    pub max_retries: u32,
}

impl Default for LdbConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            language: Language::default(),
            use_cache: true,
            cache_expire_after: DEFAULT_CACHE_EXPIRY,
            proxy_url: None,
            proxy_username: None,
            proxy_password: None,
            quotas: None,
            ledger: LedgerConfig::default(),
            base_url: BDL_BASE_URL.to_string(),
            max_retries: 0,
        }
    }
}

impl LdbConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, LdbError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each variable.
    ///
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LdbError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        config.api_key = var(API_KEY_ENV).and_then(ClientId::non_empty);

        if let Some(language) = var("LDB_LANGUAGE") {
            config.language = language.parse().map_err(|_| {
                LdbError::Config(format!("LDB_LANGUAGE must be one of: pl, en (got '{}')", language))
            })?;
        }

        if let Some(use_cache) = var("LDB_USE_CACHE") {
            config.use_cache = parse_flag(&use_cache);
        }

        if let Some(expiry) = var("LDB_CACHE_EXPIRY") {
            let secs = expiry.trim().parse::<u64>().map_err(|_| {
                LdbError::Config(format!("LDB_CACHE_EXPIRY must be an integer (got '{}')", expiry))
            })?;
            config.cache_expire_after = Duration::from_secs(secs);
        }

        config.proxy_url = var("LDB_PROXY_URL");
        config.proxy_username = var("LDB_PROXY_USERNAME");
        config.proxy_password = var("LDB_PROXY_PASSWORD").map(SecretString::from);

        if let Some(raw) = var("LDB_QUOTAS") {
            config.quotas = Some(QuotaTable::from_json(&raw)?);
        }

        if let Some(enabled) = var("LDB_QUOTA_CACHE_ENABLED") {
            config.ledger.enabled = parse_flag(&enabled);
        }

        if let Some(dir) = var("LDB_CACHE_DIR") {
            config.ledger.location = CacheLocation::Custom(PathBuf::from(dir.trim()));
        } else if var("LDB_USE_GLOBAL_CACHE").is_some_and(|v| parse_flag(&v)) {
            config.ledger.location = CacheLocation::Global;
        }

        if let Some(base_url) = var("LDB_BASE_URL") {
            config.base_url = base_url.trim().trim_end_matches('/').to_string();
        }

        Ok(config)
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = ClientId::non_empty(key);
        self
    }

    /// Set the response language.
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// Whether quotas resolve to the registered limits.
    pub fn is_registered(&self) -> bool {
        self.api_key.is_some()
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;
    use crate::rate_limit::{QuotaLimit, QuotaPeriod};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = LdbConfig::from_lookup(|_| None).unwrap();

        assert!(config.api_key.is_none());
        assert!(!config.is_registered());
        assert_eq!(config.language, Language::En);
        assert!(config.use_cache);
        assert_eq!(config.cache_expire_after, Duration::from_secs(3600));
        assert!(config.quotas.is_none());
        assert!(config.ledger.enabled);
        assert_eq!(config.ledger.location, CacheLocation::Project);
        assert_eq!(config.base_url, "https://bdl.stat.gov.pl/api/v1");
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn test_environment_overrides() {
        let config = LdbConfig::from_lookup(lookup(&[
            ("LDB_API_KEY", "secret-key"),
            ("LDB_LANGUAGE", "PL"),
            ("LDB_USE_CACHE", "no"),
            ("LDB_CACHE_EXPIRY", "60"),
            ("LDB_PROXY_URL", "http://proxy:3128"),
            ("LDB_PROXY_USERNAME", "user"),
            ("LDB_PROXY_PASSWORD", "pass"),
            ("LDB_QUOTA_CACHE_ENABLED", "0"),
            ("LDB_USE_GLOBAL_CACHE", "yes"),
            ("LDB_BASE_URL", "http://localhost:8080/api/"),
        ]))
        .unwrap();

        assert_eq!(config.api_key.unwrap().expose_secret(), "secret-key");
        assert_eq!(config.language, Language::Pl);
        assert!(!config.use_cache);
        assert_eq!(config.cache_expire_after, Duration::from_secs(60));
        assert_eq!(config.proxy_url.as_deref(), Some("http://proxy:3128"));
        assert_eq!(config.proxy_username.as_deref(), Some("user"));
        assert_eq!(config.proxy_password.unwrap().expose_secret(), "pass");
        assert!(!config.ledger.enabled);
        assert_eq!(config.ledger.location, CacheLocation::Global);
        assert_eq!(config.base_url, "http://localhost:8080/api");
    }

    #[test]
    fn test_cache_dir_wins_over_global_flag() {
        let config = LdbConfig::from_lookup(lookup(&[
            ("LDB_USE_GLOBAL_CACHE", "true"),
            ("LDB_CACHE_DIR", "/tmp/ldb-cache"),
        ]))
        .unwrap();

        assert_eq!(
            config.ledger.location,
            CacheLocation::Custom(PathBuf::from("/tmp/ldb-cache"))
        );
    }

    #[test]
    fn test_invalid_language_is_rejected() {
        let err = LdbConfig::from_lookup(lookup(&[("LDB_LANGUAGE", "de")])).unwrap_err();
        assert!(matches!(err, LdbError::Config(_)));
        assert!(err.to_string().contains("LDB_LANGUAGE"));
    }

    #[test]
    fn test_invalid_expiry_is_rejected() {
        let err = LdbConfig::from_lookup(lookup(&[("LDB_CACHE_EXPIRY", "soon")])).unwrap_err();
        assert!(matches!(err, LdbError::Config(_)));
    }

    #[test]
    fn test_quota_overrides_from_json() {
        let config =
            LdbConfig::from_lookup(lookup(&[("LDB_QUOTAS", r#"{"1": 3, "900": [50, 200]}"#)]))
                .unwrap();
        let quotas = config.quotas.unwrap();

        assert_eq!(quotas.get(QuotaPeriod::Second), Some(QuotaLimit::Fixed(3)));
        assert_eq!(
            quotas.get(QuotaPeriod::FifteenMinutes),
            Some(QuotaLimit::ByRegistration(50, 200))
        );
    }

    #[test]
    fn test_invalid_quota_overrides_are_rejected() {
        let err = LdbConfig::from_lookup(lookup(&[("LDB_QUOTAS", r#"{"60": 3}"#)])).unwrap_err();
        assert!(matches!(err, LdbError::InvalidQuota(_)));

        let err = LdbConfig::from_lookup(lookup(&[("LDB_QUOTAS", r#"{"1": 0}"#)])).unwrap_err();
        assert!(matches!(err, LdbError::InvalidQuota(_)));
    }

    #[test]
    fn test_language_parsing() {
        assert_eq!("en".parse::<Language>().unwrap(), Language::En);
        assert_eq!(" Pl ".parse::<Language>().unwrap(), Language::Pl);
        assert!("xx".parse::<Language>().is_err());
        assert_eq!(Language::Pl.to_string(), "pl");
    }

    #[test]
    fn test_builder_helpers() {
        let config = LdbConfig::default()
            .with_api_key("abc")
            .with_language(Language::Pl);
        assert!(config.is_registered());
        assert_eq!(config.language, Language::Pl);

        assert!(!LdbConfig::default().with_api_key("  ").is_registered());
    }
}

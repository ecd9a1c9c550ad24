use crate::error::{ErrorCode, GovsearchError};
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use thiserror::Error;

pub const ENV_PREFIX: &str = "GOVSEARCH";
pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_SURGE_THRESHOLD: i64 = 100;
/// Upper bound for a single upstream request.
pub const MAX_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// `wal://path`, `file://path` or a bare filesystem path.
    pub database_url: Option<String>,
    pub batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: MAX_HTTP_TIMEOUT_SECS,
            max_attempts: 3,
            base_backoff_ms: 500,
            user_agent: concat!("govsearch-indexer/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CongressConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<String>,
    pub congress: u32,
    pub page_size: u32,
    pub max_pages: u32,
    pub max_meeting_details: usize,
}

impl Default for CongressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.congress.gov/v3".to_string(),
            api_key: None,
            congress: 118,
            page_size: 250,
            max_pages: 10,
            max_meeting_details: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct FederalRegisterConfig {
    pub enabled: bool,
    pub base_url: String,
    pub page_size: u32,
    pub max_pages: u32,
}

impl Default for FederalRegisterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://www.federalregister.gov/api/v1".to_string(),
            page_size: 100,
            max_pages: 20,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RegulationsGovConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<String>,
    pub page_size: u32,
    pub max_pages: u32,
    pub max_surge_dockets: usize,
}

impl Default for RegulationsGovConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.regulations.gov/v4".to_string(),
            api_key: None,
            page_size: 250,
            max_pages: 20,
            max_surge_dockets: 25,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LdaConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<String>,
    pub page_size: u32,
    pub max_pages: u32,
}

impl Default for LdaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://lda.senate.gov/api/v1".to_string(),
            api_key: None,
            page_size: 50,
            max_pages: 40,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct SourcesConfig {
    pub http: HttpConfig,
    pub congress: CongressConfig,
    pub federal_register: FederalRegisterConfig,
    pub regulations_gov: RegulationsGovConfig,
    pub lda: LdaConfig,
}

/// Overrides for the built-in scoring tables. Empty means "use the built-ins".
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    pub surge_threshold: i64,
    pub base_weights: BTreeMap<String, f64>,
    pub impact_keywords: Vec<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            surge_threshold: DEFAULT_SURGE_THRESHOLD,
            base_weights: BTreeMap::new(),
            impact_keywords: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct LedgerConfig {
    /// JSON-lines file receiving one event per run.
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub sources: SourcesConfig,
    pub scoring: ScoringConfig,
    pub logging: LoggingConfig,
    pub ledger: LedgerConfig,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigValidationError {
    #[error("store.batch_size must be greater than zero")]
    ZeroBatchSize,
    #[error("sources.http.timeout_secs must be greater than zero")]
    ZeroTimeout,
    #[error("sources.http.timeout_secs must be at most 30 (got {0})")]
    TimeoutTooLong(u64),
    #[error("sources.http.max_attempts must be greater than zero")]
    ZeroAttempts,
    #[error("scoring.base_weights.{0} must be a finite, non-negative number")]
    InvalidWeight(String),
    #[error("scoring.impact_keywords must not contain empty values")]
    EmptyImpactKeyword,
    #[error("scoring.surge_threshold must not be negative")]
    NegativeSurgeThreshold,
    #[error("store.database_url is required")]
    MissingDatabaseUrl,
}

impl GovsearchError for ConfigValidationError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::InvalidArgument
    }
}

impl AppConfig {
    /// Layered load: optional `config/default`, optional `config/{RUN_MODE}`,
    /// then `GOVSEARCH_*` environment variables (`__` separates nested keys).
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            );

        builder.build()?.try_deserialize()
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.store.batch_size == 0 {
            return Err(ConfigValidationError::ZeroBatchSize);
        }
        if self.sources.http.timeout_secs == 0 {
            return Err(ConfigValidationError::ZeroTimeout);
        }
        if self.sources.http.timeout_secs > MAX_HTTP_TIMEOUT_SECS {
            return Err(ConfigValidationError::TimeoutTooLong(
                self.sources.http.timeout_secs,
            ));
        }
        if self.sources.http.max_attempts == 0 {
            return Err(ConfigValidationError::ZeroAttempts);
        }
        if self.scoring.surge_threshold < 0 {
            return Err(ConfigValidationError::NegativeSurgeThreshold);
        }
        for (key, weight) in &self.scoring.base_weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigValidationError::InvalidWeight(key.clone()));
            }
        }
        if self
            .scoring
            .impact_keywords
            .iter()
            .any(|keyword| keyword.trim().is_empty())
        {
            return Err(ConfigValidationError::EmptyImpactKeyword);
        }
        Ok(())
    }

    /// The store location, preferring an explicit override (CLI flag or env).
    pub fn database_url(&self, explicit: Option<&str>) -> Result<String, ConfigValidationError> {
        explicit
            .or(self.store.database_url.as_deref())
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .ok_or(ConfigValidationError::MissingDatabaseUrl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert_eq!(config.store.batch_size, 500);
        assert_eq!(config.scoring.surge_threshold, 100);
        assert_eq!(config.sources.http.timeout_secs, 30);
        assert_eq!(config.sources.regulations_gov.max_surge_dockets, 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [store]
            database_url = "wal:///var/lib/govsearch/store.wal"

            [scoring.base_weights]
            notice = 1.25

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.store.database_url.as_deref(),
            Some("wal:///var/lib/govsearch/store.wal")
        );
        assert_eq!(config.store.batch_size, 500);
        assert_eq!(config.scoring.base_weights.get("notice"), Some(&1.25));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.sources.lda.enabled);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.store.batch_size = 0;
        assert_eq!(config.validate(), Err(ConfigValidationError::ZeroBatchSize));

        let mut config = AppConfig::default();
        config.sources.http.timeout_secs = MAX_HTTP_TIMEOUT_SECS;
        assert_eq!(config.validate(), Ok(()));
        config.sources.http.timeout_secs = MAX_HTTP_TIMEOUT_SECS + 1;
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::TimeoutTooLong(31))
        );

        let mut config = AppConfig::default();
        config.scoring.base_weights.insert("rule".into(), -1.0);
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::InvalidWeight("rule".into()))
        );

        let mut config = AppConfig::default();
        config.scoring.impact_keywords.push("  ".into());
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::EmptyImpactKeyword)
        );
    }

    #[test]
    fn test_database_url_prefers_explicit_value() {
        let mut config = AppConfig::default();
        assert_eq!(
            config.database_url(None),
            Err(ConfigValidationError::MissingDatabaseUrl)
        );

        config.store.database_url = Some("/tmp/from-config.wal".into());
        assert_eq!(config.database_url(None).unwrap(), "/tmp/from-config.wal");
        assert_eq!(
            config.database_url(Some("/tmp/from-flag.wal")).unwrap(),
            "/tmp/from-flag.wal"
        );
        assert_eq!(
            config.database_url(Some("   ")),
            Err(ConfigValidationError::MissingDatabaseUrl)
        );
    }
}

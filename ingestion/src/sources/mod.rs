//! Source adapters: fetch one time window from an upstream API and emit
//! loosely-typed [`RawRow`]s for the normalizer.

pub mod congress;
pub mod federal_register;
pub mod fixture;
pub mod http;
pub mod keywords;
pub mod lda;
pub mod regulations_gov;

pub use congress::CongressAdapter;
pub use federal_register::FederalRegisterAdapter;
pub use fixture::StaticAdapter;
pub use http::{BackoffPolicy, HttpFetcher, RetryPolicy};
pub use lda::LdaAdapter;
pub use regulations_gov::RegulationsGovAdapter;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use govsearch_core::config::SourcesConfig;
use govsearch_core::error::{ErrorCode, GovsearchError};
use govsearch_core::ingest::RawRow;
use govsearch_core::model::Source;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("no API key configured for {0}")]
    MissingCredential(&'static str),
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

impl AdapterError {
    /// 429, 5xx, timeouts and connection failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            AdapterError::Http { status, .. } => *status == 429 || *status >= 500,
            AdapterError::Transport(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }
}

impl GovsearchError for AdapterError {
    fn error_code(&self) -> ErrorCode {
        match self {
            AdapterError::MissingCredential(_) => ErrorCode::FailedPrecondition,
            AdapterError::Http { status: 429, .. } => ErrorCode::ResourceExhausted,
            AdapterError::Http { .. } | AdapterError::Transport(_) | AdapterError::Io(_) => {
                ErrorCode::Unavailable
            }
            AdapterError::Decode(_) | AdapterError::Json(_) | AdapterError::Client(_) => {
                ErrorCode::Internal
            }
        }
    }
}

/// Rows from one fetch, plus the identifiers of upstream records the adapter
/// could not map to a row.
#[derive(Debug, Clone, Default)]
pub struct FetchBatch {
    pub rows: Vec<RawRow>,
    pub skipped: Vec<String>,
}

impl FetchBatch {
    pub fn push(&mut self, row: RawRow) {
        self.rows.push(row);
    }

    pub fn skip(&mut self, source: Source, record: impl Into<String>, reason: impl Display) {
        let record = record.into();
        tracing::warn!(
            source = %source,
            record = %record,
            reason = %reason,
            "skipping upstream record"
        );
        self.skipped.push(record);
    }

    pub fn extend(&mut self, other: FetchBatch) {
        self.rows.extend(other.rows);
        self.skipped.extend(other.skipped);
    }

    /// Upstream records seen, mapped or not.
    pub fn upstream_records(&self) -> usize {
        self.rows.len() + self.skipped.len()
    }
}

impl From<Vec<RawRow>> for FetchBatch {
    fn from(rows: Vec<RawRow>) -> Self {
        Self {
            rows,
            skipped: Vec::new(),
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> Source;

    /// Records whose upstream timestamp falls in `[since, until)`.
    async fn fetch(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<FetchBatch, AdapterError>;
}

/// Adapters for every enabled source, in the order they are fetched.
pub fn build_adapters(config: &SourcesConfig) -> Result<Vec<Arc<dyn SourceAdapter>>, AdapterError> {
    let fetcher = Arc::new(HttpFetcher::new(&config.http)?);
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();

    if config.congress.enabled {
        adapters.push(Arc::new(CongressAdapter::new(
            config.congress.clone(),
            fetcher.clone(),
        )));
    }
    if config.federal_register.enabled {
        adapters.push(Arc::new(FederalRegisterAdapter::new(
            config.federal_register.clone(),
            fetcher.clone(),
        )));
    }
    if config.regulations_gov.enabled {
        adapters.push(Arc::new(RegulationsGovAdapter::new(
            config.regulations_gov.clone(),
            fetcher.clone(),
        )));
    }
    if config.lda.enabled {
        adapters.push(Arc::new(LdaAdapter::new(config.lda.clone(), fetcher)));
    }

    Ok(adapters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let throttled = AdapterError::Http {
            status: 429,
            url: "https://api.example.gov/x".into(),
        };
        let unavailable = AdapterError::Http {
            status: 503,
            url: "https://api.example.gov/x".into(),
        };
        let forbidden = AdapterError::Http {
            status: 403,
            url: "https://api.example.gov/x".into(),
        };

        assert!(throttled.is_transient());
        assert!(unavailable.is_transient());
        assert!(!forbidden.is_transient());
        assert!(!AdapterError::Decode("bad".into()).is_transient());
        assert!(!AdapterError::MissingCredential("congress").is_transient());
        assert_eq!(throttled.error_code(), ErrorCode::ResourceExhausted);
        assert_eq!(forbidden.error_code(), ErrorCode::Unavailable);
    }

    #[test]
    fn test_disabled_sources_are_skipped() {
        let mut config = SourcesConfig::default();
        config.congress.enabled = false;
        config.lda.enabled = false;

        let adapters = build_adapters(&config).unwrap();
        let sources: Vec<Source> = adapters.iter().map(|adapter| adapter.source()).collect();
        assert_eq!(sources, vec![Source::FederalRegister, Source::RegulationsGov]);
    }
}

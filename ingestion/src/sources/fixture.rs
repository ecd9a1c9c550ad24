use super::{AdapterError, FetchBatch, SourceAdapter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use govsearch_core::ingest::RawRow;
use govsearch_core::model::Source;
use std::path::Path;
use std::sync::Mutex;

/// Replays a fixed set of rows, or a fixed error, for every window.
///
/// Used for offline re-ingestion of captured payloads and in tests.
pub struct StaticAdapter {
    source: Source,
    rows: Mutex<Vec<RawRow>>,
    failure: Option<String>,
}

impl StaticAdapter {
    pub fn new(source: Source, rows: Vec<RawRow>) -> Self {
        Self {
            source,
            rows: Mutex::new(rows),
            failure: None,
        }
    }

    /// An adapter whose every fetch fails with a transport-level error.
    pub fn failing(source: Source, message: impl Into<String>) -> Self {
        Self {
            source,
            rows: Mutex::new(Vec::new()),
            failure: Some(message.into()),
        }
    }

    /// Load rows from a JSON file holding an array of objects.
    pub fn from_json_file(source: Source, path: impl AsRef<Path>) -> Result<Self, AdapterError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let rows: Vec<RawRow> = serde_json::from_str(&raw)?;
        Ok(Self::new(source, rows))
    }

    pub fn replace_rows(&self, rows: Vec<RawRow>) {
        if let Ok(mut current) = self.rows.lock() {
            *current = rows;
        }
    }
}

#[async_trait]
impl SourceAdapter for StaticAdapter {
    fn source(&self) -> Source {
        self.source
    }

    async fn fetch(
        &self,
        _since: DateTime<Utc>,
        _until: DateTime<Utc>,
    ) -> Result<FetchBatch, AdapterError> {
        if let Some(message) = &self.failure {
            return Err(AdapterError::Decode(message.clone()));
        }
        let rows = self
            .rows
            .lock()
            .map_err(|_| AdapterError::Client("static adapter lock poisoned".into()))?;
        Ok(FetchBatch::from(rows.clone()))
    }
}

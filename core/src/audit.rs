use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Backfill,
    Incremental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    Failed,
}

/// One indexing run, as recorded in the run ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEvent {
    pub sequence: u64,
    pub kind: RunKind,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub lda_since: DateTime<Utc>,
    #[serde(default)]
    pub fetched: BTreeMap<String, usize>,
    #[serde(default)]
    pub failed_sources: Vec<String>,
    pub rejected_rows: usize,
    pub documents_committed: usize,
    pub edges_committed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("run ledger lock poisoned")]
    LockPoisoned,
    #[error("run ledger io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("run ledger serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub trait RunLedger: Send + Sync {
    fn record(&self, event: RunEvent) -> Result<(), LedgerError>;
}

#[derive(Default)]
pub struct InMemoryRunLedger {
    events: Mutex<Vec<RunEvent>>,
    sequence: AtomicU64,
}

impl InMemoryRunLedger {
    pub fn events(&self) -> Result<Vec<RunEvent>, LedgerError> {
        let events = self.events.lock().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(events.clone())
    }
}

impl RunLedger for InMemoryRunLedger {
    fn record(&self, mut event: RunEvent) -> Result<(), LedgerError> {
        event.sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let mut events = self.events.lock().map_err(|_| LedgerError::LockPoisoned)?;
        events.push(event);
        Ok(())
    }
}

/// Appends one JSON object per line.
pub struct JsonlRunLedger {
    writer: Mutex<std::fs::File>,
    sequence: AtomicU64,
}

impl JsonlRunLedger {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let writer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;

        Ok(Self {
            writer: Mutex::new(writer),
            sequence: AtomicU64::new(0),
        })
    }
}

impl RunLedger for JsonlRunLedger {
    fn record(&self, mut event: RunEvent) -> Result<(), LedgerError> {
        event.sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;

        let line = serde_json::to_string(&event)?;
        let mut writer = self.writer.lock().map_err(|_| LedgerError::LockPoisoned)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

use crate::linker::CrossReferenceBuilder;
use crate::normalize::Normalizer;
use crate::persist::PersistenceCoordinator;
use crate::sources::SourceAdapter;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use govsearch_core::audit::{RunEvent, RunKind, RunLedger, RunOutcome};
use govsearch_core::error::{ErrorCode, GovsearchError};
use govsearch_core::model::{DocumentRecord, EdgeRecord, Source};
use jobs::{compute_window, RunMode, RunWindow, WindowError};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use storage::repo::{CommitSummary, RepoError, Repository};
use thiserror::Error;

const RUN_LOCK_KEY: &str = "indexing-run";

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("an indexing run is already in progress")]
    RunInProgress,
    #[error("invalid run window: {0}")]
    Window(#[from] WindowError),
    #[error(
        "persistence failed after attempting {documents_attempted} documents and {edges_attempted} edges (0 committed): {source}"
    )]
    Persistence {
        source: RepoError,
        documents_attempted: usize,
        edges_attempted: usize,
    },
}

impl GovsearchError for IndexerError {
    fn error_code(&self) -> ErrorCode {
        match self {
            IndexerError::RunInProgress => ErrorCode::FailedPrecondition,
            IndexerError::Window(err) => err.error_code(),
            IndexerError::Persistence { source, .. } => source.error_code(),
        }
    }
}

/// Outcome of one successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub kind: RunKind,
    pub window: RunWindow,
    /// Upstream records returned per source. Failed sources report zero.
    pub fetched: BTreeMap<String, usize>,
    /// Normalized documents per source, before de-duplication.
    pub documents: BTreeMap<String, usize>,
    pub failed_sources: Vec<String>,
    /// Records skipped by an adapter or rejected by the normalizer.
    pub rejected_rows: usize,
    pub duplicate_rows: usize,
    pub documents_attempted: usize,
    pub edges_attempted: usize,
    #[serde(skip)]
    pub committed: CommitSummary,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn documents_from(&self, source: &str) -> usize {
        self.documents.get(source).copied().unwrap_or(0)
    }
}

struct RunGuard {
    key: String,
    locks: Arc<DashMap<String, ()>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.locks.remove(&self.key);
    }
}

struct Collected {
    fetched: BTreeMap<String, usize>,
    documents: BTreeMap<String, usize>,
    failed_sources: Vec<String>,
    rejected_rows: usize,
    batch: Vec<DocumentRecord>,
}

/// Fetch, normalize, link and persist one window across every configured
/// source.
pub struct IndexingPipeline {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    normalizer: Normalizer,
    linker: CrossReferenceBuilder,
    persistence: PersistenceCoordinator,
    // Held for the duration of a run
    locks: Arc<DashMap<String, ()>>,
    ledger: Option<Arc<dyn RunLedger>>,
}

impl IndexingPipeline {
    pub fn new(repo: Arc<Repository>, adapters: Vec<Arc<dyn SourceAdapter>>) -> Self {
        Self::with_normalizer(repo, adapters, Normalizer::default())
    }

    pub fn with_normalizer(
        repo: Arc<Repository>,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        normalizer: Normalizer,
    ) -> Self {
        Self {
            adapters,
            normalizer,
            linker: CrossReferenceBuilder::new(),
            persistence: PersistenceCoordinator::new(repo),
            locks: Arc::new(DashMap::new()),
            ledger: None,
        }
    }

    pub fn set_ledger(&mut self, ledger: Arc<dyn RunLedger>) {
        self.ledger = Some(ledger);
    }

    pub async fn run(&self, mode: RunMode) -> Result<RunReport, IndexerError> {
        let window = compute_window(mode)?;
        self.run_window(mode.kind(), window).await
    }

    /// Run over an explicit window. Source-level and row-level failures are
    /// logged and counted; only a failed commit fails the run.
    pub async fn run_window(
        &self,
        kind: RunKind,
        window: RunWindow,
    ) -> Result<RunReport, IndexerError> {
        let _guard = self.acquire_run_guard()?;
        let started_at = Utc::now();
        tracing::info!(
            kind = ?kind,
            since = %window.since,
            until = %window.until,
            lda_since = %window.lda_since,
            sources = self.adapters.len(),
            "indexing run started"
        );

        let collected = self.collect(&window).await;
        let (documents, duplicate_rows) = dedupe_by_id(collected.batch);
        let edges: Vec<EdgeRecord> = self.linker.build(&documents).into_iter().collect();
        let documents_attempted = documents.len();
        let edges_attempted = edges.len();

        let mut event = RunEvent {
            sequence: 0,
            kind,
            outcome: RunOutcome::Succeeded,
            started_at,
            finished_at: started_at,
            since: window.since,
            until: window.until,
            lda_since: window.lda_since,
            fetched: collected.fetched.clone(),
            failed_sources: collected.failed_sources.clone(),
            rejected_rows: collected.rejected_rows,
            documents_committed: 0,
            edges_committed: 0,
            error: None,
        };

        let committed = match self.persistence.persist(documents, edges).await {
            Ok(summary) => summary,
            Err(source) => {
                let err = IndexerError::Persistence {
                    source,
                    documents_attempted,
                    edges_attempted,
                };
                tracing::error!(
                    documents_attempted,
                    edges_attempted,
                    error = %err,
                    "indexing run failed, nothing committed"
                );
                event.outcome = RunOutcome::Failed;
                event.finished_at = Utc::now();
                event.error = Some(err.to_string());
                self.record_event(event);
                return Err(err);
            }
        };

        let finished_at = Utc::now();
        event.finished_at = finished_at;
        event.documents_committed = committed.documents_upserted;
        event.edges_committed = committed.edges_inserted;
        self.record_event(event);

        tracing::info!(
            kind = ?kind,
            documents = committed.documents_upserted,
            edges_inserted = committed.edges_inserted,
            edges_deleted = committed.edges_deleted,
            rejected_rows = collected.rejected_rows,
            duplicate_rows,
            failed_sources = collected.failed_sources.len(),
            duration_ms = (finished_at - started_at).num_milliseconds(),
            "indexing run finished"
        );

        Ok(RunReport {
            kind,
            window,
            fetched: collected.fetched,
            documents: collected.documents,
            failed_sources: collected.failed_sources,
            rejected_rows: collected.rejected_rows,
            duplicate_rows,
            documents_attempted,
            edges_attempted,
            committed,
            started_at,
            finished_at,
        })
    }

    fn acquire_run_guard(&self) -> Result<RunGuard, IndexerError> {
        match self.locks.entry(RUN_LOCK_KEY.to_string()) {
            Entry::Occupied(_) => return Err(IndexerError::RunInProgress),
            Entry::Vacant(slot) => {
                slot.insert(());
            }
        }
        Ok(RunGuard {
            key: RUN_LOCK_KEY.to_string(),
            locks: self.locks.clone(),
        })
    }

    /// Sources are fetched one after another, in configuration order.
    async fn collect(&self, window: &RunWindow) -> Collected {
        let mut collected = Collected {
            fetched: BTreeMap::new(),
            documents: BTreeMap::new(),
            failed_sources: Vec::new(),
            rejected_rows: 0,
            batch: Vec::new(),
        };

        for adapter in &self.adapters {
            let source = adapter.source();
            let name = source.as_str().to_string();
            let since = match source {
                Source::Lda => window.lda_since,
                _ => window.since,
            };

            let fetched = match adapter.fetch(since, window.until).await {
                Ok(fetched) => fetched,
                Err(err) => {
                    tracing::warn!(
                        source = %source,
                        error = %err,
                        code = %err.error_code(),
                        "source fetch failed, continuing without it"
                    );
                    collected.fetched.insert(name.clone(), 0);
                    collected.documents.insert(name.clone(), 0);
                    collected.failed_sources.push(name);
                    continue;
                }
            };

            let normalized = self.normalizer.normalize_batch(source, &fetched.rows);
            let rejected = fetched.skipped.len() + normalized.rejected;
            tracing::debug!(
                source = %source,
                records = fetched.upstream_records(),
                documents = normalized.documents.len(),
                rejected,
                "source normalized"
            );
            *collected.fetched.entry(name.clone()).or_insert(0) += fetched.upstream_records();
            *collected.documents.entry(name).or_insert(0) += normalized.documents.len();
            collected.rejected_rows += rejected;
            collected.batch.extend(normalized.documents);
        }

        collected
    }

    fn record_event(&self, event: RunEvent) {
        if let Some(ledger) = &self.ledger {
            if let Err(err) = ledger.record(event) {
                tracing::warn!(error = %err, "failed to record run in ledger");
            }
        }
    }
}

/// Keep one document per id. The later document replaces the earlier one in
/// the earlier one's position.
fn dedupe_by_id(batch: Vec<DocumentRecord>) -> (Vec<DocumentRecord>, usize) {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(batch.len());
    let mut documents: Vec<DocumentRecord> = Vec::with_capacity(batch.len());
    let mut duplicates = 0;

    for doc in batch {
        match positions.get(&doc.id) {
            Some(&index) => {
                duplicates += 1;
                documents[index] = doc;
            }
            None => {
                positions.insert(doc.id.clone(), documents.len());
                documents.push(doc);
            }
        }
    }

    (documents, duplicates)
}

use crate::index::EdgeIndex;
use crate::row::{DocumentRow, EdgeRow, RowError};
use crate::wal::{Wal, WalError};
use govsearch_core::error::{ErrorCode, GovsearchError};
use govsearch_core::model::{DocumentRecord, EdgeRecord};
use rkyv::ser::{serializers::AllocSerializer, Serializer};
use rkyv::{AlignedVec, Archive, Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

pub const SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),
    #[error("Serialization error")]
    Serialization,
    #[error("Row encoding error: {0}")]
    Row(#[from] RowError),
    #[error("Schema not initialized; run `migrate` first")]
    SchemaNotInitialized,
    #[error("Schema version {found} is not supported (expected {expected})")]
    SchemaMismatch { found: u32, expected: u32 },
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Unsupported database url: {0}")]
    UnsupportedUrl(String),
}

impl GovsearchError for RepoError {
    fn error_code(&self) -> ErrorCode {
        match self {
            RepoError::Wal(err) => err.error_code(),
            RepoError::Serialization | RepoError::Row(_) => ErrorCode::Internal,
            RepoError::SchemaNotInitialized | RepoError::SchemaMismatch { .. } => {
                ErrorCode::FailedPrecondition
            }
            RepoError::NotFound(_) => ErrorCode::NotFound,
            RepoError::InvalidTransaction(_) | RepoError::UnsupportedUrl(_) => {
                ErrorCode::InvalidArgument
            }
        }
    }
}

/// WAL entry types for durability
#[derive(Archive, Deserialize, Serialize, Debug, Clone)]
#[archive(check_bytes)]
pub enum WalEntry {
    Schema { version: u32 },
    Transaction(Vec<TxOperation>),
}

#[derive(Archive, Deserialize, Serialize, Debug, Clone)]
#[archive(check_bytes)]
pub enum TxOperation {
    UpsertDocuments(Vec<DocumentRow>),
    DeleteEdgesTouching(Vec<String>),
    InsertEdges(Vec<EdgeRow>),
}

#[derive(Debug, Clone)]
pub enum StoreMutation {
    UpsertDocuments(Vec<DocumentRecord>),
    DeleteEdgesTouching(Vec<String>),
    InsertEdges(Vec<EdgeRecord>),
}

/// Mutations that commit together or not at all.
#[derive(Debug, Clone, Default)]
pub struct StoreTransaction {
    mutations: Vec<StoreMutation>,
}

impl StoreTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert-or-replace keyed by id; the stored row is fully superseded.
    pub fn upsert_documents(&mut self, documents: Vec<DocumentRecord>) -> &mut Self {
        if !documents.is_empty() {
            self.mutations.push(StoreMutation::UpsertDocuments(documents));
        }
        self
    }

    /// Delete every edge whose source or destination is in `ids`.
    pub fn delete_edges_touching(&mut self, ids: Vec<String>) -> &mut Self {
        if !ids.is_empty() {
            self.mutations.push(StoreMutation::DeleteEdgesTouching(ids));
        }
        self
    }

    /// Insert edges; an edge that already exists is left alone.
    pub fn insert_edges(&mut self, edges: Vec<EdgeRecord>) -> &mut Self {
        if !edges.is_empty() {
            self.mutations.push(StoreMutation::InsertEdges(edges));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn document_count(&self) -> usize {
        self.mutations
            .iter()
            .map(|mutation| match mutation {
                StoreMutation::UpsertDocuments(docs) => docs.len(),
                _ => 0,
            })
            .sum()
    }

    pub fn edge_count(&self) -> usize {
        self.mutations
            .iter()
            .map(|mutation| match mutation {
                StoreMutation::InsertEdges(edges) => edges.len(),
                _ => 0,
            })
            .sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub documents_upserted: usize,
    pub edges_deleted: usize,
    /// Newly created edges; duplicates of existing edges are not counted.
    pub edges_inserted: usize,
    pub lsn: u64,
}

pub struct Repository {
    wal: Arc<Mutex<Wal>>,
    tx_lock: Arc<Mutex<()>>,
    schema_version: RwLock<Option<u32>>,
    documents: Arc<RwLock<HashMap<String, DocumentRecord>>>,
    edges: Arc<RwLock<EdgeIndex>>,
    batch_size: usize,
}

impl Repository {
    /// Open a Repository with WAL replay to restore previous state
    pub async fn open(wal_path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let mut wal = Wal::open(&wal_path).await?;
        let mut documents = HashMap::new();
        let mut edges = EdgeIndex::new();
        let mut schema_version = None;

        let last_lsn = wal
            .replay(|_lsn, data| {
                match decode_wal_entry(&data)? {
                    WalEntry::Schema { version } => schema_version = Some(version),
                    WalEntry::Transaction(operations) => {
                        for operation in operations {
                            let mutation = tx_operation_to_mutation(operation)
                                .map_err(|_| WalError::CorruptEntry)?;
                            apply_mutation(&mut documents, &mut edges, mutation);
                        }
                    }
                }
                Ok(())
            })
            .await?;

        if let Some(found) = schema_version {
            if found != SCHEMA_VERSION {
                return Err(RepoError::SchemaMismatch {
                    found,
                    expected: SCHEMA_VERSION,
                });
            }
        }

        tracing::debug!(
            path = %wal_path.as_ref().display(),
            last_lsn,
            documents = documents.len(),
            edges = edges.edge_count(),
            "repository replayed"
        );

        Ok(Self {
            wal: Arc::new(Mutex::new(wal)),
            tx_lock: Arc::new(Mutex::new(())),
            schema_version: RwLock::new(schema_version),
            documents: Arc::new(RwLock::new(documents)),
            edges: Arc::new(RwLock::new(edges)),
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Open from a connection string: `wal://path`, `file://path` or a bare path.
    pub async fn open_url(url: &str) -> Result<Self, RepoError> {
        let path = resolve_database_url(url)?;
        Self::open(path).await
    }

    /// Rows per archived WAL operation. Chunking never splits a transaction.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Record the schema version once. Returns `true` when it was just created.
    pub async fn ensure_schema(&self) -> Result<bool, RepoError> {
        let _tx_guard = self.tx_lock.lock().await;
        let mut schema = self.schema_version.write().await;

        match *schema {
            Some(SCHEMA_VERSION) => Ok(false),
            Some(found) => Err(RepoError::SchemaMismatch {
                found,
                expected: SCHEMA_VERSION,
            }),
            None => {
                let bytes = serialize_wal_entry(&WalEntry::Schema {
                    version: SCHEMA_VERSION,
                })?;
                {
                    let mut wal = self.wal.lock().await;
                    wal.append(&bytes).await?;
                    wal.flush().await?;
                }
                *schema = Some(SCHEMA_VERSION);
                Ok(true)
            }
        }
    }

    pub async fn schema_version(&self) -> Option<u32> {
        *self.schema_version.read().await
    }

    /// Apply every mutation atomically within one transaction boundary.
    /// If validation fails, nothing is written to the WAL or the in-memory state.
    pub async fn commit(&self, tx: StoreTransaction) -> Result<CommitSummary, RepoError> {
        if tx.is_empty() {
            return Ok(CommitSummary::default());
        }

        // Serialize validation and apply to avoid TOCTOU between concurrent writers.
        let _tx_guard = self.tx_lock.lock().await;

        if self.schema_version.read().await.is_none() {
            return Err(RepoError::SchemaNotInitialized);
        }
        self.validate_transaction(&tx.mutations).await?;

        let operations = to_tx_operations(&tx.mutations, self.batch_size)?;
        let bytes = serialize_wal_entry(&WalEntry::Transaction(operations))?;

        // Durability first for the full transaction boundary.
        let lsn = {
            let mut wal = self.wal.lock().await;
            let lsn = wal.append(&bytes).await?;
            wal.flush().await?;
            lsn
        };

        // Apply under write locks so readers never observe a partial transaction.
        let mut documents = self.documents.write().await;
        let mut edges = self.edges.write().await;

        let mut summary = CommitSummary {
            lsn,
            ..CommitSummary::default()
        };
        for mutation in tx.mutations {
            let effect = apply_mutation(&mut documents, &mut edges, mutation);
            summary.documents_upserted += effect.documents_upserted;
            summary.edges_deleted += effect.edges_deleted;
            summary.edges_inserted += effect.edges_inserted;
        }

        Ok(summary)
    }

    pub async fn get_document(&self, id: &str) -> Result<DocumentRecord, RepoError> {
        let documents = self.documents.read().await;
        documents
            .get(id)
            .cloned()
            .ok_or_else(|| RepoError::NotFound(id.to_string()))
    }

    pub async fn get_documents_by_ids(&self, ids: &[String]) -> Vec<DocumentRecord> {
        let documents = self.documents.read().await;
        ids.iter().filter_map(|id| documents.get(id).cloned()).collect()
    }

    /// Every stored document, ordered by id.
    pub async fn documents_snapshot(&self) -> Vec<DocumentRecord> {
        let documents = self.documents.read().await;
        let mut out: Vec<DocumentRecord> = documents.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn edge_count(&self) -> usize {
        self.edges.read().await.edge_count()
    }

    /// Outgoing edges of one document.
    pub async fn edges_for(&self, id: &str) -> Vec<EdgeRecord> {
        self.edges.read().await.edges_for(id)
    }

    pub async fn all_edges(&self) -> Vec<EdgeRecord> {
        self.edges.read().await.all_edges()
    }

    pub async fn neighbors_2hop(&self, id: &str) -> Vec<(String, u8)> {
        self.edges.read().await.neighbors_2hop(id)
    }

    pub async fn current_lsn(&self) -> u64 {
        self.wal.lock().await.current_lsn()
    }

    async fn validate_transaction(&self, mutations: &[StoreMutation]) -> Result<(), RepoError> {
        let documents = self.documents.read().await;
        let mut staged: HashSet<&str> = HashSet::new();

        for mutation in mutations {
            match mutation {
                StoreMutation::UpsertDocuments(docs) => {
                    for doc in docs {
                        doc.validate()
                            .map_err(|err| RepoError::InvalidTransaction(err.to_string()))?;
                        staged.insert(doc.id.as_str());
                    }
                }
                StoreMutation::DeleteEdgesTouching(ids) => {
                    if ids.iter().any(|id| id.trim().is_empty()) {
                        return Err(RepoError::InvalidTransaction(
                            "edge invalidation set contains an empty id".to_string(),
                        ));
                    }
                }
                StoreMutation::InsertEdges(edges) => {
                    for edge in edges {
                        for endpoint in [&edge.src_id, &edge.dst_id] {
                            let visible = staged.contains(endpoint.as_str())
                                || documents.contains_key(endpoint);
                            if !visible {
                                return Err(RepoError::InvalidTransaction(format!(
                                    "edge {} -> {} ({}) references missing document {}",
                                    edge.src_id, edge.dst_id, edge.relation, endpoint
                                )));
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// Map a connection string to the WAL file backing the store.
pub fn resolve_database_url(url: &str) -> Result<PathBuf, RepoError> {
    let trimmed = url.trim();
    let path = match trimmed
        .strip_prefix("wal://")
        .or_else(|| trimmed.strip_prefix("file://"))
    {
        Some(rest) => rest,
        None if trimmed.contains("://") => {
            return Err(RepoError::UnsupportedUrl(trimmed.to_string()));
        }
        None => trimmed,
    };

    if path.is_empty() {
        return Err(RepoError::UnsupportedUrl(url.to_string()));
    }
    Ok(PathBuf::from(path))
}

#[derive(Debug, Default)]
struct MutationEffect {
    documents_upserted: usize,
    edges_deleted: usize,
    edges_inserted: usize,
}

fn apply_mutation(
    documents: &mut HashMap<String, DocumentRecord>,
    edges: &mut EdgeIndex,
    mutation: StoreMutation,
) -> MutationEffect {
    let mut effect = MutationEffect::default();
    match mutation {
        StoreMutation::UpsertDocuments(docs) => {
            for doc in docs {
                documents.insert(doc.id.clone(), doc);
                effect.documents_upserted += 1;
            }
        }
        StoreMutation::DeleteEdgesTouching(ids) => {
            let ids: HashSet<String> = ids.into_iter().collect();
            effect.edges_deleted = edges.remove_touching(&ids);
        }
        StoreMutation::InsertEdges(new_edges) => {
            for edge in &new_edges {
                if edges.add_edge(edge) {
                    effect.edges_inserted += 1;
                }
            }
        }
    }
    effect
}

fn to_tx_operations(
    mutations: &[StoreMutation],
    batch_size: usize,
) -> Result<Vec<TxOperation>, RepoError> {
    let mut operations = Vec::new();
    for mutation in mutations {
        match mutation {
            StoreMutation::UpsertDocuments(docs) => {
                for chunk in docs.chunks(batch_size) {
                    let rows = chunk
                        .iter()
                        .map(DocumentRow::try_from)
                        .collect::<Result<Vec<_>, _>>()?;
                    operations.push(TxOperation::UpsertDocuments(rows));
                }
            }
            StoreMutation::DeleteEdgesTouching(ids) => {
                operations.push(TxOperation::DeleteEdgesTouching(ids.clone()));
            }
            StoreMutation::InsertEdges(edges) => {
                for chunk in edges.chunks(batch_size) {
                    operations.push(TxOperation::InsertEdges(
                        chunk.iter().map(EdgeRow::from).collect(),
                    ));
                }
            }
        }
    }
    Ok(operations)
}

fn tx_operation_to_mutation(operation: TxOperation) -> Result<StoreMutation, RowError> {
    Ok(match operation {
        TxOperation::UpsertDocuments(rows) => StoreMutation::UpsertDocuments(
            rows.into_iter()
                .map(DocumentRecord::try_from)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        TxOperation::DeleteEdgesTouching(ids) => StoreMutation::DeleteEdgesTouching(ids),
        TxOperation::InsertEdges(rows) => StoreMutation::InsertEdges(
            rows.into_iter()
                .map(EdgeRecord::try_from)
                .collect::<Result<Vec<_>, _>>()?,
        ),
    })
}

fn serialize_wal_entry(entry: &WalEntry) -> Result<Vec<u8>, RepoError> {
    let mut serializer = AllocSerializer::<4096>::default();
    serializer
        .serialize_value(entry)
        .map_err(|_| RepoError::Serialization)?;
    Ok(serializer.into_serializer().into_inner().to_vec())
}

fn decode_wal_entry(bytes: &[u8]) -> Result<WalEntry, WalError> {
    let mut aligned = AlignedVec::with_capacity(bytes.len());
    aligned.extend_from_slice(bytes);
    let archived =
        rkyv::check_archived_root::<WalEntry>(aligned.as_slice()).map_err(|_| WalError::CorruptEntry)?;
    archived
        .deserialize(&mut rkyv::Infallible)
        .map_err(|_| WalError::CorruptEntry)
}

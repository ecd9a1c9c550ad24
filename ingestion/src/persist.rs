use govsearch_core::model::{DocumentRecord, EdgeRecord};
use std::sync::Arc;
use storage::repo::{CommitSummary, RepoError, Repository, StoreTransaction};

/// Writes one run's documents and edges as a single store transaction.
pub struct PersistenceCoordinator {
    repo: Arc<Repository>,
}

impl PersistenceCoordinator {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Upsert `documents`, drop every stored edge touching one of them, then
    /// insert `edges`. Either all of it commits or none of it does.
    pub async fn persist(
        &self,
        documents: Vec<DocumentRecord>,
        edges: Vec<EdgeRecord>,
    ) -> Result<CommitSummary, RepoError> {
        let touched: Vec<String> = documents.iter().map(|doc| doc.id.clone()).collect();

        let mut tx = StoreTransaction::new();
        tx.upsert_documents(documents)
            .delete_edges_touching(touched)
            .insert_edges(edges);
        tracing::debug!(
            documents = tx.document_count(),
            edges = tx.edge_count(),
            "committing indexing batch"
        );

        let summary = self.repo.commit(tx).await?;
        tracing::debug!(
            documents = summary.documents_upserted,
            edges_deleted = summary.edges_deleted,
            edges_inserted = summary.edges_inserted,
            lsn = summary.lsn,
            "committed indexing batch"
        );
        Ok(summary)
    }
}

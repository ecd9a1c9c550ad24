use crate::dsl::{DocumentQuery, QueryValidationError, ResolvedFilters, CLOSING_SOON_DAYS};
use chrono::{DateTime, Duration, Utc};
use govsearch_core::error::{ErrorCode, GovsearchError};
use govsearch_core::model::{DocumentRecord, Relation};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use storage::repo::{RepoError, Repository};
use thiserror::Error;

static WORD_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z0-9]+").unwrap());

const TITLE_WEIGHT: f64 = 2.0;
const FIELD_WEIGHT: f64 = 1.0;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryValidationError),
    #[error("malformed query json: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("repository error: {0}")]
    Repository(#[from] RepoError),
}

impl GovsearchError for QueryError {
    fn error_code(&self) -> ErrorCode {
        match self {
            QueryError::InvalidQuery(_) | QueryError::Malformed(_) => ErrorCode::InvalidArgument,
            QueryError::Repository(err) => err.error_code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub score: f64,
    pub document: DocumentRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    /// Matches before `limit` was applied.
    pub total_matched: usize,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedDocument {
    pub relation: Relation,
    pub document: DocumentRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub hop: u8,
    pub document: DocumentRecord,
}

/// Read-side access to indexed documents.
pub struct SearchEngine {
    repo: Arc<Repository>,
}

impl SearchEngine {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    pub async fn search_json(&self, raw: &str) -> Result<SearchResponse, QueryError> {
        let query = DocumentQuery::parse_json(raw)?;
        self.search(&query).await
    }

    pub async fn search(&self, query: &DocumentQuery) -> Result<SearchResponse, QueryError> {
        self.search_at(query, Utc::now()).await
    }

    /// Search with `now` as the reference point for "closing soon".
    pub async fn search_at(
        &self,
        query: &DocumentQuery,
        now: DateTime<Utc>,
    ) -> Result<SearchResponse, QueryError> {
        let started = Instant::now();
        let filters = query.resolve()?;
        let terms = query.text().map(terms_of).unwrap_or_default();

        let mut hits: Vec<SearchHit> = self
            .repo
            .documents_snapshot()
            .await
            .into_iter()
            .filter(|doc| passes_filters(doc, &filters, now))
            .filter_map(|doc| {
                let score = keyword_score(&doc, &terms);
                if !terms.is_empty() && score == 0.0 {
                    return None;
                }
                Some(SearchHit {
                    score,
                    document: doc,
                })
            })
            .collect();

        hits.sort_by(compare_hits);
        let total_matched = hits.len();
        hits.truncate(query.limit);

        Ok(SearchResponse {
            hits,
            total_matched,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Documents one edge away from `id`, grouped by relation.
    pub async fn related(&self, id: &str) -> Result<Vec<RelatedDocument>, QueryError> {
        self.repo.get_document(id).await?;

        let edges = self.repo.edges_for(id).await;
        let targets: Vec<String> = edges.iter().map(|edge| edge.dst_id.clone()).collect();
        let documents = self.repo.get_documents_by_ids(&targets).await;

        let mut related: Vec<RelatedDocument> = edges
            .into_iter()
            .filter_map(|edge| {
                let document = documents.iter().find(|doc| doc.id == edge.dst_id)?.clone();
                Some(RelatedDocument {
                    relation: edge.relation,
                    document,
                })
            })
            .collect();
        related.sort_by(|a, b| {
            a.relation
                .cmp(&b.relation)
                .then_with(|| a.document.id.cmp(&b.document.id))
        });
        Ok(related)
    }

    /// Documents reachable from `id` in at most two hops, nearest first.
    pub async fn neighborhood(&self, id: &str) -> Result<Vec<Neighbor>, QueryError> {
        self.repo.get_document(id).await?;

        let reached = self.repo.neighbors_2hop(id).await;
        let ids: Vec<String> = reached.iter().map(|(id, _)| id.clone()).collect();
        let documents = self.repo.get_documents_by_ids(&ids).await;

        let mut neighbors: Vec<Neighbor> = reached
            .into_iter()
            .filter_map(|(id, hop)| {
                let document = documents.iter().find(|doc| doc.id == id)?.clone();
                Some(Neighbor { hop, document })
            })
            .collect();
        neighbors.sort_by(|a, b| {
            a.hop
                .cmp(&b.hop)
                .then_with(|| a.document.id.cmp(&b.document.id))
        });
        Ok(neighbors)
    }
}

fn terms_of(text: &str) -> HashSet<String> {
    WORD_PATTERN
        .find_iter(text)
        .map(|word| word.as_str().to_lowercase())
        .collect()
}

fn keyword_score(doc: &DocumentRecord, terms: &HashSet<String>) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }

    let title = terms_of(&doc.title);
    let summary = doc.summary.as_deref().map(terms_of).unwrap_or_default();
    let agency = doc.agency.as_deref().map(terms_of).unwrap_or_default();
    let codes: HashSet<String> = doc.issue_codes.iter().map(|code| code.to_lowercase()).collect();

    terms
        .iter()
        .map(|term| {
            let mut score = 0.0;
            if title.contains(term) {
                score += TITLE_WEIGHT;
            }
            for field in [&summary, &agency, &codes] {
                if field.contains(term) {
                    score += FIELD_WEIGHT;
                }
            }
            score
        })
        .sum()
}

fn passes_filters(doc: &DocumentRecord, filters: &ResolvedFilters, now: DateTime<Utc>) -> bool {
    if !filters.sources.is_empty() && !filters.sources.contains(&doc.source) {
        return false;
    }
    if !filters.document_types.is_empty() && !filters.document_types.contains(&doc.document_type) {
        return false;
    }
    if let Some(needle) = &filters.agency {
        let matches = doc
            .agency
            .as_deref()
            .is_some_and(|agency| agency.to_lowercase().contains(needle));
        if !matches {
            return false;
        }
    }
    if filters.posted_from.is_some() || filters.posted_to.is_some() {
        let Some(posted) = doc.posted_at.map(|ts| ts.date_naive()) else {
            return false;
        };
        if filters.posted_from.is_some_and(|from| posted < from)
            || filters.posted_to.is_some_and(|to| posted > to)
        {
            return false;
        }
    }
    if let Some(min) = filters.min_priority {
        if doc.priority_score < min {
            return false;
        }
    }
    if filters.closing_soon {
        let deadline = now + Duration::days(CLOSING_SOON_DAYS);
        let closing = doc
            .comment_end_date
            .is_some_and(|end| end >= now && end <= deadline);
        if !closing {
            return false;
        }
    }
    if filters.surge_only && !doc.surge {
        return false;
    }
    true
}

/// Score, then most recent first (undated last), then id.
fn compare_hits(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| match (a.document.posted_at, b.document.posted_at) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.document.id.cmp(&b.document.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use govsearch_core::model::{DocumentType, Source};

    #[test]
    fn test_title_hits_weigh_double() {
        let mut doc = DocumentRecord::new(
            "federal_register:1",
            Source::FederalRegister,
            "Clean Air Standards",
            DocumentType::Rule,
        );
        doc.summary = Some("Updates air permits".into());
        doc.issue_codes = ["ENV".to_string()].into_iter().collect();

        let terms = terms_of("air env");
        // air: title 2 + summary 1, env: issue code 1
        assert_eq!(keyword_score(&doc, &terms), 4.0);
        assert_eq!(keyword_score(&doc, &HashSet::new()), 0.0);
    }

    #[test]
    fn test_closing_soon_excludes_past_and_distant_deadlines() {
        let now = Utc::now();
        let filters = ResolvedFilters {
            closing_soon: true,
            ..ResolvedFilters::default()
        };
        let mut doc = DocumentRecord::new("d", Source::RegulationsGov, "Docket", DocumentType::Docket);

        doc.comment_end_date = Some(now + Duration::days(3));
        assert!(passes_filters(&doc, &filters, now));
        doc.comment_end_date = Some(now - Duration::days(1));
        assert!(!passes_filters(&doc, &filters, now));
        doc.comment_end_date = Some(now + Duration::days(30));
        assert!(!passes_filters(&doc, &filters, now));
        doc.comment_end_date = None;
        assert!(!passes_filters(&doc, &filters, now));
    }
}

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use govsearch_core::error::{ErrorCode, GovsearchError};
use govsearch_core::model::{DocumentRecord, DocumentType, EdgeRecord, Relation, Source};
use query::{DocumentQuery, QueryError, SearchEngine};
use storage::repo::{Repository, StoreTransaction};
use tempfile::TempDir;

fn document(
    id: &str,
    source: Source,
    kind: DocumentType,
    title: &str,
    posted_day: u32,
) -> DocumentRecord {
    let mut doc = DocumentRecord::new(id, source, title, kind);
    doc.posted_at = Some(Utc.with_ymd_and_hms(2024, 3, posted_day, 12, 0, 0).unwrap());
    doc
}

async fn seeded_repo() -> (TempDir, Arc<Repository>) {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(Repository::open(dir.path().join("query.wal")).await.unwrap());
    repo.ensure_schema().await.unwrap();

    let mut notice = document(
        "federal_register:2024-00123",
        Source::FederalRegister,
        DocumentType::Notice,
        "Clean Air Standards for Ports",
        1,
    );
    notice.agency = Some("Environmental Protection Agency".into());
    notice.docket_id = Some("EPA-2024-0001".into());
    notice.issue_codes = ["ENV".to_string()].into_iter().collect();
    notice.priority_score = 5.5;

    let mut docket = document(
        "regulations_gov:EPA-2024-0001-0001",
        Source::RegulationsGov,
        DocumentType::ProposedRule,
        "Port Emissions Docket",
        2,
    );
    docket.agency = Some("EPA".into());
    docket.summary = Some("Clean air requirements for port equipment".into());
    docket.docket_id = Some("EPA-2024-0001".into());
    docket.comments_24h = Some(240);
    docket.surge = true;
    docket.comment_end_date = Some(Utc.with_ymd_and_hms(2024, 3, 12, 3, 59, 59).unwrap());
    docket.priority_score = 4.5;

    let mut bill = document(
        "congress:118-hr-1234",
        Source::Congress,
        DocumentType::Bill,
        "H.R. 1234: Medicare Drug Pricing Act",
        3,
    );
    bill.issue_codes = ["HCR".to_string()].into_iter().collect();
    bill.priority_score = 7.0;

    let mut tx = StoreTransaction::new();
    tx.upsert_documents(vec![notice, docket, bill]).insert_edges(vec![
        EdgeRecord::new(
            "federal_register:2024-00123",
            "regulations_gov:EPA-2024-0001-0001",
            Relation::DocketMatch,
        ),
        EdgeRecord::new(
            "regulations_gov:EPA-2024-0001-0001",
            "federal_register:2024-00123",
            Relation::DocketMatch,
        ),
    ]);
    repo.commit(tx).await.unwrap();

    (dir, repo)
}

fn ids(response: &query::SearchResponse) -> Vec<&str> {
    response
        .hits
        .iter()
        .map(|hit| hit.document.id.as_str())
        .collect()
}

#[tokio::test]
async fn test_keyword_ranking_prefers_title_hits() {
    let (_dir, repo) = seeded_repo().await;
    let engine = SearchEngine::new(repo);

    let response = engine
        .search_json(r#"{"query": "clean air"}"#)
        .await
        .unwrap();

    assert_eq!(
        ids(&response),
        vec![
            "federal_register:2024-00123",
            "regulations_gov:EPA-2024-0001-0001"
        ]
    );
    assert_eq!(response.hits[0].score, 4.0);
    assert_eq!(response.hits[1].score, 2.0);
    assert_eq!(response.total_matched, 2);
}

#[tokio::test]
async fn test_without_text_results_are_most_recent_first() {
    let (_dir, repo) = seeded_repo().await;
    let engine = SearchEngine::new(repo);

    let response = engine.search(&DocumentQuery::default()).await.unwrap();
    assert_eq!(
        ids(&response),
        vec![
            "congress:118-hr-1234",
            "regulations_gov:EPA-2024-0001-0001",
            "federal_register:2024-00123"
        ]
    );

    let limited = engine.search_json(r#"{"limit": 1}"#).await.unwrap();
    assert_eq!(limited.hits.len(), 1);
    assert_eq!(limited.total_matched, 3);
}

#[tokio::test]
async fn test_structured_filters() {
    let (_dir, repo) = seeded_repo().await;
    let engine = SearchEngine::new(repo);

    let by_agency = engine
        .search_json(r#"{"filters": {"agency": "protection"}}"#)
        .await
        .unwrap();
    assert_eq!(ids(&by_agency), vec!["federal_register:2024-00123"]);

    let by_type = engine
        .search_json(r#"{"filters": {"source": ["congress"], "document_type": ["bill"]}}"#)
        .await
        .unwrap();
    assert_eq!(ids(&by_type), vec!["congress:118-hr-1234"]);

    let by_priority = engine
        .search_json(r#"{"filters": {"min_priority": 5.0}}"#)
        .await
        .unwrap();
    assert_eq!(by_priority.total_matched, 2);

    let by_date = engine
        .search_json(r#"{"filters": {"posted": {"from": "2024-03-02", "to": "2024-03-02"}}}"#)
        .await
        .unwrap();
    assert_eq!(ids(&by_date), vec!["regulations_gov:EPA-2024-0001-0001"]);

    let surging = engine
        .search_json(r#"{"filters": {"surge_only": true}}"#)
        .await
        .unwrap();
    assert_eq!(ids(&surging), vec!["regulations_gov:EPA-2024-0001-0001"]);
}

#[tokio::test]
async fn test_closing_soon_is_relative_to_now() {
    let (_dir, repo) = seeded_repo().await;
    let engine = SearchEngine::new(repo);
    let query = DocumentQuery::parse_json(r#"{"filters": {"closing_soon": true}}"#).unwrap();

    let early = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let response = engine.search_at(&query, early).await.unwrap();
    assert_eq!(ids(&response), vec!["regulations_gov:EPA-2024-0001-0001"]);

    let late = early + Duration::days(30);
    let response = engine.search_at(&query, late).await.unwrap();
    assert!(response.hits.is_empty());
}

#[tokio::test]
async fn test_related_follows_outgoing_edges() {
    let (_dir, repo) = seeded_repo().await;
    let engine = SearchEngine::new(repo);

    let related = engine.related("federal_register:2024-00123").await.unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].relation, Relation::DocketMatch);
    assert_eq!(related[0].document.id, "regulations_gov:EPA-2024-0001-0001");

    assert!(engine.related("congress:118-hr-1234").await.unwrap().is_empty());

    let err = engine.related("congress:missing").await.unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn test_invalid_queries_map_to_invalid_argument() {
    let (_dir, repo) = seeded_repo().await;
    let engine = SearchEngine::new(repo);

    let err = engine
        .search_json(r#"{"limit": 0}"#)
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidQuery(_)));
    assert_eq!(err.error_code(), ErrorCode::InvalidArgument);

    let err = engine.search_json("{not json").await.unwrap_err();
    assert!(matches!(err, QueryError::Malformed(_)));
}

#[tokio::test]
async fn test_neighborhood_reaches_two_hops() {
    let (_dir, repo) = seeded_repo().await;
    let mut tx = StoreTransaction::new();
    tx.insert_edges(vec![EdgeRecord::new(
        "regulations_gov:EPA-2024-0001-0001",
        "congress:118-hr-1234",
        Relation::LdaOverlap,
    )]);
    repo.commit(tx).await.unwrap();
    let engine = SearchEngine::new(repo);

    let neighbors = engine
        .neighborhood("federal_register:2024-00123")
        .await
        .unwrap();
    let reached: Vec<(&str, u8)> = neighbors
        .iter()
        .map(|neighbor| (neighbor.document.id.as_str(), neighbor.hop))
        .collect();
    assert_eq!(
        reached,
        vec![
            ("regulations_gov:EPA-2024-0001-0001", 1),
            ("congress:118-hr-1234", 2)
        ]
    );
}

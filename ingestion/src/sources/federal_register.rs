use super::keywords::issue_codes_for;
use super::{AdapterError, FetchBatch, HttpFetcher, SourceAdapter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use govsearch_core::config::FederalRegisterConfig;
use govsearch_core::ingest::RawRow;
use govsearch_core::model::Source;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const FIELDS: [&str; 11] = [
    "document_number",
    "title",
    "type",
    "abstract",
    "html_url",
    "publication_date",
    "agencies",
    "docket_ids",
    "regulation_id_numbers",
    "effective_on",
    "comments_close_on",
];

#[derive(Debug, Deserialize)]
struct DocumentsPage {
    #[serde(default)]
    results: Option<Vec<FrDocument>>,
    #[serde(default)]
    next_page_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FrDocument {
    document_number: Option<String>,
    title: Option<String>,
    #[serde(rename = "type")]
    document_type: Option<String>,
    #[serde(rename = "abstract")]
    summary: Option<String>,
    html_url: Option<String>,
    publication_date: Option<String>,
    agencies: Option<Vec<FrAgency>>,
    docket_ids: Option<Vec<String>>,
    regulation_id_numbers: Option<Vec<String>>,
    effective_on: Option<String>,
    comments_close_on: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FrAgency {
    name: Option<String>,
    raw_name: Option<String>,
}

/// Federal Register documents published within the window (day granularity).
pub struct FederalRegisterAdapter {
    config: FederalRegisterConfig,
    fetcher: Arc<HttpFetcher>,
}

impl FederalRegisterAdapter {
    pub fn new(config: FederalRegisterConfig, fetcher: Arc<HttpFetcher>) -> Self {
        Self { config, fetcher }
    }
}

#[async_trait]
impl SourceAdapter for FederalRegisterAdapter {
    fn source(&self) -> Source {
        Source::FederalRegister
    }

    async fn fetch(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<FetchBatch, AdapterError> {
        let url = format!("{}/documents.json", self.config.base_url.trim_end_matches('/'));
        let headers = HeaderMap::new();
        let mut rows = Vec::new();

        for page in 1..=self.config.max_pages.max(1) {
            let mut query = vec![
                ("per_page", self.config.page_size.to_string()),
                ("order", "newest".to_string()),
                ("conditions[publication_date][gte]", since.format("%Y-%m-%d").to_string()),
                ("conditions[publication_date][lte]", until.format("%Y-%m-%d").to_string()),
                ("page", page.to_string()),
            ];
            query.extend(FIELDS.iter().map(|field| ("fields[]", field.to_string())));

            let body = self.fetcher.get_json(&url, &query, &headers).await?;
            let page_data: DocumentsPage = serde_json::from_value(body)?;
            let results = page_data.results.unwrap_or_default();
            let exhausted = results.is_empty() || page_data.next_page_url.is_none();
            rows.extend(results.into_iter().map(to_row));

            if exhausted {
                break;
            }
        }

        tracing::debug!(rows = rows.len(), "fetched federal register documents");
        Ok(FetchBatch::from(rows))
    }
}

fn to_row(doc: FrDocument) -> RawRow {
    let title = doc.title.unwrap_or_default();
    let summary = doc.summary.unwrap_or_default();
    let issue_codes: Vec<String> = issue_codes_for(&format!("{title} {summary}"))
        .into_iter()
        .collect();

    let agency = doc
        .agencies
        .unwrap_or_default()
        .into_iter()
        .filter_map(|agency| agency.name.or(agency.raw_name))
        .collect::<Vec<_>>()
        .join(", ");
    let docket_id = doc.docket_ids.unwrap_or_default().into_iter().next();
    let rin = doc.regulation_id_numbers.unwrap_or_default().into_iter().next();

    RawRow::new()
        .with("source", Source::FederalRegister.as_str())
        .with("source_id", doc.document_number.clone())
        .with("ts", doc.publication_date)
        .with("title", title)
        .with("link", doc.html_url.clone())
        .with("agency", (!agency.is_empty()).then_some(agency))
        .with("docket_id", docket_id)
        .with("rin", rin)
        .with("comment_end_date", doc.comments_close_on)
        .with("issue_codes", issue_codes)
        .with(
            "metric_json",
            json!({
                "document_number": doc.document_number,
                "document_type": doc.document_type,
                "abstract": summary,
                "effective_date": doc.effective_on,
                "fr_link": doc.html_url,
            }),
        )
}

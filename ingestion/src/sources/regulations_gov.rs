use super::keywords::issue_codes_for;
use super::{AdapterError, FetchBatch, HttpFetcher, SourceAdapter};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use govsearch_core::config::RegulationsGovConfig;
use govsearch_core::ingest::RawRow;
use govsearch_core::model::Source;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

const FILTER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Deserialize)]
struct DocumentsPage {
    #[serde(default)]
    data: Option<Vec<RegsDocument>>,
    #[serde(default)]
    meta: Option<PageMeta>,
}

#[derive(Debug, Deserialize)]
struct CountPage {
    #[serde(default)]
    meta: Option<PageMeta>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PageMeta {
    has_next_page: bool,
    total_elements: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RegsDocument {
    id: String,
    #[serde(default)]
    attributes: RegsAttributes,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RegsAttributes {
    title: Option<String>,
    docket_id: Option<String>,
    agency_id: Option<String>,
    document_type: Option<String>,
    posted_date: Option<String>,
    last_modified_date: Option<String>,
    comment_end_date: Option<String>,
    open_for_comment: Option<bool>,
    fr_doc_num: Option<String>,
}

/// Regulations.gov documents modified within the window, with a trailing
/// 24-hour comment count for dockets open for comment.
pub struct RegulationsGovAdapter {
    config: RegulationsGovConfig,
    fetcher: Arc<HttpFetcher>,
}

impl RegulationsGovAdapter {
    pub fn new(config: RegulationsGovConfig, fetcher: Arc<HttpFetcher>) -> Self {
        Self { config, fetcher }
    }

    fn headers(&self) -> Result<HeaderMap, AdapterError> {
        let key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(AdapterError::MissingCredential("regulations_gov"))?;
        let value = HeaderValue::from_str(key.trim())
            .map_err(|_| AdapterError::Client("API key is not a valid header value".into()))?;

        let mut headers = HeaderMap::new();
        headers.insert("X-Api-Key", value);
        Ok(headers)
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    async fn fetch_documents(
        &self,
        headers: &HeaderMap,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<RegsDocument>, AdapterError> {
        let url = format!("{}/documents", self.base_url());
        let mut documents = Vec::new();

        for page in 1..=self.config.max_pages.max(1) {
            let query = [
                (
                    "filter[lastModifiedDate][ge]",
                    since.format(FILTER_TIME_FORMAT).to_string(),
                ),
                (
                    "filter[lastModifiedDate][le]",
                    until.format(FILTER_TIME_FORMAT).to_string(),
                ),
                ("page[size]", self.config.page_size.to_string()),
                ("page[number]", page.to_string()),
                ("sort", "lastModifiedDate".to_string()),
            ];

            let body = self.fetcher.get_json(&url, &query, headers).await?;
            let page_data: DocumentsPage = serde_json::from_value(body)?;
            let data = page_data.data.unwrap_or_default();
            let has_next = page_data.meta.is_some_and(|meta| meta.has_next_page);
            let exhausted = data.is_empty() || !has_next;
            documents.extend(data);

            if exhausted {
                break;
            }
        }

        Ok(documents)
    }

    /// Comments received on `docket_id` in the 24 hours before `until`.
    async fn comments_last_day(
        &self,
        headers: &HeaderMap,
        docket_id: &str,
        until: DateTime<Utc>,
    ) -> Result<i64, AdapterError> {
        let url = format!("{}/comments", self.base_url());
        let query = [
            ("filter[docketId]", docket_id.to_string()),
            (
                "filter[lastModifiedDate][ge]",
                (until - Duration::hours(24)).format(FILTER_TIME_FORMAT).to_string(),
            ),
            (
                "filter[lastModifiedDate][le]",
                until.format(FILTER_TIME_FORMAT).to_string(),
            ),
            ("page[size]", "5".to_string()),
        ];

        let body = self.fetcher.get_json(&url, &query, headers).await?;
        let page: CountPage = serde_json::from_value(body)?;
        page.meta
            .and_then(|meta| meta.total_elements)
            .ok_or_else(|| AdapterError::Decode(format!("no totalElements for docket {docket_id}")))
    }
}

#[async_trait]
impl SourceAdapter for RegulationsGovAdapter {
    fn source(&self) -> Source {
        Source::RegulationsGov
    }

    async fn fetch(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<FetchBatch, AdapterError> {
        let headers = self.headers()?;
        let documents = self.fetch_documents(&headers, since, until).await?;

        let mut surge_dockets: Vec<&str> = Vec::new();
        for doc in &documents {
            let attrs = &doc.attributes;
            if let (Some(docket_id), Some(true)) = (attrs.docket_id.as_deref(), attrs.open_for_comment) {
                if !surge_dockets.contains(&docket_id) {
                    surge_dockets.push(docket_id);
                }
            }
        }
        surge_dockets.truncate(self.config.max_surge_dockets);

        let mut comment_counts: HashMap<String, i64> = HashMap::new();
        for docket_id in surge_dockets {
            match self.comments_last_day(&headers, docket_id, until).await {
                Ok(count) => {
                    comment_counts.insert(docket_id.to_string(), count);
                }
                Err(err) => {
                    tracing::warn!(docket_id, error = %err, "comment count unavailable");
                }
            }
        }

        let rows: Vec<RawRow> = documents
            .into_iter()
            .map(|doc| {
                let count = doc
                    .attributes
                    .docket_id
                    .as_deref()
                    .and_then(|docket_id| comment_counts.get(docket_id).copied());
                to_row(doc, count)
            })
            .collect();

        tracing::debug!(rows = rows.len(), counted_dockets = comment_counts.len(), "fetched regulations.gov documents");
        Ok(FetchBatch::from(rows))
    }
}

fn to_row(doc: RegsDocument, comments_24h: Option<i64>) -> RawRow {
    let attrs = doc.attributes;
    let title = attrs.title.unwrap_or_default();
    let issue_codes: Vec<String> = issue_codes_for(&title).into_iter().collect();

    RawRow::new()
        .with("source", Source::RegulationsGov.as_str())
        .with("source_id", doc.id.clone())
        .with("ts", attrs.posted_date.or(attrs.last_modified_date))
        .with("title", title)
        .with("link", format!("https://www.regulations.gov/document/{}", doc.id))
        .with("agency", attrs.agency_id)
        .with("docket_id", attrs.docket_id)
        .with("comment_end_date", attrs.comment_end_date)
        .with("comments_24h", comments_24h)
        .with("issue_codes", issue_codes)
        .with(
            "metric_json",
            json!({
                "regs_document_id": doc.id,
                "document_type": attrs.document_type,
                "fr_doc_num": attrs.fr_doc_num,
                "open_for_comment": attrs.open_for_comment,
            }),
        )
}

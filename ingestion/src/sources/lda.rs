use super::{AdapterError, FetchBatch, HttpFetcher, SourceAdapter};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use govsearch_core::config::LdaConfig;
use govsearch_core::ingest::RawRow;
use govsearch_core::model::Source;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct FilingsPage {
    #[serde(default)]
    results: Option<Vec<Filing>>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Filing {
    filing_uuid: Option<String>,
    filing_type: Option<String>,
    filing_period: Option<String>,
    filing_year: Option<Value>,
    filing_document_url: Option<String>,
    dt_posted: Option<String>,
    income: Option<Value>,
    expenses: Option<Value>,
    client: Option<Party>,
    registrant: Option<Party>,
    lobbying_activities: Option<Vec<LobbyingActivity>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Party {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LobbyingActivity {
    general_issue_code: Option<String>,
    description: Option<String>,
}

/// Lobbying-disclosure filings posted since the window start, flattened into
/// the filing join shape the normalizer expects.
pub struct LdaAdapter {
    config: LdaConfig,
    fetcher: Arc<HttpFetcher>,
}

impl LdaAdapter {
    pub fn new(config: LdaConfig, fetcher: Arc<HttpFetcher>) -> Self {
        Self { config, fetcher }
    }

    /// The public API accepts anonymous requests at a lower rate limit.
    fn headers(&self) -> Result<HeaderMap, AdapterError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = self.config.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            let value = HeaderValue::from_str(&format!("Token {key}"))
                .map_err(|_| AdapterError::Client("API key is not a valid header value".into()))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl SourceAdapter for LdaAdapter {
    fn source(&self) -> Source {
        Source::Lda
    }

    async fn fetch(
        &self,
        since: DateTime<Utc>,
        _until: DateTime<Utc>,
    ) -> Result<FetchBatch, AdapterError> {
        let headers = self.headers()?;
        let first_url = format!("{}/filings/", self.config.base_url.trim_end_matches('/'));
        let first_query = [
            (
                "filing_dt_posted_after",
                since.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            ("page_size", self.config.page_size.to_string()),
            ("ordering", "-dt_posted".to_string()),
        ];

        let mut rows = Vec::new();
        let mut next_url = Some(first_url.clone());
        let mut pages = 0;
        while let Some(url) = next_url.take() {
            if pages >= self.config.max_pages.max(1) {
                tracing::warn!(pages, "filing page limit reached, remaining pages skipped");
                break;
            }
            // `next` links already carry the original query.
            let query: &[(&str, String)] = if url == first_url { &first_query } else { &[] };
            let body = self.fetcher.get_json(&url, query, &headers).await?;
            let page: FilingsPage = serde_json::from_value(body)?;
            pages += 1;

            let results = page.results.unwrap_or_default();
            if results.is_empty() {
                break;
            }
            rows.extend(results.into_iter().map(to_row));
            next_url = page.next.filter(|next| !next.trim().is_empty());
        }

        tracing::debug!(rows = rows.len(), pages, "fetched lobbying filings");
        Ok(FetchBatch::from(rows))
    }
}

/// `first_quarter` -> `Q1`, ..., `mid_year` -> `H1`, `year_end` -> `H2`.
pub fn quarter_label(period: &str) -> Option<&'static str> {
    match period.trim().to_lowercase().as_str() {
        "first_quarter" => Some("Q1"),
        "second_quarter" => Some("Q2"),
        "third_quarter" => Some("Q3"),
        "fourth_quarter" => Some("Q4"),
        "mid_year" => Some("H1"),
        "year_end" => Some("H2"),
        _ => None,
    }
}

/// Filings without a uuid are still forwarded; the normalizer falls back to
/// a content hash for their id.
fn to_row(filing: Filing) -> RawRow {
    let uid = filing.filing_uuid.filter(|uid| !uid.trim().is_empty());
    let activities = filing.lobbying_activities.unwrap_or_default();

    let issue_codes: Vec<String> = activities
        .iter()
        .filter_map(|activity| activity.general_issue_code.as_deref())
        .map(|code| code.trim().to_uppercase())
        .filter(|code| !code.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let summary = activities
        .iter()
        .filter_map(|activity| activity.description.as_deref().map(str::trim))
        .filter(|description| !description.is_empty())
        .collect::<Vec<_>>()
        .join("; ");
    let amount = filing
        .income
        .filter(|value| !value.is_null())
        .or(filing.expenses.filter(|value| !value.is_null()));
    let quarter = filing.filing_period.as_deref().and_then(quarter_label);

    RawRow::new()
        .with("id", uid.clone())
        .with("filing_uid", uid)
        .with("filing_date", filing.dt_posted)
        .with("summary", (!summary.is_empty()).then_some(summary))
        .with("amount", amount)
        .with("url", filing.filing_document_url)
        .with("quarter", quarter)
        .with("year", filing.filing_year)
        .with("filing_type", filing.filing_type)
        .with("client_name", filing.client.and_then(|party| party.name))
        .with("registrant_name", filing.registrant.and_then(|party| party.name))
        .with("issue_codes", issue_codes)
}

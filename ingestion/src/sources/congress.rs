use super::keywords::issue_codes_for;
use super::{AdapterError, FetchBatch, HttpFetcher, SourceAdapter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use govsearch_core::config::CongressConfig;
use govsearch_core::ingest::RawRow;
use govsearch_core::model::Source;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const API_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// (API type code, citation prefix, congress.gov path segment)
const BILL_TYPES: [(&str, &str, &str); 8] = [
    ("HR", "H.R.", "house-bill"),
    ("S", "S.", "senate-bill"),
    ("HRES", "H.Res.", "house-resolution"),
    ("SRES", "S.Res.", "senate-resolution"),
    ("HJRES", "H.J.Res.", "house-joint-resolution"),
    ("SJRES", "S.J.Res.", "senate-joint-resolution"),
    ("HCONRES", "H.Con.Res.", "house-concurrent-resolution"),
    ("SCONRES", "S.Con.Res.", "senate-concurrent-resolution"),
];

#[derive(Debug, Deserialize)]
struct BillsPage {
    #[serde(default)]
    bills: Option<Vec<BillSummary>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BillSummary {
    congress: Option<u32>,
    #[serde(rename = "type")]
    bill_type: Option<String>,
    number: Option<Value>,
    title: Option<String>,
    update_date: Option<String>,
    origin_chamber: Option<String>,
    latest_action: Option<LatestAction>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LatestAction {
    action_date: Option<String>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeetingsPage {
    #[serde(default)]
    committee_meetings: Option<Vec<MeetingSummary>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct MeetingSummary {
    event_id: Option<Value>,
    chamber: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeetingDetailEnvelope {
    committee_meeting: MeetingDetail,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct MeetingDetail {
    event_id: Option<Value>,
    title: Option<String>,
    #[serde(rename = "type")]
    meeting_type: Option<String>,
    date: Option<String>,
    chamber: Option<String>,
    meeting_status: Option<String>,
    committees: Option<Vec<Committee>>,
    related_items: Option<RelatedItems>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Committee {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RelatedItems {
    bills: Option<Vec<RelatedBill>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RelatedBill {
    #[serde(rename = "type")]
    bill_type: Option<String>,
    number: Option<Value>,
}

/// Bills and committee meetings updated within the window.
pub struct CongressAdapter {
    config: CongressConfig,
    fetcher: Arc<HttpFetcher>,
}

impl CongressAdapter {
    pub fn new(config: CongressConfig, fetcher: Arc<HttpFetcher>) -> Self {
        Self { config, fetcher }
    }

    fn api_key(&self) -> Result<String, AdapterError> {
        self.config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .ok_or(AdapterError::MissingCredential("congress"))
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn window_query(
        &self,
        api_key: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        offset: u32,
    ) -> Vec<(&'static str, String)> {
        vec![
            ("api_key", api_key.to_string()),
            ("format", "json".to_string()),
            ("limit", self.config.page_size.to_string()),
            ("offset", offset.to_string()),
            ("fromDateTime", since.format(API_TIME_FORMAT).to_string()),
            ("toDateTime", until.format(API_TIME_FORMAT).to_string()),
        ]
    }

    async fn fetch_bills(
        &self,
        api_key: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<FetchBatch, AdapterError> {
        let url = format!("{}/bill/{}", self.base_url(), self.config.congress);
        let headers = HeaderMap::new();
        let mut batch = FetchBatch::default();

        for page in 0..self.config.max_pages.max(1) {
            let offset = page * self.config.page_size;
            let query = self.window_query(api_key, since, until, offset);
            let body = self.fetcher.get_json(&url, &query, &headers).await?;
            let bills = serde_json::from_value::<BillsPage>(body)?
                .bills
                .unwrap_or_default();
            let fetched = bills.len();
            for bill in bills {
                let label = bill_label(&bill);
                match self.bill_row(bill) {
                    Ok(row) => batch.push(row),
                    Err(reason) => batch.skip(Source::Congress, label, reason),
                }
            }

            if fetched < self.config.page_size as usize {
                break;
            }
        }
        Ok(batch)
    }

    async fn fetch_meetings(
        &self,
        api_key: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<FetchBatch, AdapterError> {
        let url = format!("{}/committee-meeting/{}", self.base_url(), self.config.congress);
        let headers = HeaderMap::new();
        let query = self.window_query(api_key, since, until, 0);
        let body = self.fetcher.get_json(&url, &query, &headers).await?;
        let meetings = serde_json::from_value::<MeetingsPage>(body)?
            .committee_meetings
            .unwrap_or_default();

        let detail_query = [
            ("api_key", api_key.to_string()),
            ("format", "json".to_string()),
        ];
        let mut batch = FetchBatch::default();
        for meeting in meetings.into_iter().take(self.config.max_meeting_details) {
            let event_id = meeting.event_id.as_ref().and_then(value_text);
            let (Some(event_id), Some(chamber)) = (event_id.clone(), meeting.chamber.as_deref())
            else {
                let label = event_id.unwrap_or_else(|| "meeting without event id".to_string());
                batch.skip(Source::Congress, label, "meeting listing has no event id or chamber");
                continue;
            };
            let detail_url = format!(
                "{}/committee-meeting/{}/{}/{}",
                self.base_url(),
                self.config.congress,
                chamber.to_lowercase(),
                event_id
            );

            let detail = match self.fetcher.get_json(&detail_url, &detail_query, &headers).await {
                Ok(body) => serde_json::from_value::<MeetingDetailEnvelope>(body)
                    .map(|envelope| envelope.committee_meeting)
                    .map_err(AdapterError::from),
                Err(err) => Err(err),
            };
            match detail.map(|detail| self.meeting_row(detail)) {
                Ok(Ok(row)) => batch.push(row),
                Ok(Err(reason)) => batch.skip(Source::Congress, format!("meeting-{event_id}"), reason),
                Err(err) => batch.skip(Source::Congress, format!("meeting-{event_id}"), err),
            }
        }
        Ok(batch)
    }

    fn bill_row(&self, bill: BillSummary) -> Result<RawRow, &'static str> {
        let bill_type = bill.bill_type.ok_or("bill has no type")?.to_uppercase();
        let number = bill
            .number
            .as_ref()
            .and_then(value_text)
            .ok_or("bill has no number")?;
        let congress = bill.congress.unwrap_or(self.config.congress);
        let (_, citation, path) = BILL_TYPES
            .iter()
            .find(|(code, _, _)| *code == bill_type)
            .ok_or("unknown bill type")?;

        let title = bill.title.unwrap_or_default();
        let action = bill.latest_action.unwrap_or_default();
        let action_text = action.text.unwrap_or_default();
        let issue_codes: Vec<String> = issue_codes_for(&format!("{title} {action_text}"))
            .into_iter()
            .collect();
        let summary = (!action_text.is_empty()).then(|| format!("Latest action: {action_text}"));

        Ok(
            RawRow::new()
                .with("source", Source::Congress.as_str())
                .with(
                    "source_id",
                    format!("{congress}-{}-{number}", bill_type.to_lowercase()),
                )
                .with("ts", bill.update_date.or(action.action_date.clone()))
                .with("title", format!("{citation} {number}: {title}"))
                .with(
                    "link",
                    format!("https://www.congress.gov/bill/{}-congress/{path}/{number}", ordinal(congress)),
                )
                .with("bill_id", format!("{bill_type}{number}"))
                .with("signal_type", "bill")
                .with("issue_codes", issue_codes)
                .with(
                    "metric_json",
                    json!({
                        "congress": congress,
                        "bill_type": bill_type,
                        "bill_number": number,
                        "origin_chamber": bill.origin_chamber,
                        "latest_action_date": action.action_date,
                        "summary": summary,
                    }),
                ),
        )
    }

    fn meeting_row(&self, detail: MeetingDetail) -> Result<RawRow, &'static str> {
        let event_id = detail
            .event_id
            .as_ref()
            .and_then(value_text)
            .ok_or("meeting detail has no event id")?;
        let kind = detail
            .meeting_type
            .as_deref()
            .map(str::to_lowercase)
            .filter(|kind| matches!(kind.as_str(), "hearing" | "meeting" | "markup"))
            .unwrap_or_else(|| "meeting".to_string());
        let committee = detail
            .committees
            .unwrap_or_default()
            .into_iter()
            .find_map(|committee| committee.name);
        let title = detail
            .title
            .filter(|title| !title.trim().is_empty())
            .or_else(|| committee.as_ref().map(|name| format!("{} of {name}", capitalize(&kind))))
            .ok_or("meeting has neither a title nor a committee")?;

        let related: Vec<String> = detail
            .related_items
            .and_then(|items| items.bills)
            .unwrap_or_default()
            .iter()
            .filter_map(|bill| {
                let code = bill.bill_type.as_deref()?.to_uppercase();
                let number = bill.number.as_ref().and_then(value_text)?;
                Some(format!("{} {number}", bill_citation(&code)?))
            })
            .collect();
        let summary = (!related.is_empty()).then(|| format!("Related bills: {}", related.join(", ")));
        let issue_codes: Vec<String> = issue_codes_for(&title).into_iter().collect();
        let chamber = detail.chamber.unwrap_or_default().to_lowercase();

        Ok(
            RawRow::new()
                .with("source", Source::Congress.as_str())
                .with("source_id", format!("meeting-{event_id}"))
                .with("ts", detail.date)
                .with("title", title)
                .with(
                    "link",
                    format!(
                        "https://www.congress.gov/event/{}-congress/{chamber}-event/{event_id}",
                        ordinal(self.config.congress)
                    ),
                )
                .with("committee", committee.clone())
                .with("signal_type", kind)
                .with("issue_codes", issue_codes)
                .with(
                    "metric_json",
                    json!({
                        "event_id": event_id,
                        "committee": committee,
                        "chamber": chamber,
                        "meeting_status": detail.meeting_status,
                        "summary": summary,
                    }),
                ),
        )
    }
}

#[async_trait]
impl SourceAdapter for CongressAdapter {
    fn source(&self) -> Source {
        Source::Congress
    }

    async fn fetch(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<FetchBatch, AdapterError> {
        let api_key = self.api_key()?;
        let mut batch = self.fetch_bills(&api_key, since, until).await?;
        let bills = batch.rows.len();
        batch.extend(self.fetch_meetings(&api_key, since, until).await?);

        tracing::debug!(
            bills,
            meetings = batch.rows.len() - bills,
            skipped = batch.skipped.len(),
            "fetched congress activity"
        );
        Ok(batch)
    }
}

/// Citation prefix for an API bill type code (`HRES` -> `H.Res.`).
pub fn bill_citation(code: &str) -> Option<&'static str> {
    BILL_TYPES
        .iter()
        .find(|(known, _, _)| *known == code)
        .map(|(_, citation, _)| *citation)
}

/// Best available identifier for a bill listing, for logs.
fn bill_label(bill: &BillSummary) -> String {
    let number = bill.number.as_ref().and_then(value_text);
    match (bill.bill_type.as_deref(), number) {
        (Some(kind), Some(number)) => format!("{}{number}", kind.to_uppercase()),
        (_, Some(number)) => format!("bill {number}"),
        _ => bill
            .title
            .clone()
            .unwrap_or_else(|| "bill without number".to_string()),
    }
}

fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::{bill_ids_in, canonical_bill_id};

    fn adapter() -> CongressAdapter {
        let fetcher = Arc::new(HttpFetcher::new(&Default::default()).unwrap());
        CongressAdapter::new(CongressConfig::default(), fetcher)
    }

    #[test]
    fn test_bill_row_carries_canonical_bill_id() {
        let bill: BillSummary = serde_json::from_value(json!({
            "congress": 118,
            "type": "HR",
            "number": "1234",
            "title": "Clean Water Infrastructure Act",
            "updateDate": "2024-03-01T12:00:00Z",
            "latestAction": {"actionDate": "2024-02-28", "text": "Referred to committee."}
        }))
        .unwrap();

        let row = adapter().bill_row(bill).unwrap();
        assert_eq!(row.text("source_id").as_deref(), Some("118-hr-1234"));
        assert_eq!(row.text("bill_id").as_deref(), Some("HR1234"));
        let title = row.text("title").unwrap();
        assert_eq!(title, "H.R. 1234: Clean Water Infrastructure Act");
        assert_eq!(canonical_bill_id(&title).as_deref(), Some("HR1234"));
        assert_eq!(
            row.text("link").as_deref(),
            Some("https://www.congress.gov/bill/118th-congress/house-bill/1234")
        );
        assert_eq!(row.strings("issue_codes"), vec!["TRA"]);
    }

    #[test]
    fn test_unmappable_bills_report_a_reason() {
        let bill: BillSummary =
            serde_json::from_value(json!({"type": "XYZ", "number": 1, "title": "?"})).unwrap();
        assert_eq!(bill_label(&bill), "XYZ1");
        assert_eq!(adapter().bill_row(bill).unwrap_err(), "unknown bill type");

        let bill: BillSummary =
            serde_json::from_value(json!({"type": "HR", "title": "Untitled"})).unwrap();
        assert_eq!(bill_label(&bill), "Untitled");
        assert_eq!(adapter().bill_row(bill).unwrap_err(), "bill has no number");
    }

    #[test]
    fn test_untitled_meeting_without_committee_reports_a_reason() {
        let detail: MeetingDetail =
            serde_json::from_value(json!({"eventId": 1, "type": "Hearing"})).unwrap();
        assert_eq!(
            adapter().meeting_row(detail).unwrap_err(),
            "meeting has neither a title nor a committee"
        );
    }

    #[test]
    fn test_meeting_summary_lists_related_bills_in_citation_form() {
        let detail: MeetingDetail = serde_json::from_value(json!({
            "eventId": 115538,
            "title": "Markup of energy legislation",
            "type": "Markup",
            "date": "2024-03-05T14:00:00Z",
            "chamber": "House",
            "committees": [{"name": "House Energy and Commerce Committee"}],
            "relatedItems": {"bills": [
                {"type": "HR", "number": "1234"},
                {"type": "SRES", "number": 45}
            ]}
        }))
        .unwrap();

        let row = adapter().meeting_row(detail).unwrap();
        assert_eq!(row.text("source_id").as_deref(), Some("meeting-115538"));
        assert_eq!(row.text("signal_type").as_deref(), Some("markup"));
        assert_eq!(
            row.text("committee").as_deref(),
            Some("House Energy and Commerce Committee")
        );
        let summary = row.object("metric_json").unwrap().text("summary").unwrap();
        assert_eq!(summary, "Related bills: H.R. 1234, S.Res. 45");
        let ids: Vec<String> = bill_ids_in(&summary).into_iter().collect();
        assert_eq!(ids, vec!["HR1234", "SRES45"]);
    }

    #[test]
    fn test_ordinals() {
        assert_eq!(ordinal(118), "118th");
        assert_eq!(ordinal(111), "111th");
        assert_eq!(ordinal(101), "101st");
        assert_eq!(ordinal(102), "102nd");
    }
}

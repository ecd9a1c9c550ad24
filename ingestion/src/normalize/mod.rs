//! Raw adapter rows to [`DocumentRecord`]s.
//!
//! Congress, Federal Register and Regulations.gov rows share the signal-row
//! shape (`source_id`, `ts`, `title`, `link`, `metric_json`, ...). Lobbying
//! filings arrive in the filing join shape (`filing_uid`, `client_name`,
//! `registrant_name`, `quarter`, `year`, ...).

mod identity;
mod time;

pub use identity::stable_id;
pub use time::parse_timestamp;

use crate::scoring::{normalize_type_key, PriorityScorer, ScoringTables};
use chrono::{DateTime, Utc};
use govsearch_core::config::{ScoringConfig, DEFAULT_SURGE_THRESHOLD};
use govsearch_core::error::{ErrorCode, GovsearchError};
use govsearch_core::ingest::RawRow;
use govsearch_core::model::{
    canonical_issue_codes, DocumentRecord, DocumentType, ModelError, Source,
};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

const SUMMARY_KEYS: [&str; 5] = [
    "summary",
    "abstract",
    "description",
    "short_summary",
    "introduction",
];

const BUILTIN_DOCUMENT_TYPES: [(&str, DocumentType); 12] = [
    ("rule", DocumentType::Rule),
    ("final rule", DocumentType::Rule),
    ("final_rule", DocumentType::Rule),
    ("proposed rule", DocumentType::ProposedRule),
    ("proposed_rule", DocumentType::ProposedRule),
    ("notice", DocumentType::Notice),
    ("hearing", DocumentType::Hearing),
    ("meeting", DocumentType::Hearing),
    ("markup", DocumentType::Hearing),
    ("bill", DocumentType::Bill),
    ("docket", DocumentType::Docket),
    ("comment", DocumentType::Docket),
];

/// Weight key used to score lobbying filings.
pub const FILING_TYPE_KEY: &str = "docket";

#[derive(Debug, Error)]
pub enum NormalizationError {
    #[error("{0} row {1} has no title")]
    MissingTitle(Source, String),
    #[error("row {row}: invalid {field}: {reason}")]
    InvalidField {
        row: String,
        field: &'static str,
        reason: String,
    },
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] ModelError),
}

impl GovsearchError for NormalizationError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::InvalidArgument
    }
}

/// Signal-type to document-type mapping plus the surge threshold.
#[derive(Debug, Clone)]
pub struct NormalizerTables {
    document_types: BTreeMap<String, DocumentType>,
    surge_threshold: i64,
}

impl NormalizerTables {
    pub fn builtin() -> Self {
        Self {
            document_types: BUILTIN_DOCUMENT_TYPES
                .iter()
                .map(|(key, kind)| (key.to_string(), *kind))
                .collect(),
            surge_threshold: DEFAULT_SURGE_THRESHOLD,
        }
    }

    pub fn with_surge_threshold(mut self, threshold: i64) -> Self {
        self.surge_threshold = threshold;
        self
    }

    pub fn document_type(&self, key: &str) -> Option<DocumentType> {
        self.document_types.get(key).copied()
    }

    pub fn surge_threshold(&self) -> i64 {
        self.surge_threshold
    }
}

impl Default for NormalizerTables {
    fn default() -> Self {
        Self::builtin()
    }
}

#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub documents: Vec<DocumentRecord>,
    pub rejected: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    tables: NormalizerTables,
    scorer: PriorityScorer,
}

impl Normalizer {
    pub fn new(tables: NormalizerTables, scorer: PriorityScorer) -> Self {
        Self { tables, scorer }
    }

    pub fn from_config(config: &ScoringConfig) -> Self {
        Self::new(
            NormalizerTables::builtin().with_surge_threshold(config.surge_threshold),
            PriorityScorer::new(ScoringTables::from_config(config)),
        )
    }

    pub fn scorer(&self) -> &PriorityScorer {
        &self.scorer
    }

    /// Normalize every row, logging and counting the ones that fail.
    pub fn normalize_batch(&self, source: Source, rows: &[RawRow]) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();
        for row in rows {
            match self.normalize(source, row) {
                Ok(doc) => batch.documents.push(doc),
                Err(err) => {
                    batch.rejected += 1;
                    tracing::warn!(
                        source = %source,
                        row = %row.identifier(),
                        error = %err,
                        "skipping malformed row"
                    );
                }
            }
        }
        batch
    }

    pub fn normalize(
        &self,
        source: Source,
        row: &RawRow,
    ) -> Result<DocumentRecord, NormalizationError> {
        if let Some(declared) = row.text("source") {
            if declared.parse::<Source>().ok() != Some(source) {
                return Err(NormalizationError::InvalidField {
                    row: row.identifier(),
                    field: "source",
                    reason: format!("row declares {declared:?} but was fetched from {source}"),
                });
            }
        }

        let doc = match source {
            Source::Lda => self.normalize_filing(row)?,
            _ => self.normalize_signal(source, row)?,
        };
        doc.validate()?;
        Ok(doc)
    }

    fn normalize_signal(
        &self,
        source: Source,
        row: &RawRow,
    ) -> Result<DocumentRecord, NormalizationError> {
        let title = row
            .text("title")
            .ok_or_else(|| NormalizationError::MissingTitle(source, row.identifier()))?;
        let metrics = row.object("metric_json").unwrap_or_default();

        let signal_type = self.resolve_signal_type(source, row, &metrics);
        let document_type = self.resolve_document_type(source, &signal_type, row, &metrics);

        let url = row.text("link").or_else(|| metrics.text("fr_link"));
        let docket_id = row.text("docket_id");
        let bill_id = row.text("bill_id");
        let origin_id = metrics.text("uid").or_else(|| row.text("source_id"));
        let secondary_id = metrics
            .text("document_number")
            .or_else(|| metrics.text("regs_document_id"));

        let id = stable_id(
            source,
            [
                origin_id.as_deref(),
                secondary_id.as_deref(),
                docket_id.as_deref(),
                bill_id.as_deref(),
            ],
            &title,
            url.as_deref(),
        );

        let issue_codes = canonical_issue_codes(row.strings("issue_codes"));
        let comments_24h = comment_count(row)?;
        let priority_score = match row.float("priority_score") {
            Some(score) if score.is_finite() && score > 0.0 => score,
            _ => self.scorer.score(&signal_type, &title, &issue_codes),
        };

        let mut features = Map::new();
        features.insert("metrics".into(), Value::Object(metrics.as_map().clone()));
        if let Some(committee) = row.text("committee") {
            features.insert("committee".into(), Value::String(committee));
        }
        if let Some(bill_id) = &bill_id {
            features.insert("bill_id".into(), Value::String(bill_id.clone()));
        }
        if let Some(docket_id) = &docket_id {
            features.insert("docket_id".into(), Value::String(docket_id.clone()));
        }

        let mut doc = DocumentRecord::new(id, source, title, document_type);
        doc.origin_id = origin_id;
        doc.summary = SUMMARY_KEYS.iter().find_map(|key| metrics.text(key));
        doc.agency = row.text("agency");
        doc.posted_at = timestamp(row, "ts");
        doc.effective_date = timestamp(&metrics, "effective_date");
        doc.comment_end_date =
            timestamp(row, "comment_end_date").or_else(|| timestamp(&metrics, "comment_end_date"));
        doc.url = url;
        doc.docket_id = docket_id;
        doc.rin = row.text("rin").or_else(|| metrics.text("rin"));
        doc.issue_codes = issue_codes;
        doc.comments_24h = comments_24h;
        doc.surge = self.is_surging(comments_24h);
        doc.priority_score = priority_score;
        doc.features = features;
        Ok(doc)
    }

    fn normalize_filing(&self, row: &RawRow) -> Result<DocumentRecord, NormalizationError> {
        let client = row.text("client_name");
        let registrant = row.text("registrant_name");
        let quarter = row.text("quarter");
        let year = row.text("year");
        let title = filing_title(client.as_deref(), quarter.as_deref(), year.as_deref());

        let origin_id = row.text("filing_uid").or_else(|| row.text("id"));
        let url = row.text("url");
        let id = stable_id(Source::Lda, [origin_id.as_deref()], &title, url.as_deref());

        let issue_codes = canonical_issue_codes(row.strings("issue_codes"));
        let money_amount = row.text("amount").and_then(|raw| match Decimal::from_str(&raw) {
            Ok(amount) => Some(amount),
            Err(err) => {
                tracing::debug!(row = %row.identifier(), amount = %raw, error = %err, "ignoring unparseable filing amount");
                None
            }
        });

        let mut features = Map::new();
        for (key, value) in [
            ("client", client.clone()),
            ("registrant", registrant),
            ("quarter", quarter),
            ("filing_type", row.text("filing_type")),
        ] {
            if let Some(value) = value {
                features.insert(key.into(), Value::String(value));
            }
        }
        if let Some(year) = row.get("year") {
            features.insert("year".into(), year.clone());
        }

        let priority_score = self.scorer.score(FILING_TYPE_KEY, &title, &issue_codes);

        let mut doc = DocumentRecord::new(id, Source::Lda, title, DocumentType::Docket);
        doc.origin_id = origin_id;
        doc.summary = row.text("summary");
        doc.agency = client;
        doc.posted_at = timestamp(row, "filing_date");
        doc.url = url;
        doc.issue_codes = issue_codes;
        doc.money_amount = money_amount;
        doc.priority_score = priority_score;
        doc.features = features;
        Ok(doc)
    }

    /// Explicit type if it is a known weight key, then the upstream
    /// `document_type`, then a per-source default.
    pub fn resolve_signal_type(&self, source: Source, row: &RawRow, metrics: &RawRow) -> String {
        let tables = self.scorer.tables();
        if let Some(explicit) = row.text("signal_type").map(|raw| normalize_type_key(&raw)) {
            if tables.is_known_type(&explicit) {
                return explicit;
            }
        }
        if let Some(upstream) = metrics.text("document_type").map(|raw| normalize_type_key(&raw)) {
            if tables.is_known_type(&upstream) {
                return upstream;
            }
        }

        let fallback = match source {
            Source::FederalRegister => "notice",
            Source::RegulationsGov => "docket",
            Source::Congress if has_committee(row, metrics) => "hearing",
            Source::Congress => "bill",
            Source::Lda => "notice",
        };
        fallback.to_string()
    }

    pub fn resolve_document_type(
        &self,
        source: Source,
        signal_type: &str,
        row: &RawRow,
        metrics: &RawRow,
    ) -> DocumentType {
        if let Some(kind) = self.tables.document_type(signal_type) {
            return kind;
        }
        if let Some(kind) = metrics
            .text("document_type")
            .and_then(|raw| self.tables.document_type(&raw.to_lowercase()))
        {
            return kind;
        }

        match source {
            Source::FederalRegister => DocumentType::Notice,
            Source::RegulationsGov => DocumentType::Docket,
            Source::Congress if row.contains("bill_id") || signal_type.contains("bill") => {
                DocumentType::Bill
            }
            _ => DocumentType::Notice,
        }
    }

    fn is_surging(&self, comments_24h: Option<i64>) -> bool {
        comments_24h.is_some_and(|count| count > self.tables.surge_threshold())
    }
}

/// `LDA Filing: {client}` with `({quarter} {year})` or `({year})` appended.
pub fn filing_title(client: Option<&str>, quarter: Option<&str>, year: Option<&str>) -> String {
    let base = format!("LDA Filing: {}", client.unwrap_or("Unknown client"));
    match (quarter, year) {
        (Some(quarter), Some(year)) => format!("{base} ({quarter} {year})"),
        (None, Some(year)) => format!("{base} ({year})"),
        _ => base,
    }
}

fn has_committee(row: &RawRow, metrics: &RawRow) -> bool {
    row.contains("committee") || metrics.contains("committee") || metrics.contains("committee_name")
}

fn comment_count(row: &RawRow) -> Result<Option<i64>, NormalizationError> {
    match row.integer("comments_24h") {
        Some(count) if count < 0 => Err(NormalizationError::InvalidField {
            row: row.identifier(),
            field: "comments_24h",
            reason: format!("negative count {count}"),
        }),
        count => Ok(count),
    }
}

fn timestamp(row: &RawRow, key: &str) -> Option<DateTime<Utc>> {
    row.text(key).as_deref().and_then(parse_timestamp)
}

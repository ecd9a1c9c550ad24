//! Archived (rkyv) row layouts written to the WAL.
//!
//! Timestamps are stored as UTC seconds plus nanoseconds, money as its decimal
//! string, and the open-ended columns (`issue_codes`, `features`) as JSON text.

use chrono::{DateTime, Utc};
use govsearch_core::model::{DocumentRecord, EdgeRecord, ModelError};
use rkyv::{Archive, Deserialize, Serialize};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RowError {
    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Timestamp out of range: {secs}s {nanos}ns")]
    Timestamp { secs: i64, nanos: u32 },
    #[error("Invalid decimal amount: {0}")]
    Amount(String),
}

/// A UTC instant without loss of precision.
#[derive(Archive, Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[archive(check_bytes)]
pub struct TimestampRow {
    pub secs: i64,
    pub nanos: u32,
}

impl From<DateTime<Utc>> for TimestampRow {
    fn from(ts: DateTime<Utc>) -> Self {
        Self {
            secs: ts.timestamp(),
            nanos: ts.timestamp_subsec_nanos(),
        }
    }
}

impl TryFrom<TimestampRow> for DateTime<Utc> {
    type Error = RowError;

    fn try_from(row: TimestampRow) -> Result<Self, Self::Error> {
        DateTime::<Utc>::from_timestamp(row.secs, row.nanos).ok_or(RowError::Timestamp {
            secs: row.secs,
            nanos: row.nanos,
        })
    }
}

#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct DocumentRow {
    pub id: String,
    pub source: String,
    pub origin_id: Option<String>,
    pub title: String,
    pub summary: Option<String>,
    pub agency: Option<String>,
    pub document_type: String,
    pub posted_at: Option<TimestampRow>,
    pub effective_date: Option<TimestampRow>,
    pub comment_end_date: Option<TimestampRow>,
    pub url: Option<String>,
    pub docket_id: Option<String>,
    pub rin: Option<String>,
    pub issue_codes_json: String,
    pub money_amount: Option<String>,
    pub comments_24h: Option<i64>,
    pub surge: bool,
    pub priority_score: f64,
    pub features_json: String,
}

#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[archive(check_bytes)]
pub struct EdgeRow {
    pub src_id: String,
    pub dst_id: String,
    pub relation: String,
}

impl TryFrom<&DocumentRecord> for DocumentRow {
    type Error = RowError;

    fn try_from(doc: &DocumentRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: doc.id.clone(),
            source: doc.source.as_str().to_string(),
            origin_id: doc.origin_id.clone(),
            title: doc.title.clone(),
            summary: doc.summary.clone(),
            agency: doc.agency.clone(),
            document_type: doc.document_type.as_str().to_string(),
            posted_at: doc.posted_at.map(TimestampRow::from),
            effective_date: doc.effective_date.map(TimestampRow::from),
            comment_end_date: doc.comment_end_date.map(TimestampRow::from),
            url: doc.url.clone(),
            docket_id: doc.docket_id.clone(),
            rin: doc.rin.clone(),
            issue_codes_json: serde_json::to_string(&doc.issue_codes)?,
            money_amount: doc.money_amount.map(|amount| amount.to_string()),
            comments_24h: doc.comments_24h,
            surge: doc.surge,
            priority_score: doc.priority_score,
            features_json: serde_json::to_string(&doc.features)?,
        })
    }
}

impl TryFrom<DocumentRow> for DocumentRecord {
    type Error = RowError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let issue_codes: BTreeSet<String> = serde_json::from_str(&row.issue_codes_json)?;
        let money_amount = row
            .money_amount
            .map(|raw| Decimal::from_str(&raw).map_err(|_| RowError::Amount(raw)))
            .transpose()?;

        Ok(Self {
            id: row.id,
            source: row.source.parse()?,
            origin_id: row.origin_id,
            title: row.title,
            summary: row.summary,
            agency: row.agency,
            document_type: row.document_type.parse()?,
            posted_at: to_utc(row.posted_at)?,
            effective_date: to_utc(row.effective_date)?,
            comment_end_date: to_utc(row.comment_end_date)?,
            url: row.url,
            docket_id: row.docket_id,
            rin: row.rin,
            issue_codes,
            money_amount,
            comments_24h: row.comments_24h,
            surge: row.surge,
            priority_score: row.priority_score,
            features: serde_json::from_str(&row.features_json)?,
        })
    }
}

impl From<&EdgeRecord> for EdgeRow {
    fn from(edge: &EdgeRecord) -> Self {
        Self {
            src_id: edge.src_id.clone(),
            dst_id: edge.dst_id.clone(),
            relation: edge.relation.as_str().to_string(),
        }
    }
}

impl TryFrom<EdgeRow> for EdgeRecord {
    type Error = RowError;

    fn try_from(row: EdgeRow) -> Result<Self, Self::Error> {
        Ok(EdgeRecord::new(row.src_id, row.dst_id, row.relation.parse()?))
    }
}

fn to_utc(value: Option<TimestampRow>) -> Result<Option<DateTime<Utc>>, RowError> {
    value.map(DateTime::<Utc>::try_from).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use govsearch_core::model::{DocumentType, Relation, Source};
    use serde_json::json;

    #[test]
    fn test_document_row_preserves_every_column() {
        let mut doc = DocumentRecord::new(
            "lda:abc",
            Source::Lda,
            "LDA Filing: Acme (Q1 2024)",
            DocumentType::Docket,
        )
        .with_issue_codes(["HCR", "TEC"]);
        doc.origin_id = Some("abc".into());
        doc.posted_at = Some(Utc.with_ymd_and_hms(2024, 4, 20, 15, 30, 0).unwrap());
        doc.money_amount = Some(Decimal::from_str("125000.50").unwrap());
        doc.priority_score = 3.0;
        doc.features.insert("client".into(), json!("Acme"));
        doc.features.insert("year".into(), json!(2024));

        let row = DocumentRow::try_from(&doc).unwrap();
        assert_eq!(row.money_amount.as_deref(), Some("125000.50"));
        assert_eq!(row.issue_codes_json, r#"["HCR","TEC"]"#);

        let back = DocumentRecord::try_from(row).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_timestamps_keep_nanoseconds() {
        let mut doc =
            DocumentRecord::new("fr:1", Source::FederalRegister, "t", DocumentType::Rule);
        let posted = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        doc.posted_at = Some(posted);
        doc.comment_end_date = Some(Utc.with_ymd_and_hms(1600, 1, 1, 0, 0, 0).unwrap());

        let row = DocumentRow::try_from(&doc).unwrap();
        assert_eq!(row.posted_at.unwrap().nanos, 123_456_789);

        let back = DocumentRecord::try_from(row).unwrap();
        assert_eq!(back.posted_at, Some(posted));
        assert_eq!(back.comment_end_date, doc.comment_end_date);
    }

    #[test]
    fn test_out_of_range_timestamp_is_rejected() {
        let row = TimestampRow {
            secs: i64::MAX,
            nanos: 0,
        };
        assert!(matches!(
            DateTime::<Utc>::try_from(row),
            Err(RowError::Timestamp { .. })
        ));
    }

    #[test]
    fn test_unknown_relation_is_rejected() {
        let row = EdgeRow {
            src_id: "a".into(),
            dst_id: "b".into(),
            relation: "cites".into(),
        };
        assert!(matches!(
            EdgeRecord::try_from(row),
            Err(RowError::Model(ModelError::UnknownRelation(_)))
        ));

        let edge = EdgeRecord::new("a", "b", Relation::LdaOverlap);
        assert_eq!(EdgeRow::from(&edge).relation, "lda_overlap");
    }
}

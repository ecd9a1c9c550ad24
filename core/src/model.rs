use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Congress,
    FederalRegister,
    RegulationsGov,
    Lda,
}

impl Source {
    pub const ALL: [Source; 4] = [
        Source::Congress,
        Source::FederalRegister,
        Source::RegulationsGov,
        Source::Lda,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Congress => "congress",
            Source::FederalRegister => "federal_register",
            Source::RegulationsGov => "regulations_gov",
            Source::Lda => "lda",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::ALL
            .into_iter()
            .find(|source| source.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| ModelError::UnknownSource(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    Rule,
    #[serde(rename = "Proposed Rule")]
    ProposedRule,
    Notice,
    Hearing,
    Bill,
    Docket,
}

impl DocumentType {
    pub const ALL: [DocumentType; 6] = [
        DocumentType::Rule,
        DocumentType::ProposedRule,
        DocumentType::Notice,
        DocumentType::Hearing,
        DocumentType::Bill,
        DocumentType::Docket,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Rule => "Rule",
            DocumentType::ProposedRule => "Proposed Rule",
            DocumentType::Notice => "Notice",
            DocumentType::Hearing => "Hearing",
            DocumentType::Bill => "Bill",
            DocumentType::Docket => "Docket",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentType::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ModelError::UnknownDocumentType(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    DocketMatch,
    LdaOverlap,
    LegislativeActivity,
}

impl Relation {
    pub const ALL: [Relation; 3] = [
        Relation::DocketMatch,
        Relation::LdaOverlap,
        Relation::LegislativeActivity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::DocketMatch => "docket_match",
            Relation::LdaOverlap => "lda_overlap",
            Relation::LegislativeActivity => "legislative_activity",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relation {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Relation::ALL
            .into_iter()
            .find(|relation| relation.as_str() == s.trim())
            .ok_or_else(|| ModelError::UnknownRelation(s.to_string()))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("unknown source: {0}")]
    UnknownSource(String),
    #[error("unknown document type: {0}")]
    UnknownDocumentType(String),
    #[error("unknown relation: {0}")]
    UnknownRelation(String),
    #[error("document id must not be empty")]
    EmptyId,
    #[error("document {0} has an empty title")]
    EmptyTitle(String),
    #[error("document {id} has a non-canonical issue code {code:?}")]
    NonCanonicalIssueCode { id: String, code: String },
    #[error("document {0} has a negative or non-finite priority score")]
    InvalidPriority(String),
}

/// Canonical unit indexed and searched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub source: Source,
    pub origin_id: Option<String>,
    pub title: String,
    pub summary: Option<String>,
    pub agency: Option<String>,
    pub document_type: DocumentType,
    pub posted_at: Option<DateTime<Utc>>,
    pub effective_date: Option<DateTime<Utc>>,
    pub comment_end_date: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub docket_id: Option<String>,
    pub rin: Option<String>,
    pub issue_codes: BTreeSet<String>,
    pub money_amount: Option<Decimal>,
    pub comments_24h: Option<i64>,
    pub surge: bool,
    pub priority_score: f64,
    #[serde(default)]
    pub features: Map<String, Value>,
}

impl DocumentRecord {
    pub fn new(
        id: impl Into<String>,
        source: Source,
        title: impl Into<String>,
        document_type: DocumentType,
    ) -> Self {
        Self {
            id: id.into(),
            source,
            origin_id: None,
            title: title.into(),
            summary: None,
            agency: None,
            document_type,
            posted_at: None,
            effective_date: None,
            comment_end_date: None,
            url: None,
            docket_id: None,
            rin: None,
            issue_codes: BTreeSet::new(),
            money_amount: None,
            comments_24h: None,
            surge: false,
            priority_score: 0.0,
            features: Map::new(),
        }
    }

    pub fn with_issue_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.issue_codes = canonical_issue_codes(codes);
        self
    }

    pub fn feature_str(&self, key: &str) -> Option<&str> {
        self.features.get(key).and_then(Value::as_str)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.id.trim().is_empty() {
            return Err(ModelError::EmptyId);
        }
        if self.title.trim().is_empty() {
            return Err(ModelError::EmptyTitle(self.id.clone()));
        }
        if let Some(code) = self
            .issue_codes
            .iter()
            .find(|code| code.is_empty() || code.as_str() != code.trim().to_uppercase())
        {
            return Err(ModelError::NonCanonicalIssueCode {
                id: self.id.clone(),
                code: code.clone(),
            });
        }
        if !self.priority_score.is_finite() || self.priority_score < 0.0 {
            return Err(ModelError::InvalidPriority(self.id.clone()));
        }
        Ok(())
    }
}

/// Trim, uppercase and deduplicate topic codes, dropping blanks.
pub fn canonical_issue_codes<I, S>(codes: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    codes
        .into_iter()
        .map(|code| code.as_ref().trim().to_uppercase())
        .filter(|code| !code.is_empty())
        .collect()
}

/// A directed relationship between two documents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub src_id: String,
    pub dst_id: String,
    pub relation: Relation,
}

impl EdgeRecord {
    pub fn new(src_id: impl Into<String>, dst_id: impl Into<String>, relation: Relation) -> Self {
        Self {
            src_id: src_id.into(),
            dst_id: dst_id.into(),
            relation,
        }
    }

    pub fn reversed(&self) -> Self {
        Self {
            src_id: self.dst_id.clone(),
            dst_id: self.src_id.clone(),
            relation: self.relation,
        }
    }

    pub fn touches(&self, id: &str) -> bool {
        self.src_id == id || self.dst_id == id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(
            serde_json::to_string(&Source::FederalRegister).unwrap(),
            "\"federal_register\""
        );
        assert_eq!(
            serde_json::to_string(&DocumentType::ProposedRule).unwrap(),
            "\"Proposed Rule\""
        );
        assert_eq!(
            serde_json::to_string(&Relation::LegislativeActivity).unwrap(),
            "\"legislative_activity\""
        );
        assert_eq!("Regulations_Gov".parse::<Source>().unwrap(), Source::RegulationsGov);
        assert_eq!(
            "proposed rule".parse::<DocumentType>().unwrap(),
            DocumentType::ProposedRule
        );
        assert!("press_release".parse::<Relation>().is_err());
    }

    #[test]
    fn test_issue_codes_are_canonical() {
        let doc = DocumentRecord::new("lda:1", Source::Lda, "Filing", DocumentType::Docket)
            .with_issue_codes(["hcr", " TEC ", "HCR", ""]);
        let codes: Vec<&str> = doc.issue_codes.iter().map(String::as_str).collect();
        assert_eq!(codes, vec!["HCR", "TEC"]);
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_broken_records() {
        let doc = DocumentRecord::new(" ", Source::Congress, "Title", DocumentType::Bill);
        assert_eq!(doc.validate(), Err(ModelError::EmptyId));

        let doc = DocumentRecord::new("congress:1", Source::Congress, "", DocumentType::Bill);
        assert!(matches!(doc.validate(), Err(ModelError::EmptyTitle(_))));

        let mut doc = DocumentRecord::new("congress:1", Source::Congress, "T", DocumentType::Bill);
        doc.issue_codes.insert("tec".into());
        assert!(matches!(
            doc.validate(),
            Err(ModelError::NonCanonicalIssueCode { .. })
        ));

        let mut doc = DocumentRecord::new("congress:1", Source::Congress, "T", DocumentType::Bill);
        doc.priority_score = f64::NAN;
        assert!(matches!(doc.validate(), Err(ModelError::InvalidPriority(_))));
    }

    #[test]
    fn test_edge_reversal() {
        let edge = EdgeRecord::new("a", "b", Relation::DocketMatch);
        let back = edge.reversed();
        assert_eq!(back.src_id, "b");
        assert_eq!(back.dst_id, "a");
        assert_eq!(back.reversed(), edge);
        assert!(edge.touches("b"));
        assert!(!edge.touches("c"));
    }
}

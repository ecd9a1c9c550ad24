use chrono::NaiveDate;
use govsearch_core::model::{DocumentType, Source};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 1_000;
/// A comment deadline this many days out or fewer counts as closing soon.
pub const CLOSING_SOON_DAYS: i64 = 14;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DateRange {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct DocumentFilters {
    #[serde(default)]
    pub source: Vec<String>,
    #[serde(default)]
    pub document_type: Vec<String>,
    /// Case-insensitive substring of the agency name.
    #[serde(default)]
    pub agency: Option<String>,
    #[serde(default)]
    pub posted: Option<DateRange>,
    #[serde(default)]
    pub min_priority: Option<f64>,
    #[serde(default)]
    pub closing_soon: bool,
    #[serde(default)]
    pub surge_only: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DocumentQuery {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub filters: DocumentFilters,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for DocumentQuery {
    fn default() -> Self {
        Self {
            query: None,
            filters: DocumentFilters::default(),
            limit: DEFAULT_LIMIT,
        }
    }
}

const fn default_limit() -> usize {
    DEFAULT_LIMIT
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryValidationError {
    #[error("limit must be between 1 and {0}")]
    InvalidLimit(usize),
    #[error("unknown source filter: {0}")]
    UnknownSource(String),
    #[error("unknown document_type filter: {0}")]
    UnknownDocumentType(String),
    #[error("filters.agency must not be empty when provided")]
    EmptyAgency,
    #[error("filters.posted.from/to must be YYYY-MM-DD")]
    InvalidDateFormat,
    #[error("filters.posted.from must be <= filters.posted.to")]
    InvalidDateOrder,
    #[error("filters.min_priority must be a non-negative number")]
    InvalidMinPriority,
}

/// Filters after validation, in typed form.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedFilters {
    pub sources: BTreeSet<Source>,
    pub document_types: BTreeSet<DocumentType>,
    pub agency: Option<String>,
    pub posted_from: Option<NaiveDate>,
    pub posted_to: Option<NaiveDate>,
    pub min_priority: Option<f64>,
    pub closing_soon: bool,
    pub surge_only: bool,
}

impl DocumentQuery {
    pub fn parse_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), QueryValidationError> {
        self.resolve().map(|_| ())
    }

    /// Trimmed free text, if any.
    pub fn text(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    pub fn resolve(&self) -> Result<ResolvedFilters, QueryValidationError> {
        if self.limit == 0 || self.limit > MAX_LIMIT {
            return Err(QueryValidationError::InvalidLimit(MAX_LIMIT));
        }

        let filters = &self.filters;
        let sources = filters
            .source
            .iter()
            .map(|raw| {
                raw.parse::<Source>()
                    .map_err(|_| QueryValidationError::UnknownSource(raw.clone()))
            })
            .collect::<Result<BTreeSet<_>, _>>()?;
        let document_types = filters
            .document_type
            .iter()
            .map(|raw| {
                raw.parse::<DocumentType>()
                    .map_err(|_| QueryValidationError::UnknownDocumentType(raw.clone()))
            })
            .collect::<Result<BTreeSet<_>, _>>()?;

        let agency = match &filters.agency {
            Some(agency) if agency.trim().is_empty() => {
                return Err(QueryValidationError::EmptyAgency)
            }
            Some(agency) => Some(agency.trim().to_lowercase()),
            None => None,
        };

        let (posted_from, posted_to) = match &filters.posted {
            Some(range) => {
                let from = range.from.as_deref().map(parse_date).transpose()?;
                let to = range.to.as_deref().map(parse_date).transpose()?;
                if let (Some(from), Some(to)) = (from, to) {
                    if from > to {
                        return Err(QueryValidationError::InvalidDateOrder);
                    }
                }
                (from, to)
            }
            None => (None, None),
        };

        if let Some(min) = filters.min_priority {
            if !min.is_finite() || min < 0.0 {
                return Err(QueryValidationError::InvalidMinPriority);
            }
        }

        Ok(ResolvedFilters {
            sources,
            document_types,
            agency,
            posted_from,
            posted_to,
            min_priority: filters.min_priority,
            closing_soon: filters.closing_soon,
            surge_only: filters.surge_only,
        })
    }
}

fn parse_date(input: &str) -> Result<NaiveDate, QueryValidationError> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| QueryValidationError::InvalidDateFormat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_to_empty_object() {
        let query = DocumentQuery::parse_json("{}").unwrap();
        assert_eq!(query.limit, 50);
        assert!(query.text().is_none());
        assert!(query.validate().is_ok());
    }

    #[test]
    fn test_filters_resolve_to_typed_values() {
        let query = DocumentQuery::parse_json(
            r#"{
                "query": "  clean air  ",
                "filters": {
                    "source": ["federal_register", "REGULATIONS_GOV"],
                    "document_type": ["proposed rule"],
                    "agency": " EPA ",
                    "posted": {"from": "2024-01-01", "to": "2024-03-31"},
                    "min_priority": 3.5,
                    "closing_soon": true
                },
                "limit": 10
            }"#,
        )
        .unwrap();

        let resolved = query.resolve().unwrap();
        assert_eq!(query.text(), Some("clean air"));
        assert!(resolved.sources.contains(&Source::RegulationsGov));
        assert!(resolved.document_types.contains(&DocumentType::ProposedRule));
        assert_eq!(resolved.agency.as_deref(), Some("epa"));
        assert_eq!(
            resolved.posted_to,
            NaiveDate::from_ymd_opt(2024, 3, 31)
        );
        assert!(resolved.closing_soon);
        assert!(!resolved.surge_only);
    }

    #[test]
    fn test_invalid_filters_are_rejected() {
        let mut query = DocumentQuery {
            limit: 1_001,
            ..DocumentQuery::default()
        };
        assert_eq!(
            query.validate(),
            Err(QueryValidationError::InvalidLimit(MAX_LIMIT))
        );

        query.limit = 10;
        query.filters.source = vec!["press_release".into()];
        assert_eq!(
            query.validate(),
            Err(QueryValidationError::UnknownSource("press_release".into()))
        );

        query.filters.source.clear();
        query.filters.posted = Some(DateRange {
            from: Some("2024-05-01".into()),
            to: Some("2024-01-01".into()),
        });
        assert_eq!(query.validate(), Err(QueryValidationError::InvalidDateOrder));

        query.filters.posted = Some(DateRange {
            from: Some("05/01/2024".into()),
            to: None,
        });
        assert_eq!(query.validate(), Err(QueryValidationError::InvalidDateFormat));

        query.filters.posted = None;
        query.filters.min_priority = Some(-1.0);
        assert_eq!(
            query.validate(),
            Err(QueryValidationError::InvalidMinPriority)
        );
    }
}

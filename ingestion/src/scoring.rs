use govsearch_core::config::ScoringConfig;
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_BASE_WEIGHT: f64 = 1.0;
pub const ISSUE_CODE_BOOST: f64 = 0.5;
pub const IMPACT_KEYWORD_BOOST: f64 = 1.0;

const BUILTIN_WEIGHTS: [(&str, f64); 10] = [
    ("final_rule", 5.0),
    ("rule", 5.0),
    ("proposed_rule", 3.5),
    ("hearing", 3.0),
    ("meeting", 3.0),
    ("markup", 3.0),
    ("docket", 2.0),
    ("comment", 2.0),
    ("bill", 1.5),
    ("notice", 1.0),
];

const BUILTIN_IMPACT_KEYWORDS: [&str; 7] = [
    "final rule",
    "emergency",
    "immediate",
    "urgent",
    "national security",
    "public health",
    "safety",
];

/// Base weights by signal-type key and the title keywords that raise urgency.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringTables {
    base_weights: BTreeMap<String, f64>,
    impact_keywords: Vec<String>,
}

impl ScoringTables {
    pub fn builtin() -> Self {
        Self {
            base_weights: BUILTIN_WEIGHTS
                .iter()
                .map(|(key, weight)| (key.to_string(), *weight))
                .collect(),
            impact_keywords: BUILTIN_IMPACT_KEYWORDS
                .iter()
                .map(|keyword| keyword.to_string())
                .collect(),
        }
    }

    /// Built-ins with deployment overrides: weights are merged by key, a
    /// non-empty keyword list replaces the built-in one.
    pub fn from_config(config: &ScoringConfig) -> Self {
        let mut tables = Self::builtin();
        for (key, weight) in &config.base_weights {
            tables
                .base_weights
                .insert(normalize_type_key(key), *weight);
        }
        if !config.impact_keywords.is_empty() {
            tables.impact_keywords = config
                .impact_keywords
                .iter()
                .map(|keyword| keyword.trim().to_lowercase())
                .collect();
        }
        tables
    }

    pub fn base_weight(&self, type_key: &str) -> f64 {
        self.base_weights
            .get(&normalize_type_key(type_key))
            .copied()
            .unwrap_or(DEFAULT_BASE_WEIGHT)
    }

    pub fn is_known_type(&self, type_key: &str) -> bool {
        self.base_weights.contains_key(type_key)
    }

    pub fn impact_keywords(&self) -> &[String] {
        &self.impact_keywords
    }
}

impl Default for ScoringTables {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Lowercase with spaces folded to underscores, the form weight keys use.
pub fn normalize_type_key(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

#[derive(Debug, Clone, Default)]
pub struct PriorityScorer {
    tables: ScoringTables,
}

impl PriorityScorer {
    pub fn new(tables: ScoringTables) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &ScoringTables {
        &self.tables
    }

    /// `base_weight + 0.5 * |issue_codes| + 1.0 per impact keyword in the title`,
    /// rounded to two decimals.
    pub fn score(&self, type_key: &str, title: &str, issue_codes: &BTreeSet<String>) -> f64 {
        let base = self.tables.base_weight(type_key);
        let issue_boost = issue_codes.len() as f64 * ISSUE_CODE_BOOST;
        let title_lower = title.to_lowercase();
        let impact_boost = self
            .tables
            .impact_keywords()
            .iter()
            .filter(|keyword| title_lower.contains(keyword.as_str()))
            .count() as f64
            * IMPACT_KEYWORD_BOOST;

        round2(base + issue_boost + impact_boost)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

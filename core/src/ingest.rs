use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const IDENTIFIER_KEYS: [&str; 5] = ["source_id", "filing_uid", "document_number", "id", "title"];

/// Loosely-typed payload emitted by a source adapter. Only the normalizer reads it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRow(Map<String, Value>);

impl RawRow {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Builder-style insert; `Value::Null` values are skipped.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if !value.is_null() {
            self.0.insert(key.to_string(), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|value| !value.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Trimmed, non-empty text. Numbers and booleans are rendered as text.
    pub fn text(&self, key: &str) -> Option<String> {
        value_text(self.get(key)?)
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        let parsed = match self.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed.filter(|f| f.is_finite())
    }

    /// Nested object. A string holding a JSON object is parsed.
    pub fn object(&self, key: &str) -> Option<RawRow> {
        match self.get(key)? {
            Value::Object(map) => Some(RawRow(map.clone())),
            Value::String(s) => serde_json::from_str::<Value>(s)
                .ok()
                .and_then(RawRow::from_value),
            _ => None,
        }
    }

    /// List of strings. Accepts a JSON array, a string holding a JSON array,
    /// or a comma/semicolon-separated string.
    pub fn strings(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Array(items)) => items.iter().filter_map(value_text).collect(),
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                if trimmed.starts_with('[') {
                    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) {
                        return items.iter().filter_map(value_text).collect();
                    }
                }
                trimmed
                    .split([',', ';'])
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            Some(other) => value_text(other).into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Best-effort identifier for log lines about this row.
    pub fn identifier(&self) -> String {
        IDENTIFIER_KEYS
            .iter()
            .find_map(|key| self.text(key))
            .unwrap_or_else(|| "<unidentified>".to_string())
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for RawRow {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_accessor_trims_and_renders_numbers() {
        let row = RawRow::new()
            .with("title", "  Clean Air  ")
            .with("year", 2024)
            .with("blank", "   ")
            .with("missing", Value::Null);

        assert_eq!(row.text("title").as_deref(), Some("Clean Air"));
        assert_eq!(row.text("year").as_deref(), Some("2024"));
        assert_eq!(row.text("blank"), None);
        assert!(!row.contains("missing"));
    }

    #[test]
    fn test_object_accepts_embedded_json_string() {
        let row = RawRow::new()
            .with("metric_json", r#"{"document_number": "2024-00123"}"#)
            .with("nested", json!({"uid": "abc"}))
            .with("broken", "{not json");

        assert_eq!(
            row.object("metric_json").unwrap().text("document_number").as_deref(),
            Some("2024-00123")
        );
        assert_eq!(row.object("nested").unwrap().text("uid").as_deref(), Some("abc"));
        assert!(row.object("broken").is_none());
    }

    #[test]
    fn test_strings_accepts_several_encodings() {
        let row = RawRow::new()
            .with("array", json!(["tec", " hcr ", null]))
            .with("json_text", r#"["ENV","TRD"]"#)
            .with("csv", "AGR; DEF,  ");

        assert_eq!(row.strings("array"), vec!["tec", "hcr"]);
        assert_eq!(row.strings("json_text"), vec!["ENV", "TRD"]);
        assert_eq!(row.strings("csv"), vec!["AGR", "DEF"]);
        assert!(row.strings("absent").is_empty());
    }

    #[test]
    fn test_numeric_accessors() {
        let row = RawRow::new()
            .with("count", "42")
            .with("score", 3.5)
            .with("whole", 7.0);

        assert_eq!(row.integer("count"), Some(42));
        assert_eq!(row.integer("whole"), Some(7));
        assert_eq!(row.float("score"), Some(3.5));
    }

    #[test]
    fn test_identifier_falls_back_through_keys() {
        let row = RawRow::new().with("filing_uid", "abc-123").with("title", "x");
        assert_eq!(row.identifier(), "abc-123");
        assert_eq!(RawRow::new().identifier(), "<unidentified>");
    }
}

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

const KEYWORD_ISSUES: [(&str, &[&str]); 48] = [
    ("privacy", &["TEC"]),
    ("data", &["TEC"]),
    ("cybersecurity", &["TEC", "DEF"]),
    ("artificial intelligence", &["TEC"]),
    ("ai", &["TEC"]),
    ("climate", &["ENV"]),
    ("carbon", &["ENV"]),
    ("emissions", &["ENV"]),
    ("renewable", &["ENE"]),
    ("energy", &["ENE"]),
    ("oil", &["ENE"]),
    ("gas", &["ENE"]),
    ("nuclear", &["ENE"]),
    ("healthcare", &["HCR"]),
    ("medicare", &["HCR"]),
    ("medicaid", &["HCR"]),
    ("drug", &["HCR"]),
    ("pharmaceutical", &["HCR"]),
    ("education", &["EDU"]),
    ("student", &["EDU"]),
    ("school", &["EDU"]),
    ("university", &["EDU"]),
    ("trade", &["TRD"]),
    ("tariff", &["TRD"]),
    ("import", &["TRD"]),
    ("export", &["TRD"]),
    ("immigration", &["CIV"]),
    ("border", &["CIV"]),
    ("voting", &["CIV"]),
    ("election", &["CIV"]),
    ("tax", &["TAX"]),
    ("budget", &["FIN"]),
    ("debt", &["FIN"]),
    ("banking", &["FIN"]),
    ("infrastructure", &["TRA"]),
    ("transportation", &["TRA"]),
    ("aviation", &["TRA"]),
    ("automotive", &["TRA"]),
    ("defense", &["DEF"]),
    ("military", &["DEF"]),
    ("veterans", &["HCR"]),
    ("agriculture", &["AGR"]),
    ("farming", &["AGR"]),
    ("food", &["AGR", "HCR"]),
    ("safety", &["CIV"]),
    ("regulation", &["GOV"]),
    ("oversight", &["GOV"]),
    ("accountability", &["GOV"]),
];

static KEYWORD_PATTERNS: LazyLock<Vec<(Regex, &'static [&'static str])>> = LazyLock::new(|| {
    KEYWORD_ISSUES
        .iter()
        .map(|(keyword, codes)| {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(keyword));
            (Regex::new(&pattern).unwrap(), *codes)
        })
        .collect()
});

/// Issue codes implied by whole-word keyword matches in `text`.
pub fn issue_codes_for(text: &str) -> BTreeSet<String> {
    KEYWORD_PATTERNS
        .iter()
        .filter(|(pattern, _)| pattern.is_match(text))
        .flat_map(|(_, codes)| codes.iter().map(|code| code.to_string()))
        .collect()
}

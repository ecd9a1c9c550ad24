use govsearch_core::model::{DocumentRecord, DocumentType, EdgeRecord, Relation, Source};
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;

static BILL_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b((?:H|S)\.?\s?(?:R|Res|J\.Res|Con\.Res))\.?\s*(\d{1,5})\b").unwrap()
});

static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z0-9]{3,}").unwrap());

/// First bill identifier in `text`, canonicalized (`"H.R. 1234"` -> `"HR1234"`).
pub fn canonical_bill_id(text: &str) -> Option<String> {
    BILL_ID_PATTERN.captures(text).map(|caps| canonicalize(&caps))
}

/// Every canonical bill identifier mentioned in `text`.
pub fn bill_ids_in(text: &str) -> BTreeSet<String> {
    BILL_ID_PATTERN
        .captures_iter(text)
        .map(|caps| canonicalize(&caps))
        .collect()
}

fn canonicalize(caps: &regex::Captures<'_>) -> String {
    let prefix: String = caps[1]
        .chars()
        .filter(char::is_ascii_alphabetic)
        .collect();
    format!("{}{}", prefix.to_ascii_uppercase(), &caps[2])
}

/// Lowercased alphanumeric tokens of length three or more.
pub fn tokenize<'a, I>(parts: I) -> HashSet<String>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    parts
        .into_iter()
        .flatten()
        .flat_map(|part| TOKEN_PATTERN.find_iter(part))
        .map(|token| token.as_str().to_lowercase())
        .collect()
}

/// Computes edges over one fully normalized batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossReferenceBuilder;

impl CrossReferenceBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, documents: &[DocumentRecord]) -> BTreeSet<EdgeRecord> {
        let mut edges = BTreeSet::new();
        link_dockets(documents, &mut edges);
        link_filings(documents, &mut edges);
        link_hearings(documents, &mut edges);

        let batch_ids: HashSet<&str> = documents.iter().map(|doc| doc.id.as_str()).collect();
        edges.retain(|edge| {
            batch_ids.contains(edge.src_id.as_str()) && batch_ids.contains(edge.dst_id.as_str())
        });
        edges
    }
}

fn link_pair(edges: &mut BTreeSet<EdgeRecord>, a: &str, b: &str, relation: Relation) {
    if a == b {
        return;
    }
    edges.insert(EdgeRecord::new(a, b, relation));
    edges.insert(EdgeRecord::new(b, a, relation));
}

/// Federal Register and Regulations.gov documents sharing a docket.
fn link_dockets(documents: &[DocumentRecord], edges: &mut BTreeSet<EdgeRecord>) {
    let mut groups: HashMap<String, Vec<&DocumentRecord>> = HashMap::new();
    for doc in documents {
        if let Some(docket) = doc.docket_id.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            groups.entry(docket.to_lowercase()).or_default().push(doc);
        }
    }

    for group in groups.values() {
        let notices = group.iter().filter(|d| d.source == Source::FederalRegister);
        for notice in notices {
            for docket in group.iter().filter(|d| d.source == Source::RegulationsGov) {
                link_pair(edges, &notice.id, &docket.id, Relation::DocketMatch);
            }
        }
    }
}

/// Lobbying filings to any document sharing an issue code and a token.
fn link_filings(documents: &[DocumentRecord], edges: &mut BTreeSet<EdgeRecord>) {
    let others: Vec<(&DocumentRecord, HashSet<String>)> = documents
        .iter()
        .filter(|doc| doc.source != Source::Lda && !doc.issue_codes.is_empty())
        .map(|doc| {
            let tokens = tokenize([
                Some(doc.title.as_str()),
                doc.summary.as_deref(),
                doc.agency.as_deref(),
            ]);
            (doc, tokens)
        })
        .collect();

    for filing in documents.iter().filter(|doc| doc.source == Source::Lda) {
        let filing_tokens = tokenize([
            Some(filing.title.as_str()),
            filing.summary.as_deref(),
            filing.feature_str("client"),
            filing.feature_str("registrant"),
        ]);
        if filing_tokens.is_empty() || filing.issue_codes.is_empty() {
            continue;
        }

        for (doc, tokens) in &others {
            let shares_issue = doc
                .issue_codes
                .iter()
                .any(|code| filing.issue_codes.contains(code));
            if shares_issue && !filing_tokens.is_disjoint(tokens) {
                link_pair(edges, &filing.id, &doc.id, Relation::LdaOverlap);
            }
        }
    }
}

/// Hearings to the bills their title or summary mention.
fn link_hearings(documents: &[DocumentRecord], edges: &mut BTreeSet<EdgeRecord>) {
    let mut bills: HashMap<String, &str> = HashMap::new();
    for doc in documents.iter().filter(|d| d.document_type == DocumentType::Bill) {
        let bill_id = doc
            .origin_id
            .as_deref()
            .and_then(canonical_bill_id)
            .or_else(|| canonical_bill_id(&doc.title));
        if let Some(bill_id) = bill_id {
            bills.insert(bill_id, doc.id.as_str());
        }
    }
    if bills.is_empty() {
        return;
    }

    for hearing in documents.iter().filter(|d| d.document_type == DocumentType::Hearing) {
        let text = match hearing.summary.as_deref() {
            Some(summary) => format!("{} {}", hearing.title, summary),
            None => hearing.title.clone(),
        };
        for bill_id in bill_ids_in(&text) {
            if let Some(bill_doc) = bills.get(&bill_id) {
                link_pair(edges, &hearing.id, bill_doc, Relation::LegislativeActivity);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, source: Source, kind: DocumentType, title: &str) -> DocumentRecord {
        DocumentRecord::new(id, source, title, kind)
    }

    #[test]
    fn test_bill_id_canonicalization() {
        for raw in ["H.R. 1234", "HR1234", "H R. 1234", "h.r.1234"] {
            assert_eq!(canonical_bill_id(raw).as_deref(), Some("HR1234"), "{raw}");
        }
        assert_eq!(canonical_bill_id("S.Res. 45").as_deref(), Some("SRES45"));
        assert_eq!(canonical_bill_id("H.J.Res. 7").as_deref(), Some("HJRES7"));
        assert_eq!(canonical_bill_id("S.Con.Res. 12").as_deref(), Some("SCONRES12"));
        assert_eq!(canonical_bill_id("118-hr-1234"), None);
        assert_eq!(canonical_bill_id("no bills here"), None);
    }

    #[test]
    fn test_bill_ids_in_text_finds_all() {
        let ids = bill_ids_in("Markup of H.R. 1234, S. 99? no, S.Res. 45 and HR1234 again");
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        assert_eq!(ids, vec!["HR1234", "SRES45"]);
    }

    #[test]
    fn test_docket_match_is_symmetric_and_case_insensitive() {
        let mut fr = doc("federal_register:1", Source::FederalRegister, DocumentType::Notice, "Notice");
        fr.docket_id = Some("EPA-2024-0001".into());
        let mut regs = doc("regulations_gov:2", Source::RegulationsGov, DocumentType::Docket, "Docket");
        regs.docket_id = Some("epa-2024-0001".into());
        let mut other_fr = doc("federal_register:3", Source::FederalRegister, DocumentType::Rule, "Rule");
        other_fr.docket_id = Some("EPA-2024-0001".into());
        let unrelated = doc("regulations_gov:4", Source::RegulationsGov, DocumentType::Docket, "Other");

        let edges = CrossReferenceBuilder::new().build(&[fr, regs, other_fr, unrelated]);
        assert_eq!(edges.len(), 4);
        for edge in &edges {
            assert_eq!(edge.relation, Relation::DocketMatch);
            assert!(edges.contains(&edge.reversed()));
            assert!(!edge.touches("regulations_gov:4"));
        }
        // two Federal Register documents in one docket are not linked to each other
        assert!(!edges.contains(&EdgeRecord::new(
            "federal_register:1",
            "federal_register:3",
            Relation::DocketMatch
        )));
    }

    #[test]
    fn test_filing_overlap_needs_issue_and_token() {
        let mut filing = doc("lda:1", Source::Lda, DocumentType::Docket, "LDA Filing: Acme Pharma (Q1 2024)");
        filing.summary = Some("Medicare drug pricing".into());
        filing.issue_codes = ["HCR".to_string()].into_iter().collect();
        filing.features.insert("registrant".into(), "K Street Partners".into());

        let both = doc("congress:a", Source::Congress, DocumentType::Bill, "Medicare Drug Price Act")
            .with_issue_codes(["hcr"]);
        let issue_only = doc("congress:b", Source::Congress, DocumentType::Bill, "Veterans Care Act")
            .with_issue_codes(["HCR"]);
        let token_only = doc("congress:c", Source::Congress, DocumentType::Bill, "Medicare Tax Act")
            .with_issue_codes(["TAX"]);
        let no_codes = doc("congress:d", Source::Congress, DocumentType::Bill, "Medicare Act");

        let edges = CrossReferenceBuilder::new().build(&[filing, both, issue_only, token_only, no_codes]);
        let expected: BTreeSet<EdgeRecord> = [
            EdgeRecord::new("lda:1", "congress:a", Relation::LdaOverlap),
            EdgeRecord::new("congress:a", "lda:1", Relation::LdaOverlap),
        ]
        .into_iter()
        .collect();
        assert_eq!(edges, expected);
    }

    #[test]
    fn test_filing_without_issue_codes_links_nothing() {
        let filing = doc("lda:1", Source::Lda, DocumentType::Docket, "LDA Filing: Medicare Group");
        let bill = doc("congress:a", Source::Congress, DocumentType::Bill, "Medicare Act")
            .with_issue_codes(["HCR"]);
        assert!(CrossReferenceBuilder::new().build(&[filing, bill]).is_empty());
    }

    #[test]
    fn test_hearing_links_to_mentioned_bills() {
        let mut bill = doc("congress:118-hr-1234", Source::Congress, DocumentType::Bill, "H.R. 1234: Clean Water Act");
        bill.origin_id = Some("118-hr-1234".into());
        let resolution = doc("congress:118-sres-45", Source::Congress, DocumentType::Bill, "S.Res. 45: A resolution");
        let mut hearing = doc("congress:meeting-1", Source::Congress, DocumentType::Hearing, "Hearing on water");
        hearing.summary = Some("Related bills: H.R. 1234, S.Res. 45, H.R. 9999".into());

        let edges = CrossReferenceBuilder::new().build(&[bill, resolution, hearing]);
        assert_eq!(edges.len(), 4);
        assert!(edges.contains(&EdgeRecord::new(
            "congress:meeting-1",
            "congress:118-hr-1234",
            Relation::LegislativeActivity
        )));
        assert!(edges.contains(&EdgeRecord::new(
            "congress:118-sres-45",
            "congress:meeting-1",
            Relation::LegislativeActivity
        )));
    }

    #[test]
    fn test_edges_stay_inside_the_batch() {
        let mut fr = doc("federal_register:1", Source::FederalRegister, DocumentType::Notice, "Notice");
        fr.docket_id = Some("D-1".into());
        let mut regs = doc("regulations_gov:1", Source::RegulationsGov, DocumentType::Docket, "Docket");
        regs.docket_id = Some("D-1".into());
        let mut hearing = doc("congress:h", Source::Congress, DocumentType::Hearing, "Hearing on H.R. 5");
        hearing.issue_codes = ["ENV".to_string()].into_iter().collect();
        let batch = vec![fr, regs, hearing];

        let edges = CrossReferenceBuilder::new().build(&batch);
        let ids: HashSet<&str> = batch.iter().map(|d| d.id.as_str()).collect();
        assert!(!edges.is_empty());
        for edge in edges {
            assert!(ids.contains(edge.src_id.as_str()));
            assert!(ids.contains(edge.dst_id.as_str()));
        }
    }
}

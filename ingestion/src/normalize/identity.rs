use govsearch_core::model::Source;
use sha1::{Digest, Sha1};

/// Derive the stable document id.
///
/// The first non-blank candidate wins, in the order given (native id,
/// source-specific secondary id, docket id, bill id). With no candidate the id
/// falls back to `sha1("{source}|{title}|{url}")`.
pub fn stable_id<'a, I>(source: Source, candidates: I, title: &str, url: Option<&str>) -> String
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let native = candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|candidate| !candidate.is_empty());

    match native {
        Some(candidate) => format!("{source}:{candidate}"),
        None => format!("{source}:{}", content_hash(source, title, url)),
    }
}

fn content_hash(source: Source, title: &str, url: Option<&str>) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("{source}|{title}|{}", url.unwrap_or_default()).as_bytes());
    format!("{:x}", hasher.finalize())
}

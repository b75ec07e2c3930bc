//! Identifier and title normalization used for matching records.

use std::collections::BTreeSet;

/// Normalize a DOI: strip resolver prefixes, trim, lowercase.
///
/// Returns `None` unless the result starts with `10.` and has a non-empty
/// suffix after the first `/`.
pub fn normalize_doi(input: &str) -> Option<String> {
    let input = input.trim();
    let lower = input.to_lowercase();

    let stripped = [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
        "doi.org/",
        "doi:",
    ]
    .iter()
    .find_map(|prefix| lower.strip_prefix(prefix))
    .unwrap_or(&lower)
    .trim();

    if !stripped.starts_with("10.") {
        return None;
    }
    let slash = stripped.find('/')?;
    if stripped[slash + 1..].trim().is_empty() {
        return None;
    }

    Some(stripped.to_string())
}

/// Normalize an arXiv identifier: drop URL, `arxiv:` prefix and version.
pub fn normalize_arxiv(input: &str) -> Option<String> {
    let id = input.trim().to_lowercase();

    let id = match id.find("/abs/") {
        Some(pos) => id[pos + 5..].to_string(),
        None => id.strip_prefix("arxiv:").unwrap_or(&id).trim().to_string(),
    };

    let id = strip_version(&id).trim_end_matches('/');
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Drop a trailing `v<digits>` version marker
fn strip_version(id: &str) -> &str {
    match id.rfind('v') {
        Some(pos)
            if pos > 0
                && pos + 1 < id.len()
                && id[pos + 1..].chars().all(|c| c.is_ascii_digit()) =>
        {
            &id[..pos]
        }
        _ => id,
    }
}

/// Lowercase, drop punctuation, collapse whitespace
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Family name of an author, lowercased without punctuation.
///
/// "Family, Given" yields the part before the comma; otherwise the last
/// whitespace-separated token is used.
pub fn surname(author: &str) -> Option<String> {
    let author = author.trim();
    let family = match author.split_once(',') {
        Some((family, _)) => family,
        None => author.split_whitespace().last()?,
    };

    let key: String = family
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// Set of surnames for an author list
pub fn surnames<S: AsRef<str>>(authors: &[S]) -> BTreeSet<String> {
    authors.iter().filter_map(|a| surname(a.as_ref())).collect()
}

//! Raw publication records as emitted by a platform adapter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The external platform a record was fetched from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Orcid,
    SemanticScholar,
    Arxiv,
    GoogleScholar,
    #[serde(rename = "crossref")]
    CrossRef,
    #[serde(untagged)]
    Other(String),
}

impl Platform {
    /// All platforms with a built-in adapter, in reconciliation priority order
    pub const BUILTIN: [Platform; 5] = [
        Platform::CrossRef,
        Platform::SemanticScholar,
        Platform::Orcid,
        Platform::Arxiv,
        Platform::GoogleScholar,
    ];

    /// Returns the display name of the platform
    pub fn name(&self) -> &str {
        match self {
            Platform::Orcid => "ORCID",
            Platform::SemanticScholar => "Semantic Scholar",
            Platform::Arxiv => "arXiv",
            Platform::GoogleScholar => "Google Scholar",
            Platform::CrossRef => "CrossRef",
            Platform::Other(s) => s,
        }
    }

    /// Returns the stable identifier used in configuration and in the store
    pub fn id(&self) -> &str {
        match self {
            Platform::Orcid => "orcid",
            Platform::SemanticScholar => "semantic_scholar",
            Platform::Arxiv => "arxiv",
            Platform::GoogleScholar => "google_scholar",
            Platform::CrossRef => "crossref",
            Platform::Other(s) => s,
        }
    }

    /// Parse a platform identifier. Unknown identifiers become `Other`.
    pub fn from_id(id: &str) -> Self {
        match id.trim().to_lowercase().as_str() {
            "orcid" => Platform::Orcid,
            "semantic_scholar" | "semantic" | "s2" => Platform::SemanticScholar,
            "arxiv" => Platform::Arxiv,
            "google_scholar" | "scholar" => Platform::GoogleScholar,
            "crossref" => Platform::CrossRef,
            other => Platform::Other(other.to_string()),
        }
    }

    /// Rank used to order records deterministically before merging
    pub fn priority(&self) -> usize {
        Self::BUILTIN
            .iter()
            .position(|p| p == self)
            .unwrap_or(Self::BUILTIN.len())
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Who we are fetching publications for.
///
/// Built once from the configuration and handed to every adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorRef {
    /// Full name, used for name-based lookups (arXiv, Semantic Scholar fallback)
    pub name: String,

    /// ORCID iD (e.g. `0000-0002-1825-0097`)
    pub orcid: Option<String>,

    /// Platform-local author ids keyed by platform id
    pub platform_ids: BTreeMap<String, String>,
}

impl AuthorRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            orcid: None,
            platform_ids: BTreeMap::new(),
        }
    }

    pub fn orcid(mut self, orcid: impl Into<String>) -> Self {
        self.orcid = Some(orcid.into());
        self
    }

    pub fn platform_id(mut self, platform: &Platform, id: impl Into<String>) -> Self {
        self.platform_ids.insert(platform.id().to_string(), id.into());
        self
    }

    /// The author id configured for a platform, if any
    pub fn id_for(&self, platform: &Platform) -> Option<&str> {
        self.platform_ids.get(platform.id()).map(|s| s.as_str())
    }
}

/// A publication as reported by one platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Platform the record came from
    pub platform: Platform,

    /// Platform-local identifier (put-code, S2 paper id, arXiv id, ...)
    pub platform_id: String,

    /// Title as reported
    pub title: String,

    /// Author names in publication order
    pub authors: Vec<String>,

    /// Digital Object Identifier, as reported (not yet normalized)
    pub doi: Option<String>,

    /// arXiv identifier
    pub arxiv_id: Option<String>,

    /// Publication year
    pub year: Option<i32>,

    /// Journal, conference or repository
    pub venue: Option<String>,

    /// Landing page
    pub url: Option<String>,

    /// Citation count; `None` when the platform does not report counts
    pub citations: Option<u32>,
}

impl RawRecord {
    /// Create a new record with required fields
    pub fn new(platform: Platform, platform_id: String, title: String) -> Self {
        Self {
            platform,
            platform_id,
            title,
            authors: Vec::new(),
            doi: None,
            arxiv_id: None,
            year: None,
            venue: None,
            url: None,
            citations: None,
        }
    }
}

/// Builder for constructing RawRecord objects
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    record: RawRecord,
}

impl RecordBuilder {
    pub fn new(platform: Platform, platform_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            record: RawRecord::new(platform, platform_id.into(), title.into()),
        }
    }

    /// Set authors
    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.record.authors = authors
            .into_iter()
            .map(Into::into)
            .filter(|a: &String| !a.trim().is_empty())
            .collect();
        self
    }

    /// Set DOI; empty strings are ignored
    pub fn doi(mut self, doi: impl Into<String>) -> Self {
        let doi = doi.into();
        if !doi.trim().is_empty() {
            self.record.doi = Some(doi);
        }
        self
    }

    /// Set arXiv id; empty strings are ignored
    pub fn arxiv_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !id.trim().is_empty() {
            self.record.arxiv_id = Some(id);
        }
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.record.year = Some(year);
        self
    }

    pub fn maybe_year(mut self, year: Option<i32>) -> Self {
        self.record.year = year;
        self
    }

    /// Set the count only when the platform reported one
    pub fn maybe_citations(mut self, count: Option<u32>) -> Self {
        self.record.citations = count;
        self
    }

    /// Set venue; empty strings are ignored
    pub fn venue(mut self, venue: impl Into<String>) -> Self {
        let venue = venue.into();
        if !venue.trim().is_empty() {
            self.record.venue = Some(venue);
        }
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.record.url = Some(url.into());
        self
    }

    /// Set citation count
    pub fn citations(mut self, count: u32) -> Self {
        self.record.citations = Some(count);
        self
    }

    /// Build the RawRecord
    pub fn build(self) -> RawRecord {
        self.record
    }
}

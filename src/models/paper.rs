//! Canonical paper model and citation history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The deduplicated, merged representation of one publication across platforms.
///
/// Identifier and citation maps are keyed by platform id (`"orcid"`,
/// `"semantic_scholar"`, ...). A platform that did not report a count is
/// absent from `citations`, it is never stored as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    /// Store-assigned id; `None` until the paper has been persisted
    pub id: Option<i64>,

    pub title: String,

    /// Normalized DOI (lowercase, no resolver prefix)
    pub doi: Option<String>,

    pub arxiv_id: Option<String>,

    pub year: Option<i32>,

    pub venue: Option<String>,

    pub authors: Vec<String>,

    /// Platform-local identifiers keyed by platform id
    pub identifiers: BTreeMap<String, String>,

    /// Latest citation count per platform id
    pub citations: BTreeMap<String, u32>,

    pub first_seen: DateTime<Utc>,

    pub last_updated: DateTime<Utc>,
}

impl Paper {
    pub fn new(title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            title: title.into(),
            doi: None,
            arxiv_id: None,
            year: None,
            venue: None,
            authors: Vec::new(),
            identifiers: BTreeMap::new(),
            citations: BTreeMap::new(),
            first_seen: now,
            last_updated: now,
        }
    }

    /// Best citation figure across platforms (platforms disagree, so take the max)
    pub fn citation_count(&self) -> u32 {
        self.citations.values().copied().max().unwrap_or(0)
    }

    /// Human-readable primary identifier: DOI, then arXiv id, then store id
    pub fn primary_id(&self) -> String {
        if let Some(doi) = &self.doi {
            return doi.clone();
        }
        if let Some(arxiv) = &self.arxiv_id {
            return format!("arXiv:{}", arxiv);
        }
        self.id.map(|id| format!("#{}", id)).unwrap_or_default()
    }

    /// Age in whole years relative to `year`, if the publication year is known
    pub fn age_years(&self, current_year: i32) -> Option<i32> {
        self.year.map(|y| (current_year - y).max(0))
    }
}

/// One timestamped citation-count observation for a (paper, platform) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationSnapshot {
    pub paper_id: i64,
    pub platform: String,
    pub citations: u32,
    pub recorded_at: DateTime<Utc>,
}

/// A paper the user explicitly follows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedPaper {
    pub paper: Paper,
    pub added_at: DateTime<Utc>,
    pub alert_enabled: bool,
}

/// Outcome of the last sync attempt against a platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
    Ok,
    Partial,
    Failed,
    Skipped,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Ok => "ok",
            SyncOutcome::Partial => "partial",
            SyncOutcome::Failed => "failed",
            SyncOutcome::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "ok" => SyncOutcome::Ok,
            "partial" => SyncOutcome::Partial,
            "skipped" => SyncOutcome::Skipped,
            _ => SyncOutcome::Failed,
        }
    }
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub platform: String,
    pub last_sync: DateTime<Utc>,
    pub outcome: SyncOutcome,
    pub error_message: Option<String>,
}

/// A persisted notice that a paper gained citations during a fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub paper_id: Option<i64>,
    pub alert_type: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_citation_count_takes_max() {
        let mut paper = Paper::new("Test", Utc::now());
        assert_eq!(paper.citation_count(), 0);

        paper.citations.insert("semantic_scholar".into(), 12);
        paper.citations.insert("crossref".into(), 9);
        assert_eq!(paper.citation_count(), 12);
    }

    #[test]
    fn test_primary_id() {
        let mut paper = Paper::new("Test", Utc::now());
        paper.id = Some(7);
        assert_eq!(paper.primary_id(), "#7");

        paper.arxiv_id = Some("2301.12345".into());
        assert_eq!(paper.primary_id(), "arXiv:2301.12345");

        paper.doi = Some("10.1/x".into());
        assert_eq!(paper.primary_id(), "10.1/x");
    }

    #[test]
    fn test_sync_outcome_parse() {
        for outcome in [
            SyncOutcome::Ok,
            SyncOutcome::Partial,
            SyncOutcome::Failed,
            SyncOutcome::Skipped,
        ] {
            assert_eq!(SyncOutcome::parse(outcome.as_str()), outcome);
        }
    }
}

//! Record reconciliation: group raw records from all platforms into canonical papers.
//!
//! Matching rules, in order:
//!
//! 1. Records with the same normalized DOI always form one paper.
//! 2. Otherwise a record joins a group when the normalized titles are equal,
//!    at least one author surname is shared, the group has no record from
//!    the same platform yet, and the DOIs do not disagree.
//! 3. A record that fits more than one group is never merged; it becomes its
//!    own paper and an [`AmbiguousMatch`] is reported.
//! 4. Titles that are nearly but not exactly equal (Jaro-Winkler >= 0.95)
//!    with shared authors are reported as ambiguous and left apart.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use strsim::jaro_winkler;

use crate::models::identifiers::{normalize_arxiv, normalize_doi, normalize_title, surnames};
use crate::models::{Paper, RawRecord};

/// Titles at least this similar (but not equal) are flagged as possible duplicates
pub const NEAR_DUPLICATE_THRESHOLD: f64 = 0.95;

/// Result of one reconciliation pass
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Canonical papers, not yet persisted (`id` is `None`)
    pub papers: Vec<Paper>,

    /// Matches that were not resolved automatically
    pub conflicts: Vec<AmbiguousMatch>,
}

/// Why a record was left unmerged
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ConflictReason {
    /// The record fits several existing groups equally well
    MultipleCandidates,
    /// A group has a nearly identical title and shared authors
    NearDuplicateTitle { similarity: f64 },
}

/// A reconciliation conflict surfaced to the user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmbiguousMatch {
    pub platform: String,
    pub platform_id: String,
    pub title: String,
    /// Titles of the papers the record could belong to
    pub candidates: Vec<String>,
    pub reason: ConflictReason,
}

impl std::fmt::Display for AmbiguousMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            ConflictReason::MultipleCandidates => write!(
                f,
                "'{}' ({} {}) matches {} papers; kept separate",
                self.title,
                self.platform,
                self.platform_id,
                self.candidates.len()
            ),
            ConflictReason::NearDuplicateTitle { similarity } => write!(
                f,
                "'{}' ({} {}) looks like '{}' (similarity {:.2}); kept separate",
                self.title,
                self.platform,
                self.platform_id,
                self.candidates.join("', '"),
                similarity
            ),
        }
    }
}

/// Records grouped so far, with the keys used for matching
#[derive(Debug)]
struct Group {
    records: Vec<RawRecord>,
    doi: Option<String>,
    title_keys: BTreeSet<String>,
    surnames: BTreeSet<String>,
    platforms: BTreeSet<String>,
}

impl Group {
    fn new(record: RawRecord, doi: Option<String>, title_key: String) -> Self {
        let mut group = Self {
            records: Vec::new(),
            doi,
            title_keys: BTreeSet::new(),
            surnames: BTreeSet::new(),
            platforms: BTreeSet::new(),
        };
        group.add(record, title_key);
        group
    }

    fn add(&mut self, record: RawRecord, title_key: String) {
        self.title_keys.insert(title_key);
        self.surnames.extend(surnames(&record.authors));
        self.platforms.insert(record.platform.id().to_string());
        self.records.push(record);
    }

    fn shares_author(&self, other: &BTreeSet<String>) -> bool {
        !self.surnames.is_disjoint(other)
    }

    fn title(&self) -> &str {
        self.records
            .first()
            .map(|r| r.title.as_str())
            .unwrap_or_default()
    }

    /// Whether a DOI-less match is allowed: same title, shared author,
    /// no record from this platform yet, no conflicting DOI
    fn accepts(&self, title_key: &str, doi: Option<&str>, platform: &str, names: &BTreeSet<String>) -> bool {
        if self.platforms.contains(platform) || !self.title_keys.contains(title_key) {
            return false;
        }
        if let (Some(mine), Some(theirs)) = (self.doi.as_deref(), doi) {
            if mine != theirs {
                return false;
            }
        }
        self.shares_author(names)
    }

    fn into_paper(self, now: DateTime<Utc>) -> Paper {
        let records = self.records;

        let title = records
            .iter()
            .map(|r| r.title.trim())
            .find(|t| !t.is_empty())
            .unwrap_or_default()
            .to_string();

        let mut paper = Paper::new(title, now);
        paper.doi = self.doi;
        paper.arxiv_id = records
            .iter()
            .find_map(|r| r.arxiv_id.as_deref().and_then(normalize_arxiv));
        paper.year = records.iter().find_map(|r| r.year);
        paper.venue = records
            .iter()
            .filter_map(|r| r.venue.as_deref())
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(str::to_string);

        // Longest author list; the first one wins ties
        let mut longest: &[String] = &[];
        for record in &records {
            if record.authors.len() > longest.len() {
                longest = &record.authors;
            }
        }
        paper.authors = longest.to_vec();

        for record in &records {
            let platform = record.platform.id().to_string();
            paper
                .identifiers
                .entry(platform.clone())
                .or_insert_with(|| record.platform_id.clone());

            if let Some(count) = record.citations {
                let entry = paper.citations.entry(platform).or_insert(count);
                *entry = (*entry).max(count);
            }
        }

        paper
    }
}

/// Deterministic processing order: platform priority, then identifiers
fn sort_records(records: &mut [RawRecord]) {
    records.sort_by(|a, b| {
        a.platform
            .priority()
            .cmp(&b.platform.priority())
            .then_with(|| a.platform.id().cmp(b.platform.id()))
            .then_with(|| a.platform_id.cmp(&b.platform_id))
            .then_with(|| a.title.cmp(&b.title))
    });
}

/// Group the union of raw records from one fetch cycle into canonical papers.
///
/// Output order is deterministic for a given input set.
pub fn reconcile(mut records: Vec<RawRecord>, now: DateTime<Utc>) -> Reconciliation {
    sort_records(&mut records);

    let mut groups: Vec<Group> = Vec::new();
    let mut by_doi: HashMap<String, usize> = HashMap::new();
    let mut conflicts = Vec::new();

    for record in records {
        let title_key = normalize_title(&record.title);
        if title_key.is_empty() {
            tracing::debug!(
                "Skipping untitled record {} from {}",
                record.platform_id,
                record.platform
            );
            continue;
        }
        let doi = record.doi.as_deref().and_then(normalize_doi);
        let platform = record.platform.id().to_string();
        let names = surnames(&record.authors);

        // Rule 1: DOI identity
        if let Some(&idx) = doi.as_ref().and_then(|d| by_doi.get(d)) {
            groups[idx].add(record, title_key);
            continue;
        }

        // Rule 2/3: title + author fallback
        let candidates: Vec<usize> = groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.accepts(&title_key, doi.as_deref(), &platform, &names))
            .map(|(i, _)| i)
            .collect();

        match candidates.as_slice() {
            [idx] => {
                let idx = *idx;
                if groups[idx].doi.is_none() {
                    if let Some(d) = &doi {
                        by_doi.insert(d.clone(), idx);
                        groups[idx].doi = Some(d.clone());
                    }
                }
                groups[idx].add(record, title_key);
                continue;
            }
            [] => {
                if let Some(conflict) = near_duplicate(&groups, &record, &title_key, doi.as_deref(), &names) {
                    tracing::warn!("Possible duplicate: {}", conflict);
                    conflicts.push(conflict);
                }
            }
            many => {
                let conflict = AmbiguousMatch {
                    platform: platform.clone(),
                    platform_id: record.platform_id.clone(),
                    title: record.title.clone(),
                    candidates: many.iter().map(|&i| groups[i].title().to_string()).collect(),
                    reason: ConflictReason::MultipleCandidates,
                };
                tracing::warn!("Ambiguous match: {}", conflict);
                conflicts.push(conflict);
            }
        }

        if let Some(d) = &doi {
            by_doi.insert(d.clone(), groups.len());
        }
        groups.push(Group::new(record, doi, title_key));
    }

    let papers = groups.into_iter().map(|g| g.into_paper(now)).collect();
    Reconciliation { papers, conflicts }
}

/// Look for a group whose title is nearly the same and shares an author
fn near_duplicate(
    groups: &[Group],
    record: &RawRecord,
    title_key: &str,
    doi: Option<&str>,
    names: &BTreeSet<String>,
) -> Option<AmbiguousMatch> {
    let mut best: Option<(f64, &Group)> = None;

    for group in groups {
        // Two distinct DOIs are two works, however alike the titles
        if doi.is_some() && group.doi.is_some() {
            continue;
        }
        if !group.shares_author(names) {
            continue;
        }
        for key in &group.title_keys {
            if key == title_key {
                continue;
            }
            let similarity = jaro_winkler(key, title_key);
            if similarity >= NEAR_DUPLICATE_THRESHOLD
                && best.map(|(s, _)| similarity > s).unwrap_or(true)
            {
                best = Some((similarity, group));
            }
        }
    }

    best.map(|(similarity, group)| AmbiguousMatch {
        platform: record.platform.id().to_string(),
        platform_id: record.platform_id.clone(),
        title: record.title.clone(),
        candidates: vec![group.title().to_string()],
        reason: ConflictReason::NearDuplicateTitle { similarity },
    })
}

/// Citation counts per platform across a set of papers, keyed by platform id
pub fn platform_totals(papers: &[Paper]) -> BTreeMap<String, u64> {
    let mut totals = BTreeMap::new();
    for paper in papers {
        for (platform, count) in &paper.citations {
            *totals.entry(platform.clone()).or_insert(0) += u64::from(*count);
        }
    }
    totals
}

//! Dashboard and per-paper statistics.
//!
//! A paper's citation figure is the maximum across platforms, see
//! [`Paper::citation_count`].

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::models::{CitationSnapshot, Paper};
use crate::reconcile::platform_totals;
use crate::store::{Store, StoreError};

/// Reporting window for the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Week,
    #[default]
    Month,
    Year,
    All,
}

impl Period {
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Period::Week => Some(Duration::days(7)),
            Period::Month => Some(Duration::days(30)),
            Period::Year => Some(Duration::days(365)),
            Period::All => None,
        }
    }

    pub fn start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.duration().map(|d| now - d)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
            Period::All => "all",
        }
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "week" | "7d" => Ok(Period::Week),
            "month" | "30d" => Ok(Period::Month),
            "year" | "1y" => Ok(Period::Year),
            "all" => Ok(Period::All),
            other => Err(format!("unknown period '{}': use week, month, year or all", other)),
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub period: Period,
    pub total_papers: usize,
    pub total_citations: u64,
    pub h_index: u32,
    pub avg_citations: f64,
    /// Papers first seen during the period
    pub papers_change: i64,
    pub citations_change: i64,
    pub h_index_change: i64,
    /// Sum of counts reported by each platform
    pub platform_totals: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaperStats {
    pub paper: Paper,
    pub citations: u32,
    pub growth_7d: i64,
    pub growth_30d: i64,
    pub growth_1y: i64,
    pub history: Vec<CitationSnapshot>,
}

/// Largest h such that h papers have at least h citations each
pub fn h_index(counts: &[u32]) -> u32 {
    let mut sorted = counts.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted
        .iter()
        .enumerate()
        .take_while(|&(i, &c)| c as usize > i)
        .count() as u32
}

/// Dashboard figures; `earlier` holds per-platform counts at the start of the period
pub fn dashboard(
    papers: &[Paper],
    earlier: &BTreeMap<i64, BTreeMap<String, u32>>,
    period: Period,
    now: DateTime<Utc>,
) -> DashboardStats {
    let counts: Vec<u32> = papers.iter().map(Paper::citation_count).collect();
    let total_citations: u64 = counts.iter().map(|&c| u64::from(c)).sum();
    let h = h_index(&counts);

    let avg_citations = if papers.is_empty() {
        0.0
    } else {
        total_citations as f64 / papers.len() as f64
    };

    let (papers_change, citations_change, h_index_change) = match period.start(now) {
        Some(start) => {
            let before: Vec<u32> = earlier
                .values()
                .map(|per_platform| per_platform.values().copied().max().unwrap_or(0))
                .collect();
            let before_total: u64 = before.iter().map(|&c| u64::from(c)).sum();
            let new_papers = papers.iter().filter(|p| p.first_seen >= start).count();

            (
                new_papers as i64,
                total_citations as i64 - before_total as i64,
                i64::from(h) - i64::from(h_index(&before)),
            )
        }
        None => (papers.len() as i64, total_citations as i64, i64::from(h)),
    };

    DashboardStats {
        period,
        total_papers: papers.len(),
        total_citations,
        h_index: h,
        avg_citations,
        papers_change,
        citations_change,
        h_index_change,
        platform_totals: platform_totals(papers),
    }
}

/// Highest cited first; title breaks ties
pub fn top_papers(papers: &[Paper], limit: usize) -> Vec<&Paper> {
    let mut ranked: Vec<&Paper> = papers.iter().collect();
    ranked.sort_by(|a, b| {
        b.citation_count()
            .cmp(&a.citation_count())
            .then_with(|| a.title.cmp(&b.title))
    });
    ranked.truncate(limit);
    ranked
}

/// Best count across platforms as of `at`, from a paper's snapshot history
pub fn count_at(history: &[CitationSnapshot], at: DateTime<Utc>) -> u32 {
    let mut latest: BTreeMap<&str, u32> = BTreeMap::new();
    // history is ordered oldest first, so later entries overwrite earlier ones
    for snapshot in history.iter().filter(|s| s.recorded_at <= at) {
        latest.insert(&snapshot.platform, snapshot.citations);
    }
    latest.values().copied().max().unwrap_or(0)
}

/// Citations gained within `window` before `now`
pub fn growth(history: &[CitationSnapshot], window: Duration, now: DateTime<Utc>) -> i64 {
    i64::from(count_at(history, now)) - i64::from(count_at(history, now - window))
}

pub fn paper_stats(paper: Paper, history: Vec<CitationSnapshot>, now: DateTime<Utc>) -> PaperStats {
    PaperStats {
        citations: paper.citation_count(),
        growth_7d: growth(&history, Duration::days(7), now),
        growth_30d: growth(&history, Duration::days(30), now),
        growth_1y: growth(&history, Duration::days(365), now),
        paper,
        history,
    }
}

/// Dashboard straight from the store
pub fn dashboard_from_store(
    store: &Store,
    period: Period,
    now: DateTime<Utc>,
) -> Result<DashboardStats, StoreError> {
    let papers = store.papers()?;
    let earlier = match period.start(now) {
        Some(start) => store.citations_as_of(start)?,
        None => BTreeMap::new(),
    };
    Ok(dashboard(&papers, &earlier, period, now))
}

/// Look a paper up by DOI or arXiv id and compute its statistics
pub fn paper_stats_from_store(
    store: &Store,
    key: &str,
    now: DateTime<Utc>,
) -> Result<Option<PaperStats>, StoreError> {
    let paper = match store.find_by_doi(key)? {
        Some(paper) => Some(paper),
        None => store.find_by_arxiv(key)?,
    };
    let Some(paper) = paper else {
        return Ok(None);
    };
    let Some(id) = paper.id else {
        return Ok(None);
    };

    let history = store.history(id, None)?;
    Ok(Some(paper_stats(paper, history, now)))
}

//! Deterministic recommendations derived from a store snapshot.
//!
//! `score = priority weight * 100 + impact`, with the impact term kept in
//! `0..100` so priority always dominates. Equal scores are ordered by
//! category, paper title and paper id.

use chrono::{DateTime, Datelike, Duration, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::config::{Config, RecommendationsConfig};
use crate::metrics::growth;
use crate::models::{Category, Paper, Priority, Recommendation, SyncStatus};
use crate::sources::{SourceCapabilities, SourceRegistry};
use crate::store::{Store, StoreError};

/// Papers younger than this are not judged on citations
const MIN_AGE_YEARS: i32 = 2;

/// Share of papers with at most two authors above which collaboration is suggested
const SMALL_TEAM_SHARE: f64 = 0.3;

const STALE_SYNC_DAYS: i64 = 7;

/// How many growing papers are called out
const TRENDING_PAPERS: usize = 3;

/// Everything the engine looks at, captured at `as_of`
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub as_of: DateTime<Utc>,
    pub papers: Vec<Paper>,
    /// Citations gained in the last 30 days, by paper id
    pub growth_30d: BTreeMap<i64, i64>,
    pub sync: Vec<SyncStatus>,
    pub enabled_platforms: Vec<String>,
    pub disabled_platforms: Vec<String>,
    /// Enabled platforms that report citation counts
    pub counting_platforms: Vec<String>,
}

impl Snapshot {
    pub fn load(
        store: &Store,
        config: &Config,
        registry: &SourceRegistry,
        as_of: DateTime<Utc>,
    ) -> Result<Self, StoreError> {
        let papers = store.papers()?;

        let mut growth_30d = BTreeMap::new();
        for id in papers.iter().filter_map(|p| p.id) {
            let history = store.history(id, None)?;
            growth_30d.insert(id, growth(&history, Duration::days(30), as_of));
        }

        let counting_platforms = registry
            .with_capability(SourceCapabilities::CITATION_COUNTS)
            .iter()
            .map(|s| s.id().to_string())
            .collect();

        Ok(Self {
            as_of,
            papers,
            growth_30d,
            sync: store.sync_statuses()?,
            enabled_platforms: config.enabled_platforms(),
            disabled_platforms: config.disabled_platforms(),
            counting_platforms,
        })
    }
}

/// Optional narrowing of the ranked list
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub category: Option<Category>,
    pub top: Option<usize>,
}

pub struct RecommendationEngine<'a> {
    settings: &'a RecommendationsConfig,
}

impl<'a> RecommendationEngine<'a> {
    pub fn new(settings: &'a RecommendationsConfig) -> Self {
        Self { settings }
    }

    /// Ranked recommendations; identical snapshots give identical output
    pub fn recommend(&self, snapshot: &Snapshot, filter: &Filter) -> Vec<Recommendation> {
        if !self.settings.enabled {
            return Vec::new();
        }

        let mut out = Vec::new();
        let wants = |c: Category| filter.category.map(|f| f == c).unwrap_or(true);

        if wants(Category::Visibility) {
            self.visibility(snapshot, &mut out);
        }
        if wants(Category::Collaboration) && self.settings.suggest_collaborations {
            collaboration(snapshot, &mut out);
        }
        if wants(Category::Trending) {
            self.trending(snapshot, &mut out);
        }
        if wants(Category::Profile) {
            profile(snapshot, &mut out);
        }

        out.sort_by(rank);
        if let Some(top) = filter.top {
            out.truncate(top);
        }
        out
    }

    fn visibility(&self, snapshot: &Snapshot, out: &mut Vec<Recommendation>) {
        let threshold = self.settings.low_visibility_threshold;
        let current_year = snapshot.as_of.year();
        let mut low_visibility = Vec::new();

        if self.settings.identify_low_visibility_papers {
            for paper in &snapshot.papers {
                let Some(age) = paper.age_years(current_year) else {
                    continue;
                };
                let count = paper.citation_count();
                if age < MIN_AGE_YEARS || count >= threshold {
                    continue;
                }
                low_visibility.push(paper.id);
                out.push(recommendation(
                    Category::Visibility,
                    Priority::High,
                    f64::from(threshold - count) + f64::from(age),
                    "Promote under-cited paper",
                    format!(
                        "Only {} citation{} after {} years.",
                        count,
                        plural(count as i64),
                        age
                    ),
                    "Share it on academic social networks, contact researchers in the field and present it at venues.",
                    Some(paper),
                ));
            }
        }

        for paper in snapshot.papers.iter().filter(|p| p.doi.is_none()) {
            out.push(recommendation(
                Category::Visibility,
                Priority::Medium,
                f64::from(paper.citation_count()) / 10.0,
                "Add a DOI",
                "The paper has no DOI, which makes it harder to find and cite.".to_string(),
                "Register a DOI through the publisher, or deposit the preprint on Zenodo.",
                Some(paper),
            ));
        }

        if snapshot.papers.is_empty() {
            return;
        }
        let average = snapshot
            .papers
            .iter()
            .map(|p| f64::from(p.citation_count()))
            .sum::<f64>()
            / snapshot.papers.len() as f64;

        for paper in &snapshot.papers {
            let count = f64::from(paper.citation_count());
            if count >= average / 2.0 || low_visibility.contains(&paper.id) {
                continue;
            }
            out.push(recommendation(
                Category::Visibility,
                Priority::Medium,
                average / 2.0 - count,
                "Lift a paper below your average",
                format!(
                    "{} citations against a portfolio average of {:.1}.",
                    count, average
                ),
                "Link it from newer work, your homepage and talks on related topics.",
                Some(paper),
            ));
        }
    }

    fn trending(&self, snapshot: &Snapshot, out: &mut Vec<Recommendation>) {
        let mut growing: Vec<(&Paper, i64)> = snapshot
            .papers
            .iter()
            .filter_map(|p| {
                let gained = p.id.and_then(|id| snapshot.growth_30d.get(&id)).copied()?;
                (gained > 0).then_some((p, gained))
            })
            .collect();
        growing.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.title.cmp(&b.0.title)));

        for (paper, gained) in growing.into_iter().take(TRENDING_PAPERS) {
            out.push(recommendation(
                Category::Trending,
                Priority::Medium,
                gained as f64,
                "Build on a paper gaining attention",
                format!("Gained {} citation{} in the last 30 days.", gained, plural(gained)),
                "Write a follow-up, share the results again or give a talk while interest is high.",
                Some(paper),
            ));
        }

        if self.settings.check_trending_topics {
            out.push(recommendation(
                Category::Trending,
                Priority::Low,
                0.0,
                "Align with current trends",
                "Work in active research areas tends to attract more attention and citations.".to_string(),
                "Follow new arXiv listings, citation alerts and recent proceedings for emerging topics.",
                None,
            ));
        }
    }
}

fn collaboration(snapshot: &Snapshot, out: &mut Vec<Recommendation>) {
    let total = snapshot.papers.len();
    if total == 0 {
        return;
    }
    let small = snapshot.papers.iter().filter(|p| p.authors.len() <= 2).count();
    let share = small as f64 / total as f64;
    if share <= SMALL_TEAM_SHARE {
        return;
    }

    out.push(recommendation(
        Category::Collaboration,
        Priority::High,
        share * 50.0,
        "Increase collaboration",
        format!(
            "{} of {} papers have at most two authors; collaborative papers tend to be cited more.",
            small, total
        ),
        "Reach out to researchers in your field, join research groups and attend workshops.",
        None,
    ));
}

fn profile(snapshot: &Snapshot, out: &mut Vec<Recommendation>) {
    if !snapshot.disabled_platforms.is_empty() {
        out.push(recommendation(
            Category::Profile,
            Priority::Medium,
            snapshot.disabled_platforms.len() as f64 * 5.0,
            "Activate more platforms",
            format!(
                "{} platform{} not tracked: {}.",
                snapshot.disabled_platforms.len(),
                plural(snapshot.disabled_platforms.len() as i64),
                snapshot.disabled_platforms.join(", ")
            ),
            "Set up the profiles and enable them in the configuration.",
            None,
        ));
    }

    let stale_before = snapshot.as_of - Duration::days(STALE_SYNC_DAYS);
    let stale: Vec<&str> = snapshot
        .enabled_platforms
        .iter()
        .filter(|id| {
            snapshot
                .sync
                .iter()
                .find(|s| &s.platform == *id)
                .map(|s| s.last_sync < stale_before)
                .unwrap_or(true)
        })
        .map(String::as_str)
        .collect();
    if !stale.is_empty() {
        out.push(recommendation(
            Category::Profile,
            Priority::Low,
            stale.len() as f64,
            "Refresh citation data",
            format!(
                "Not synced in the last {} days: {}.",
                STALE_SYNC_DAYS,
                stale.join(", ")
            ),
            "Run `elephant fetch --all` weekly.",
            None,
        ));
    }

    for platform in &snapshot.counting_platforms {
        let missing = snapshot
            .papers
            .iter()
            .filter(|p| !p.identifiers.contains_key(platform))
            .count();
        if missing == 0 {
            continue;
        }
        out.push(recommendation(
            Category::Profile,
            Priority::Low,
            missing as f64,
            "Complete your platform profile",
            format!(
                "{} paper{} missing from {}, so their citations there are not counted.",
                missing,
                plural(missing as i64),
                platform
            ),
            "Claim the missing papers on that platform or correct their metadata.",
            None,
        ));
    }
}

fn recommendation(
    category: Category,
    priority: Priority,
    impact: f64,
    title: &str,
    rationale: String,
    action: &str,
    paper: Option<&Paper>,
) -> Recommendation {
    let impact = if impact.is_finite() { impact.clamp(0.0, 99.0) } else { 0.0 };
    Recommendation {
        category,
        priority,
        score: priority.weight() * 100.0 + impact,
        title: title.to_string(),
        rationale,
        action: action.to_string(),
        paper_id: paper.and_then(|p| p.id),
        paper_title: paper.map(|p| p.title.clone()),
    }
}

fn rank(a: &Recommendation, b: &Recommendation) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.category.cmp(&b.category))
        .then_with(|| a.paper_title.cmp(&b.paper_title))
        .then_with(|| a.paper_id.cmp(&b.paper_id))
        .then_with(|| a.title.cmp(&b.title))
}

fn plural(n: i64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

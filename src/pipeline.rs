//! One fetch cycle: query adapters concurrently, reconcile, persist.
//!
//! A failing platform never aborts the cycle. Its records fetched before
//! the failure are still stored and the failure is reported per platform.
//! Only store errors stop the run.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use futures_util::StreamExt;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::models::{AuthorRef, RawRecord, SyncOutcome, SyncStatus};
use crate::reconcile::{reconcile, AmbiguousMatch};
use crate::sources::{Source, SourceError, SourceRegistry};
use crate::store::{Store, StoreError};

/// Alert type written for citation increases
pub const NEW_CITATIONS_ALERT: &str = "new_citations";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Unknown or disabled platform: {0}")]
    UnknownPlatform(String),

    #[error("No platforms are enabled; edit the configuration or run `elephant init`")]
    NoPlatforms,
}

/// Which platforms to fetch and whether to ignore the sync interval
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Platform ids; empty means every enabled platform
    pub platforms: Vec<String>,
    pub force: bool,
}

/// Per-platform result line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformReport {
    pub platform: String,
    pub name: String,
    pub outcome: SyncOutcome,
    pub records: usize,
    pub error: Option<String>,
}

/// What a fetch cycle did
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchSummary {
    pub platforms: Vec<PlatformReport>,
    pub papers_created: usize,
    pub papers_updated: usize,
    pub snapshots_appended: usize,
    pub new_citations: i64,
    pub alerts_raised: usize,
    pub conflicts: Vec<AmbiguousMatch>,
}

impl FetchSummary {
    pub fn has_failures(&self) -> bool {
        self.platforms
            .iter()
            .any(|p| matches!(p.outcome, SyncOutcome::Failed | SyncOutcome::Partial))
    }

    /// Every attempted platform failed outright
    pub fn all_failed(&self) -> bool {
        let attempted: Vec<_> = self
            .platforms
            .iter()
            .filter(|p| p.outcome != SyncOutcome::Skipped)
            .collect();
        !attempted.is_empty() && attempted.iter().all(|p| p.outcome == SyncOutcome::Failed)
    }
}

/// Records collected from one adapter, plus the error that cut it short
struct Harvest {
    source: Arc<dyn Source>,
    records: Vec<RawRecord>,
    error: Option<SourceError>,
}

impl Harvest {
    fn outcome(&self) -> SyncOutcome {
        match (&self.error, self.records.is_empty()) {
            (None, _) => SyncOutcome::Ok,
            (Some(_), false) => SyncOutcome::Partial,
            (Some(_), true) => SyncOutcome::Failed,
        }
    }
}

/// Runs fetch cycles against a registry and a store
pub struct Pipeline<'a> {
    config: &'a Config,
    registry: &'a SourceRegistry,
    store: &'a Store,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config, registry: &'a SourceRegistry, store: &'a Store) -> Self {
        Self {
            config,
            registry,
            store,
        }
    }

    /// Run one cycle stamped with the current time
    pub async fn run(&self, options: &FetchOptions) -> Result<FetchSummary, PipelineError> {
        self.run_at(options, Utc::now()).await
    }

    pub async fn run_at(
        &self,
        options: &FetchOptions,
        now: DateTime<Utc>,
    ) -> Result<FetchSummary, PipelineError> {
        let mut summary = FetchSummary::default();

        let mut due = Vec::new();
        for source in self.select_sources(options)? {
            if !options.force && self.synced_recently(source.id(), now)? {
                tracing::info!("{}: synced within the last {}h, skipping", source.name(), self.config.fetch.interval_hours);
                summary.platforms.push(PlatformReport {
                    platform: source.id().to_string(),
                    name: source.name().to_string(),
                    outcome: SyncOutcome::Skipped,
                    records: 0,
                    error: None,
                });
                continue;
            }
            due.push(source);
        }

        if due.is_empty() {
            return Ok(summary);
        }

        let author = self.config.author_ref();
        let max_records = self.config.fetch.max_records;
        let harvests = join_all(
            due.into_iter()
                .map(|source| harvest(source, &author, max_records)),
        )
        .await;

        let mut records = Vec::new();
        for harvest in harvests {
            let outcome = harvest.outcome();
            let error = harvest.error.as_ref().map(|e| e.to_string());

            match (&outcome, &error) {
                (SyncOutcome::Ok, _) => {
                    tracing::info!("{}: {} records", harvest.source.name(), harvest.records.len())
                }
                (_, Some(error)) => tracing::warn!(
                    "{}: {} after {} records",
                    harvest.source.name(),
                    error,
                    harvest.records.len()
                ),
                _ => {}
            }

            self.store.record_sync(&SyncStatus {
                platform: harvest.source.id().to_string(),
                last_sync: now,
                outcome,
                error_message: error.clone(),
            })?;

            summary.platforms.push(PlatformReport {
                platform: harvest.source.id().to_string(),
                name: harvest.source.name().to_string(),
                outcome,
                records: harvest.records.len(),
                error,
            });
            records.extend(harvest.records);
        }

        let reconciled = reconcile(records, now);
        summary.conflicts = reconciled.conflicts;

        let muted = self.muted_papers()?;
        let threshold = i64::from(self.config.alerts.min_citation_threshold.max(1));

        for paper in &reconciled.papers {
            let outcome = self.store.upsert_paper(paper, now)?;

            if outcome.created {
                summary.papers_created += 1;
            } else {
                summary.papers_updated += 1;
            }
            summary.snapshots_appended += outcome.snapshots_appended;

            let delta = outcome.total_delta();
            if delta > 0 {
                summary.new_citations += delta;
            }

            if self.config.alerts.enabled && delta >= threshold && !muted.contains(&outcome.paper_id) {
                let message = format!(
                    "'{}' gained {} citation{}",
                    paper.title,
                    delta,
                    if delta == 1 { "" } else { "s" }
                );
                self.store
                    .add_alert(Some(outcome.paper_id), NEW_CITATIONS_ALERT, &message, now)?;
                summary.alerts_raised += 1;
            }
        }

        tracing::info!(
            "Fetch complete: {} new papers, {} updated, {} snapshots",
            summary.papers_created,
            summary.papers_updated,
            summary.snapshots_appended
        );
        Ok(summary)
    }

    fn select_sources(&self, options: &FetchOptions) -> Result<Vec<Arc<dyn Source>>, PipelineError> {
        let sources: Vec<Arc<dyn Source>> = if options.platforms.is_empty() {
            self.registry.all().cloned().collect()
        } else {
            let mut seen = BTreeSet::new();
            let mut selected = Vec::new();
            for id in &options.platforms {
                let source = self
                    .registry
                    .get(id)
                    .ok_or_else(|| PipelineError::UnknownPlatform(id.clone()))?;
                if seen.insert(source.id().to_string()) {
                    selected.push(Arc::clone(source));
                }
            }
            selected
        };

        if sources.is_empty() {
            return Err(PipelineError::NoPlatforms);
        }
        Ok(sources)
    }

    /// A successful sync within the configured interval
    fn synced_recently(&self, platform: &str, now: DateTime<Utc>) -> Result<bool, PipelineError> {
        let interval = self.config.fetch.interval();
        Ok(self
            .store
            .sync_status(platform)?
            .map(|s| s.outcome == SyncOutcome::Ok && now - s.last_sync < interval)
            .unwrap_or(false))
    }

    /// Tracked papers with alerts switched off
    fn muted_papers(&self) -> Result<BTreeSet<i64>, PipelineError> {
        Ok(self
            .store
            .tracked_papers()?
            .into_iter()
            .filter(|t| !t.alert_enabled)
            .filter_map(|t| t.paper.id)
            .collect())
    }
}

/// Drain one adapter's stream up to `max_records`, keeping what arrived before an error
async fn harvest(source: Arc<dyn Source>, author: &AuthorRef, max_records: usize) -> Harvest {
    let mut records = Vec::new();
    let mut error = None;

    {
        let mut stream = source.fetch(author);
        while let Some(item) = stream.next().await {
            match item {
                Ok(record) => {
                    records.push(record);
                    if records.len() >= max_records {
                        tracing::warn!(
                            "{}: stopped at the {} record limit",
                            source.name(),
                            max_records
                        );
                        break;
                    }
                }
                Err(e) => {
                    error = Some(e);
                    break;
                }
            }
        }
    }

    Harvest {
        source,
        records,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Platform, RecordBuilder};
    use crate::sources::MockSource;

    fn at(hour: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + chrono::Duration::hours(hour)
    }

    fn registry(sources: Vec<MockSource>) -> SourceRegistry {
        let mut registry = SourceRegistry::new();
        for source in sources {
            registry.register(Arc::new(source));
        }
        registry
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_other_platforms() {
        let config = Config::default();
        let store = Store::open_in_memory().unwrap();
        let registry = registry(vec![
            MockSource::new(Platform::SemanticScholar).with_records(vec![RecordBuilder::new(
                Platform::SemanticScholar,
                "s1",
                "Paper One",
            )
            .citations(3)
            .build()]),
            MockSource::new(Platform::CrossRef)
                .with_failure(SourceError::RateLimited { retry_after: Some(2) }),
        ]);

        let summary = Pipeline::new(&config, &registry, &store)
            .run_at(&FetchOptions::default(), at(0))
            .await
            .unwrap();

        assert_eq!(summary.papers_created, 1);
        assert!(summary.has_failures());
        assert!(!summary.all_failed());

        let crossref = summary.platforms.iter().find(|p| p.platform == "crossref").unwrap();
        assert_eq!(crossref.outcome, SyncOutcome::Failed);
        assert_eq!(
            store.sync_status("crossref").unwrap().unwrap().outcome,
            SyncOutcome::Failed
        );
    }

    #[tokio::test]
    async fn test_interval_skips_unless_forced() {
        let config = Config::default();
        let store = Store::open_in_memory().unwrap();
        let source = Arc::new(MockSource::new(Platform::Arxiv));
        let mut registry = SourceRegistry::new();
        registry.register(source.clone());
        let pipeline = Pipeline::new(&config, &registry, &store);

        pipeline.run_at(&FetchOptions::default(), at(0)).await.unwrap();
        let skipped = pipeline.run_at(&FetchOptions::default(), at(1)).await.unwrap();
        assert_eq!(skipped.platforms[0].outcome, SyncOutcome::Skipped);
        assert_eq!(source.fetch_count(), 1);

        let forced = FetchOptions {
            force: true,
            ..Default::default()
        };
        pipeline.run_at(&forced, at(2)).await.unwrap();
        assert_eq!(source.fetch_count(), 2);

        pipeline.run_at(&FetchOptions::default(), at(30)).await.unwrap();
        assert_eq!(source.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_oversized_interval_does_not_panic() {
        let mut config = Config::default();
        config.fetch.interval_hours = u64::MAX;
        let store = Store::open_in_memory().unwrap();
        let source = Arc::new(MockSource::new(Platform::Arxiv));
        let mut registry = SourceRegistry::new();
        registry.register(source.clone());
        let pipeline = Pipeline::new(&config, &registry, &store);

        pipeline.run_at(&FetchOptions::default(), at(0)).await.unwrap();
        let skipped = pipeline.run_at(&FetchOptions::default(), at(5000)).await.unwrap();
        assert_eq!(skipped.platforms[0].outcome, SyncOutcome::Skipped);
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_citation_increase_raises_alert() {
        let config = Config::default();
        let store = Store::open_in_memory().unwrap();
        let source = Arc::new(MockSource::new(Platform::SemanticScholar));
        let mut registry = SourceRegistry::new();
        registry.register(source.clone());
        let pipeline = Pipeline::new(&config, &registry, &store);
        let forced = FetchOptions {
            force: true,
            ..Default::default()
        };

        let record = |count| {
            RecordBuilder::new(Platform::SemanticScholar, "s1", "Paper One")
                .doi("10.1/one")
                .citations(count)
                .build()
        };

        source.set_records(vec![record(3)]);
        let first = pipeline.run_at(&forced, at(0)).await.unwrap();
        assert_eq!(first.alerts_raised, 0);

        source.set_records(vec![record(5)]);
        let second = pipeline.run_at(&forced, at(1)).await.unwrap();
        assert_eq!(second.new_citations, 2);
        assert_eq!(second.alerts_raised, 1);

        let alerts = store.alerts(true, 10).unwrap();
        assert_eq!(alerts[0].message, "'Paper One' gained 2 citations");
        assert_eq!(alerts[0].alert_type, NEW_CITATIONS_ALERT);
    }

    #[tokio::test]
    async fn test_muted_tracked_paper_raises_no_alert() {
        let config = Config::default();
        let store = Store::open_in_memory().unwrap();
        let source = Arc::new(MockSource::new(Platform::SemanticScholar));
        let mut registry = SourceRegistry::new();
        registry.register(source.clone());
        let pipeline = Pipeline::new(&config, &registry, &store);
        let forced = FetchOptions {
            force: true,
            ..Default::default()
        };

        let record = |count| {
            RecordBuilder::new(Platform::SemanticScholar, "s1", "Quiet Paper")
                .doi("10.1/quiet")
                .citations(count)
                .build()
        };

        source.set_records(vec![record(1)]);
        pipeline.run_at(&forced, at(0)).await.unwrap();
        let id = store.find_by_doi("10.1/quiet").unwrap().unwrap().id.unwrap();
        store.track_paper(id, at(0)).unwrap();
        store.set_tracked_alerts(id, false).unwrap();

        source.set_records(vec![record(10)]);
        let summary = pipeline.run_at(&forced, at(1)).await.unwrap();
        assert_eq!(summary.new_citations, 9);
        assert_eq!(summary.alerts_raised, 0);
        assert!(store.alerts(false, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_platform_is_an_error() {
        let config = Config::default();
        let store = Store::open_in_memory().unwrap();
        let registry = registry(vec![MockSource::new(Platform::Arxiv)]);
        let options = FetchOptions {
            platforms: vec!["jstor".to_string()],
            force: false,
        };

        let err = Pipeline::new(&config, &registry, &store)
            .run_at(&options, at(0))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownPlatform(id) if id == "jstor"));
    }

    #[tokio::test]
    async fn test_max_records_caps_harvest() {
        let mut config = Config::default();
        config.fetch.max_records = 2;
        let store = Store::open_in_memory().unwrap();
        let records = (0..5)
            .map(|i| RecordBuilder::new(Platform::Arxiv, format!("{}", i), format!("Paper {}", i)).build())
            .collect();
        let registry = registry(vec![MockSource::without_counts(Platform::Arxiv).with_records(records)]);

        let summary = Pipeline::new(&config, &registry, &store)
            .run_at(&FetchOptions::default(), at(0))
            .await
            .unwrap();
        assert_eq!(summary.platforms[0].records, 2);
        assert_eq!(summary.platforms[0].outcome, SyncOutcome::Ok);
        assert_eq!(store.paper_count().unwrap(), 2);
    }
}

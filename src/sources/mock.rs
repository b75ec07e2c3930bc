//! Mock source for testing purposes.

use async_stream::stream;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::models::{AuthorRef, Platform, RawRecord, RecordBuilder};
use crate::sources::{RecordStream, Source, SourceCapabilities, SourceError};

/// A mock source that replays predefined records, optionally followed by an
/// error, so partial failures can be simulated.
#[derive(Debug)]
pub struct MockSource {
    platform: Platform,
    id: String,
    name: String,
    capabilities: SourceCapabilities,
    records: Mutex<Vec<RawRecord>>,
    failure: Mutex<Option<SourceError>>,
    fetches: AtomicUsize,
}

impl MockSource {
    /// Create a new mock for a platform; it reports citation counts
    pub fn new(platform: Platform) -> Self {
        Self {
            id: platform.id().to_string(),
            name: format!("Mock {}", platform.name()),
            platform,
            capabilities: SourceCapabilities::FETCH | SourceCapabilities::CITATION_COUNTS,
            records: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            fetches: AtomicUsize::new(0),
        }
    }

    /// A mock that does not report citation counts (like ORCID or arXiv)
    pub fn without_counts(platform: Platform) -> Self {
        let mut source = Self::new(platform);
        source.capabilities = SourceCapabilities::FETCH;
        source
    }

    /// Builder-style variant of [`MockSource::set_records`]
    pub fn with_records(self, records: Vec<RawRecord>) -> Self {
        self.set_records(records);
        self
    }

    /// Builder-style variant of [`MockSource::set_failure`]
    pub fn with_failure(self, error: SourceError) -> Self {
        self.set_failure(Some(error));
        self
    }

    /// Set the records to return.
    pub fn set_records(&self, records: Vec<RawRecord>) {
        if let Ok(mut guard) = self.records.lock() {
            *guard = records;
        }
    }

    /// Set (or clear) the error yielded after the records.
    pub fn set_failure(&self, error: Option<SourceError>) {
        if let Ok(mut guard) = self.failure.lock() {
            *guard = error;
        }
    }

    /// How many times `fetch` has been called
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> (Vec<RawRecord>, Option<SourceError>) {
        let records = self.records.lock().map(|g| g.clone()).unwrap_or_default();
        let failure = self.failure.lock().ok().and_then(|g| g.clone());
        (records, failure)
    }
}

#[async_trait]
impl Source for MockSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> Platform {
        self.platform.clone()
    }

    fn capabilities(&self) -> SourceCapabilities {
        self.capabilities
    }

    fn fetch<'a>(&'a self, _author: &'a AuthorRef) -> RecordStream<'a> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let (records, failure) = self.snapshot();

        Box::pin(stream! {
            for record in records {
                yield Ok(record);
            }
            if let Some(error) = failure {
                yield Err(error);
            }
        })
    }
}

/// Helper function to create a mock record for testing.
pub fn make_record(platform: Platform, platform_id: &str, title: &str) -> RawRecord {
    RecordBuilder::new(platform, platform_id, title).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_mock_replays_records_then_error() {
        let source = MockSource::new(Platform::SemanticScholar)
            .with_records(vec![make_record(Platform::SemanticScholar, "a", "A")])
            .with_failure(SourceError::RateLimited { retry_after: None });

        let author = AuthorRef::new("Someone");
        let items: Vec<_> = source.fetch(&author).collect().await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
        assert_eq!(source.fetch_count(), 1);
    }

    #[test]
    fn test_without_counts() {
        let source = MockSource::without_counts(Platform::Orcid);
        assert!(!source.reports_citations());
        assert_eq!(source.id(), "orcid");
    }
}

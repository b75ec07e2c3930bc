//! Registry of the platform adapters selected by configuration.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{
    arxiv::ArxivSource, crossref::CrossRefSource, google_scholar::GoogleScholarSource,
    orcid::OrcidSource, semantic::SemanticScholarSource, Source, SourceError, SourceOptions,
};
use crate::config::Config;
use crate::models::Platform;
use crate::utils::HttpClient;

bitflags::bitflags! {
    /// Capabilities that a source can support
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SourceCapabilities: u32 {
        const FETCH = 1 << 0;
        const CITATION_COUNTS = 1 << 1;
        const DOI_LOOKUP = 1 << 2;
        const AUTHOR_LOOKUP = 1 << 3;
    }
}

/// Registry of active platform adapters, keyed by platform id
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: BTreeMap<String, Arc<dyn Source>>,
}

impl SourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one adapter per enabled platform in the configuration.
    ///
    /// Enabled platforms without a built-in adapter are logged and skipped.
    pub fn from_config(config: &Config) -> Result<Self, SourceError> {
        let http = HttpClient::new(config.fetch.request_timeout(), config.fetch.connect_timeout())?;
        let retry = config.retry_config();
        let mut registry = Self::new();

        for (id, settings) in config.platforms.iter().filter(|(_, p)| p.enabled) {
            let mut options = SourceOptions::new(http.clone(), retry).page_size(config.fetch.page_size);
            options.page_delay = config.fetch.page_delay();
            options.api_key = settings.api_key.clone().filter(|k| !k.trim().is_empty());
            options.base_url = settings.base_url.clone();

            match Self::build(&Platform::from_id(id), options) {
                Some(source) => registry.register(source),
                None => tracing::warn!("No adapter available for platform '{}'", id),
            }
        }

        Ok(registry)
    }

    /// Construct the built-in adapter for a platform
    pub fn build(platform: &Platform, options: SourceOptions) -> Option<Arc<dyn Source>> {
        let source: Arc<dyn Source> = match platform {
            Platform::Orcid => Arc::new(OrcidSource::new(options)),
            Platform::SemanticScholar => Arc::new(SemanticScholarSource::new(options)),
            Platform::Arxiv => Arc::new(ArxivSource::new(options)),
            Platform::CrossRef => Arc::new(CrossRefSource::new(options)),
            Platform::GoogleScholar => Arc::new(GoogleScholarSource::new(options)),
            Platform::Other(_) => return None,
        };
        Some(source)
    }

    /// Register a new source
    pub fn register(&mut self, source: Arc<dyn Source>) {
        self.sources.insert(source.id().to_string(), source);
    }

    /// Get a source by id or alias (`"semantic"`, `"scholar"`, ...)
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Source>> {
        self.sources
            .get(id)
            .or_else(|| self.sources.get(Platform::from_id(id).id()))
    }

    /// Get a source by id, returning an error if not found
    pub fn get_required(&self, id: &str) -> Result<&Arc<dyn Source>, SourceError> {
        self.get(id).ok_or_else(|| {
            SourceError::NotConfigured(format!("Platform '{}' is not enabled", id))
        })
    }

    /// All registered sources, ordered by id
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Source>> {
        self.sources.values()
    }

    /// Get all source IDs
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(|s| s.as_str())
    }

    /// Get sources that support a specific capability
    pub fn with_capability(&self, capability: SourceCapabilities) -> Vec<&Arc<dyn Source>> {
        self.all()
            .filter(|s| s.capabilities().contains(capability))
            .collect()
    }

    /// Sources that can look up a record by DOI
    pub fn doi_lookup(&self) -> Vec<&Arc<dyn Source>> {
        self.with_capability(SourceCapabilities::DOI_LOOKUP)
    }

    /// Check if a source exists
    pub fn has(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Get the number of registered sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

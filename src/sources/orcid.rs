//! ORCID adapter.
//!
//! Reads the public API v3.0 works summary (`/{orcid}/works`). ORCID returns
//! every work group in one document and carries no citation counts. Work
//! summaries do not list co-authors, so records carry the profile owner only.

use async_stream::stream;
use async_trait::async_trait;
use serde::Deserialize;

use crate::models::{AuthorRef, Platform, RawRecord, RecordBuilder};
use crate::sources::{RecordStream, Source, SourceError, SourceOptions};
use crate::utils::with_retry;

const ORCID_API_BASE: &str = "https://pub.orcid.org/v3.0";

/// ORCID source
#[derive(Debug, Clone)]
pub struct OrcidSource {
    options: SourceOptions,
    base_url: String,
}

impl OrcidSource {
    pub fn new(options: SourceOptions) -> Self {
        let base_url = options.base_url_or(ORCID_API_BASE);
        Self { options, base_url }
    }

    async fn fetch_works(&self, orcid: &str) -> Result<WorksResponse, SourceError> {
        let http = self.options.http.clone();
        let url = format!("{}/{}/works", self.base_url, orcid);

        with_retry(self.options.retry, || {
            let http = http.clone();
            let url = url.clone();
            async move {
                http.send_json(http.get(&url).header("Accept", "application/json"))
                    .await
            }
        })
        .await
    }

    fn parse_group(group: WorkGroup, owner: &str) -> Option<RawRecord> {
        let summary = group.work_summary.into_iter().next()?;
        let title = summary
            .title
            .and_then(|t| t.title)
            .map(|v| v.value)
            .filter(|t| !t.trim().is_empty())?;

        let mut ids = group.external_ids.external_id;
        if let Some(own) = summary.external_ids {
            ids.extend(own.external_id);
        }
        let doi = ids
            .iter()
            .find(|id| id.id_type.eq_ignore_ascii_case("doi"))
            .map(|id| id.value.clone());
        let arxiv = ids
            .iter()
            .find(|id| id.id_type.eq_ignore_ascii_case("arxiv"))
            .map(|id| id.value.clone());

        let year = summary
            .publication_date
            .and_then(|d| d.year)
            .and_then(|y| y.value.trim().parse().ok());

        let mut builder = RecordBuilder::new(Platform::Orcid, summary.put_code.to_string(), title)
            .authors([owner])
            .maybe_year(year);

        if let Some(doi) = doi {
            builder = builder.doi(doi);
        }
        if let Some(arxiv) = arxiv {
            builder = builder.arxiv_id(arxiv);
        }
        if let Some(journal) = summary.journal_title {
            builder = builder.venue(journal.value);
        }
        if let Some(url) = summary.url {
            builder = builder.url(url.value);
        }

        Some(builder.build())
    }
}

impl Default for OrcidSource {
    fn default() -> Self {
        Self::new(SourceOptions::default())
    }
}

#[async_trait]
impl Source for OrcidSource {
    fn id(&self) -> &str {
        "orcid"
    }

    fn name(&self) -> &str {
        "ORCID"
    }

    fn platform(&self) -> Platform {
        Platform::Orcid
    }

    fn fetch<'a>(&'a self, author: &'a AuthorRef) -> RecordStream<'a> {
        Box::pin(stream! {
            let Some(orcid) = author.orcid.as_deref() else {
                yield Err(SourceError::NotConfigured("ORCID iD not set (user.orcid)".to_string()));
                return;
            };

            match self.fetch_works(orcid).await {
                Ok(works) => {
                    for group in works.group {
                        if let Some(record) = Self::parse_group(group, &author.name) {
                            yield Ok(record);
                        }
                    }
                }
                Err(e) => yield Err(e),
            }
        })
    }
}

// ===== ORCID API Types =====

#[derive(Debug, Deserialize)]
struct WorksResponse {
    #[serde(default)]
    group: Vec<WorkGroup>,
}

#[derive(Debug, Deserialize)]
struct WorkGroup {
    #[serde(rename = "external-ids", default)]
    external_ids: ExternalIds,
    #[serde(rename = "work-summary", default)]
    work_summary: Vec<WorkSummary>,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalIds {
    #[serde(rename = "external-id", default)]
    external_id: Vec<ExternalId>,
}

#[derive(Debug, Deserialize)]
struct ExternalId {
    #[serde(rename = "external-id-type")]
    id_type: String,
    #[serde(rename = "external-id-value")]
    value: String,
}

#[derive(Debug, Deserialize)]
struct WorkSummary {
    #[serde(rename = "put-code")]
    put_code: u64,
    title: Option<WorkTitle>,
    #[serde(rename = "external-ids")]
    external_ids: Option<ExternalIds>,
    #[serde(rename = "publication-date")]
    publication_date: Option<PublicationDate>,
    #[serde(rename = "journal-title")]
    journal_title: Option<Value>,
    url: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WorkTitle {
    title: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PublicationDate {
    year: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Value {
    value: String,
}

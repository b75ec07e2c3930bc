//! Semantic Scholar adapter.
//!
//! Uses the Graph API: `/author/{id}/papers` with offset paging. When no
//! author id is configured the author is resolved with `/author/search`.

use async_stream::stream;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::models::{AuthorRef, Platform, RawRecord, RecordBuilder};
use crate::sources::{RecordStream, Source, SourceCapabilities, SourceError, SourceOptions};
use crate::utils::with_retry;

const SEMANTIC_API_BASE: &str = "https://api.semanticscholar.org/graph/v1";

const PAPER_FIELDS: &str = "title,year,venue,authors,externalIds,citationCount,url";

/// Semantic Scholar source
#[derive(Debug, Clone)]
pub struct SemanticScholarSource {
    options: SourceOptions,
    base_url: String,
}

impl SemanticScholarSource {
    pub fn new(options: SourceOptions) -> Self {
        let base_url = options.base_url_or(SEMANTIC_API_BASE);
        Self { options, base_url }
    }

    /// GET a JSON document, retrying rate limits and timeouts
    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, SourceError> {
        let http = self.options.http.clone();
        let api_key = self.options.api_key.clone();

        with_retry(self.options.retry, || {
            let http = http.clone();
            let url = url.clone();
            let api_key = api_key.clone();
            async move {
                let mut request = http.get(&url);
                if let Some(key) = api_key {
                    request = request.header("x-api-key", key);
                }
                http.send_json(request).await
            }
        })
        .await
    }

    /// Configured author id, else the best match of a name search
    async fn resolve_author(&self, author: &AuthorRef) -> Result<String, SourceError> {
        if let Some(id) = author.id_for(&Platform::SemanticScholar) {
            return Ok(id.to_string());
        }
        if author.name.trim().is_empty() {
            return Err(SourceError::NotConfigured(
                "Semantic Scholar needs an author_id or a user name".to_string(),
            ));
        }

        let url = format!(
            "{}/author/search?query={}&limit=1",
            self.base_url,
            urlencoding::encode(author.name.trim())
        );
        let found: AuthorSearchResponse = self.get_json(url).await?;
        let id = found
            .data
            .into_iter()
            .find_map(|a| a.author_id)
            .ok_or_else(|| SourceError::NotFound(format!("Author '{}' not found", author.name)))?;

        tracing::debug!("Resolved Semantic Scholar author '{}' to {}", author.name, id);
        Ok(id)
    }

    fn papers_url(&self, author_id: &str, offset: usize) -> String {
        format!(
            "{}/author/{}/papers?fields={}&offset={}&limit={}",
            self.base_url,
            urlencoding::encode(author_id),
            PAPER_FIELDS,
            offset,
            self.options.page_size
        )
    }

    fn parse_paper(data: S2Paper) -> Option<RawRecord> {
        let title = data.title.filter(|t| !t.trim().is_empty())?;
        let paper_id = data.paper_id?;
        let ids = data.external_ids.unwrap_or_default();

        let mut builder = RecordBuilder::new(Platform::SemanticScholar, paper_id, title)
            .authors(data.authors.into_iter().filter_map(|a| a.name))
            .maybe_year(data.year)
            .maybe_citations(data.citation_count);

        if let Some(doi) = ids.doi {
            builder = builder.doi(doi);
        }
        if let Some(arxiv) = ids.arxiv {
            builder = builder.arxiv_id(arxiv);
        }
        if let Some(venue) = data.venue {
            builder = builder.venue(venue);
        }
        if let Some(url) = data.url {
            builder = builder.url(url);
        }

        Some(builder.build())
    }
}

impl Default for SemanticScholarSource {
    fn default() -> Self {
        Self::new(SourceOptions::default())
    }
}

#[async_trait]
impl Source for SemanticScholarSource {
    fn id(&self) -> &str {
        "semantic_scholar"
    }

    fn name(&self) -> &str {
        "Semantic Scholar"
    }

    fn platform(&self) -> Platform {
        Platform::SemanticScholar
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::FETCH
            | SourceCapabilities::CITATION_COUNTS
            | SourceCapabilities::DOI_LOOKUP
            | SourceCapabilities::AUTHOR_LOOKUP
    }

    fn fetch<'a>(&'a self, author: &'a AuthorRef) -> RecordStream<'a> {
        Box::pin(stream! {
            let author_id = match self.resolve_author(author).await {
                Ok(id) => id,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut offset = 0usize;
            loop {
                let page: PapersResponse = match self.get_json(self.papers_url(&author_id, offset)).await {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                let received = page.data.len();
                for paper in page.data {
                    if let Some(record) = Self::parse_paper(paper) {
                        yield Ok(record);
                    }
                }

                match page.next {
                    Some(next) if received > 0 && next > offset => offset = next,
                    _ => break,
                }
                self.options.pause().await;
            }
        })
    }

    async fn lookup_doi(&self, doi: &str) -> Result<RawRecord, SourceError> {
        let url = format!(
            "{}/paper/DOI:{}?fields={}",
            self.base_url,
            urlencoding::encode(doi),
            PAPER_FIELDS
        );
        let paper: S2Paper = self.get_json(url).await?;
        Self::parse_paper(paper)
            .ok_or_else(|| SourceError::Parse(format!("Incomplete record for DOI {}", doi)))
    }
}

// ===== Semantic Scholar API Types =====

#[derive(Debug, Deserialize)]
struct AuthorSearchResponse {
    #[serde(default)]
    data: Vec<S2Author>,
}

#[derive(Debug, Deserialize)]
struct PapersResponse {
    #[serde(default)]
    next: Option<usize>,
    #[serde(default)]
    data: Vec<S2Paper>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Paper {
    paper_id: Option<String>,
    title: Option<String>,
    year: Option<i32>,
    venue: Option<String>,
    #[serde(default)]
    authors: Vec<S2Author>,
    external_ids: Option<S2ExternalIds>,
    citation_count: Option<u32>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Author {
    author_id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct S2ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "ArXiv")]
    arxiv: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::RetryConfig;
    use futures_util::StreamExt;
    use mockito::Matcher;

    fn source(server: &mockito::Server) -> SemanticScholarSource {
        let mut options = SourceOptions::default().base_url(server.url()).page_size(2);
        options.retry = RetryConfig::immediate(2);
        SemanticScholarSource::new(options)
    }

    #[tokio::test]
    async fn test_fetch_pages_until_exhausted() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/author/42/papers")
            .match_query(Matcher::UrlEncoded("offset".into(), "0".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"offset":0,"next":2,"data":[
                    {"paperId":"p1","title":"First","year":2020,"venue":"NeurIPS",
                     "authors":[{"authorId":"42","name":"Ada Lovelace"}],
                     "externalIds":{"DOI":"10.1/First","ArXiv":"2001.00001"},"citationCount":5},
                    {"paperId":"p2","title":"Second","year":2021,"authors":[],"citationCount":0}
                ]}"#,
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", "/author/42/papers")
            .match_query(Matcher::UrlEncoded("offset".into(), "2".into()))
            .with_status(200)
            .with_body(r#"{"offset":2,"data":[{"paperId":"p3","title":"Third","citationCount":1}]}"#)
            .create_async()
            .await;

        let author = AuthorRef::new("Ada Lovelace").platform_id(&Platform::SemanticScholar, "42");
        let source = source(&server);
        let records: Vec<_> = source.fetch(&author).collect().await;

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(records.len(), 3);

        let first = records[0].as_ref().unwrap();
        assert_eq!(first.platform_id, "p1");
        assert_eq!(first.doi.as_deref(), Some("10.1/First"));
        assert_eq!(first.arxiv_id.as_deref(), Some("2001.00001"));
        assert_eq!(first.citations, Some(5));
        assert_eq!(first.authors, vec!["Ada Lovelace"]);
    }

    #[tokio::test]
    async fn test_fetch_resolves_author_by_name() {
        let mut server = mockito::Server::new_async().await;
        let search = server
            .mock("GET", "/author/search")
            .match_query(Matcher::UrlEncoded("query".into(), "Ada Lovelace".into()))
            .with_status(200)
            .with_body(r#"{"data":[{"authorId":"777","name":"Ada Lovelace"}]}"#)
            .create_async()
            .await;
        let papers = server
            .mock("GET", "/author/777/papers")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"offset":0,"data":[]}"#)
            .create_async()
            .await;

        let author = AuthorRef::new("Ada Lovelace");
        let source = source(&server);
        let records: Vec<_> = source.fetch(&author).collect().await;

        search.assert_async().await;
        papers.assert_async().await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_surfaces_after_retries() {
        let mut server = mockito::Server::new_async().await;
        let limited = server
            .mock("GET", "/author/42/papers")
            .match_query(Matcher::Any)
            .with_status(429)
            .expect(2)
            .create_async()
            .await;

        let author = AuthorRef::new("Ada").platform_id(&Platform::SemanticScholar, "42");
        let source = source(&server);
        let records: Vec<_> = source.fetch(&author).collect().await;

        limited.assert_async().await;
        assert_eq!(records.len(), 1);
        assert!(matches!(
            records[0],
            Err(SourceError::RateLimited { .. })
        ));
    }

    #[tokio::test]
    async fn test_lookup_doi() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/paper/DOI:10.1%2Fx")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"paperId":"px","title":"Looked Up","externalIds":{"DOI":"10.1/x"},"citationCount":9}"#)
            .create_async()
            .await;

        let source = source(&server);
        let record = source.lookup_doi("10.1/x").await.unwrap();
        assert_eq!(record.title, "Looked Up");
        assert_eq!(record.citations, Some(9));
    }

    #[test]
    fn test_parse_paper_requires_title() {
        let paper = S2Paper {
            paper_id: Some("p".into()),
            title: Some("  ".into()),
            year: None,
            venue: None,
            authors: vec![],
            external_ids: None,
            citation_count: None,
            url: None,
        };
        assert!(SemanticScholarSource::parse_paper(paper).is_none());
    }

    #[test]
    fn test_parse_paper_without_count_has_no_citations() {
        let paper = S2Paper {
            paper_id: Some("p".into()),
            title: Some("A Title".into()),
            year: Some(2020),
            venue: None,
            authors: vec![],
            external_ids: None,
            citation_count: None,
            url: None,
        };
        let record = SemanticScholarSource::parse_paper(paper).unwrap();
        assert_eq!(record.citations, None);
    }
}

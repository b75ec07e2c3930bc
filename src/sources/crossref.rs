//! CrossRef adapter.
//!
//! Lists works by ORCID with cursor paging (`/works?filter=orcid:...&cursor=*`)
//! and resolves single DOIs with `/works/{doi}`. CrossRef reports
//! `is-referenced-by-count`, which is used as the citation count.

use async_stream::stream;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::models::{AuthorRef, Platform, RawRecord, RecordBuilder};
use crate::sources::{RecordStream, Source, SourceCapabilities, SourceError, SourceOptions};
use crate::utils::with_retry;

const CROSSREF_API_BASE: &str = "https://api.crossref.org";

/// CrossRef source
#[derive(Debug, Clone)]
pub struct CrossRefSource {
    options: SourceOptions,
    base_url: String,
}

impl CrossRefSource {
    pub fn new(options: SourceOptions) -> Self {
        let base_url = options.base_url_or(CROSSREF_API_BASE);
        Self { options, base_url }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, SourceError> {
        let http = self.options.http.clone();
        with_retry(self.options.retry, || {
            let http = http.clone();
            let url = url.clone();
            async move { http.send_json(http.get(&url)).await }
        })
        .await
    }

    fn works_url(&self, orcid: &str, cursor: &str) -> String {
        format!(
            "{}/works?filter=orcid:{}&rows={}&cursor={}",
            self.base_url,
            urlencoding::encode(orcid),
            self.options.page_size,
            urlencoding::encode(cursor)
        )
    }

    fn parse_item(item: CRItem) -> Option<RawRecord> {
        let title = item
            .title
            .into_iter()
            .find(|t| !t.trim().is_empty())?;
        let doi = item.doi?;

        let authors = item.author.into_iter().filter_map(|a| match (a.given, a.family) {
            (Some(given), Some(family)) => Some(format!("{} {}", given, family)),
            (None, Some(family)) => Some(family),
            (given, None) => given.or(a.name),
        });

        let year = item
            .issued
            .and_then(|d| d.date_parts.into_iter().next())
            .and_then(|parts| parts.into_iter().next())
            .flatten();

        let mut builder = RecordBuilder::new(Platform::CrossRef, doi.clone(), title)
            .authors(authors)
            .doi(doi)
            .maybe_year(year)
            .maybe_citations(item.is_referenced_by_count);

        if let Some(venue) = item.container_title.into_iter().next() {
            builder = builder.venue(venue);
        }
        if let Some(url) = item.url {
            builder = builder.url(url);
        }

        Some(builder.build())
    }
}

impl Default for CrossRefSource {
    fn default() -> Self {
        Self::new(SourceOptions::default())
    }
}

#[async_trait]
impl Source for CrossRefSource {
    fn id(&self) -> &str {
        "crossref"
    }

    fn name(&self) -> &str {
        "CrossRef"
    }

    fn platform(&self) -> Platform {
        Platform::CrossRef
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::FETCH
            | SourceCapabilities::CITATION_COUNTS
            | SourceCapabilities::DOI_LOOKUP
    }

    fn fetch<'a>(&'a self, author: &'a AuthorRef) -> RecordStream<'a> {
        Box::pin(stream! {
            let Some(orcid) = author.orcid.clone() else {
                yield Err(SourceError::NotConfigured(
                    "CrossRef lists works by ORCID; set user.orcid".to_string(),
                ));
                return;
            };

            let mut cursor = "*".to_string();
            loop {
                let page: CRListResponse = match self.get_json(self.works_url(&orcid, &cursor)).await {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                let received = page.message.items.len();
                for item in page.message.items {
                    if let Some(record) = Self::parse_item(item) {
                        yield Ok(record);
                    }
                }

                match page.message.next_cursor {
                    Some(next) if received > 0 && next != cursor => cursor = next,
                    _ => break,
                }
                self.options.pause().await;
            }
        })
    }

    async fn lookup_doi(&self, doi: &str) -> Result<RawRecord, SourceError> {
        let url = format!("{}/works/{}", self.base_url, urlencoding::encode(doi));
        let data: CRItemResponse = self.get_json(url).await?;
        Self::parse_item(data.message)
            .ok_or_else(|| SourceError::Parse(format!("Incomplete record for DOI {}", doi)))
    }
}

// ===== CrossRef API Types =====

#[derive(Debug, Deserialize)]
struct CRListResponse {
    message: CRListMessage,
}

#[derive(Debug, Deserialize)]
struct CRListMessage {
    #[serde(default)]
    items: Vec<CRItem>,
    #[serde(rename = "next-cursor")]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CRItemResponse {
    message: CRItem,
}

#[derive(Debug, Deserialize)]
struct CRItem {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(default)]
    title: Vec<String>,
    #[serde(default)]
    author: Vec<CRAuthor>,
    #[serde(rename = "container-title", default)]
    container_title: Vec<String>,
    #[serde(rename = "is-referenced-by-count")]
    is_referenced_by_count: Option<u32>,
    issued: Option<CRDate>,
    #[serde(rename = "URL")]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CRAuthor {
    given: Option<String>,
    family: Option<String>,
    /// Organisational authors carry only a name
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CRDate {
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<Option<i32>>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::RetryConfig;
    use futures_util::StreamExt;
    use mockito::Matcher;

    fn source(server: &mockito::Server) -> CrossRefSource {
        let mut options = SourceOptions::default().base_url(server.url()).page_size(2);
        options.retry = RetryConfig::immediate(1);
        CrossRefSource::new(options)
    }

    #[tokio::test]
    async fn test_fetch_follows_cursor() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/works")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("filter".into(), "orcid:0000-0002-1825-0097".into()),
                Matcher::UrlEncoded("cursor".into(), "*".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":"ok","message":{"next-cursor":"abc","items":[
                    {"DOI":"10.1/X","title":["Deep Learning Survey"],
                     "author":[{"given":"Ada","family":"Lovelace"},{"name":"ACME Consortium"}],
                     "container-title":["Journal of Tests"],"is-referenced-by-count":7,
                     "issued":{"date-parts":[[2019,5,1]]},"URL":"https://doi.org/10.1/X"}
                ]}}"#,
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", "/works")
            .match_query(Matcher::UrlEncoded("cursor".into(), "abc".into()))
            .with_status(200)
            .with_body(r#"{"status":"ok","message":{"next-cursor":"def","items":[]}}"#)
            .create_async()
            .await;

        let author = AuthorRef::new("Ada Lovelace").orcid("0000-0002-1825-0097");
        let source = source(&server);
        let records: Vec<_> = source.fetch(&author).collect().await;

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(records.len(), 1);

        let record = records[0].as_ref().unwrap();
        assert_eq!(record.doi.as_deref(), Some("10.1/X"));
        assert_eq!(record.authors, vec!["Ada Lovelace", "ACME Consortium"]);
        assert_eq!(record.venue.as_deref(), Some("Journal of Tests"));
        assert_eq!(record.year, Some(2019));
        assert_eq!(record.citations, Some(7));
    }

    #[tokio::test]
    async fn test_fetch_without_orcid() {
        let source = CrossRefSource::default();
        let author = AuthorRef::new("Ada Lovelace");
        let records: Vec<_> = source.fetch(&author).collect().await;
        assert_eq!(records.len(), 1);
        assert!(matches!(records[0], Err(SourceError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_lookup_doi() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/works/10.1%2Fx")
            .with_status(200)
            .with_body(r#"{"message":{"DOI":"10.1/x","title":["Tracked"],"is-referenced-by-count":3}}"#)
            .create_async()
            .await;

        let record = source(&server).lookup_doi("10.1/x").await.unwrap();
        assert_eq!(record.title, "Tracked");
        assert_eq!(record.citations, Some(3));
    }

    #[tokio::test]
    async fn test_lookup_doi_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/works/10.1%2Fmissing")
            .with_status(404)
            .create_async()
            .await;

        let result = source(&server).lookup_doi("10.1/missing").await;
        assert!(matches!(result, Err(SourceError::NotFound(_))));
    }

    #[test]
    fn test_parse_item_without_count_has_no_citations() {
        let item: CRItem =
            serde_json::from_str(r#"{"DOI":"10.1/y","title":["Uncounted"]}"#).unwrap();
        let record = CrossRefSource::parse_item(item).unwrap();
        assert_eq!(record.citations, None);

        let counted: CRItem =
            serde_json::from_str(r#"{"DOI":"10.1/y","title":["Counted"],"is-referenced-by-count":0}"#)
                .unwrap();
        assert_eq!(CrossRefSource::parse_item(counted).unwrap().citations, Some(0));
    }
}

//! arXiv adapter.
//!
//! Queries the Atom API with `search_query=au:"<name>"` and pages with
//! `start`. arXiv does not report citation counts.

use async_stream::stream;
use async_trait::async_trait;
use chrono::Datelike;
use feed_rs::parser;

use crate::models::identifiers::normalize_arxiv;
use crate::models::{AuthorRef, Platform, RawRecord, RecordBuilder};
use crate::sources::{RecordStream, Source, SourceCapabilities, SourceError, SourceOptions};
use crate::utils::with_retry;

/// Base URL for arXiv API
const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";

/// arXiv rejects pages larger than this
const MAX_PAGE_SIZE: u32 = 200;

/// arXiv source
#[derive(Debug, Clone)]
pub struct ArxivSource {
    options: SourceOptions,
    base_url: String,
}

impl ArxivSource {
    pub fn new(options: SourceOptions) -> Self {
        let base_url = options.base_url_or(ARXIV_API_URL);
        Self { options, base_url }
    }

    /// Parse an arXiv ID from various formats
    ///
    /// Handles formats like:
    /// - "2301.12345"
    /// - "2301.12345v1" (version is stripped)
    /// - "arxiv:2301.12345"
    /// - "https://arxiv.org/abs/2301.12345v1"
    /// - "math.GT/0104020" (old style)
    pub fn parse_id(id: &str) -> Result<String, SourceError> {
        normalize_arxiv(id).ok_or_else(|| SourceError::InvalidRequest("Empty arXiv ID".to_string()))
    }

    fn page_url(&self, author: &str, start: usize, page_size: u32) -> String {
        let query = format!("au:\"{}\"", author);
        format!(
            "{}?search_query={}&start={}&max_results={}&sortBy=submittedDate&sortOrder=descending",
            self.base_url,
            urlencoding::encode(&query),
            start,
            page_size
        )
    }

    async fn fetch_page(&self, url: String) -> Result<Vec<RawRecord>, SourceError> {
        let http = self.options.http.clone();
        let body = with_retry(self.options.retry, || {
            let http = http.clone();
            let url = url.clone();
            async move {
                http.send_text(http.get(&url).header("Accept", "application/atom+xml"))
                    .await
            }
        })
        .await?;

        Self::parse_feed(&body)
    }

    /// Parse an Atom feed page into records
    fn parse_feed(body: &str) -> Result<Vec<RawRecord>, SourceError> {
        let feed = parser::parse(body.trim().as_bytes())
            .map_err(|e| SourceError::Parse(format!("Failed to parse Atom feed: {}", e)))?;

        Ok(feed.entries.iter().filter_map(Self::parse_entry).collect())
    }

    /// Parse arXiv Atom feed entry into a record
    fn parse_entry(entry: &feed_rs::model::Entry) -> Option<RawRecord> {
        let paper_id = Self::parse_id(&entry.id).ok()?;

        let title = entry
            .title
            .as_ref()
            .map(|t| t.content.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|t| !t.is_empty())?;

        // arXiv publishes the journal DOI as a link titled "doi"
        let doi = entry
            .links
            .iter()
            .find(|l| l.title.as_deref() == Some("doi"))
            .map(|l| l.href.clone());

        let mut builder = RecordBuilder::new(Platform::Arxiv, paper_id.clone(), title)
            .authors(entry.authors.iter().map(|a| a.name.clone()))
            .arxiv_id(paper_id.clone())
            .maybe_year(entry.published.map(|d| d.year()))
            .venue("arXiv")
            .url(format!("https://arxiv.org/abs/{}", paper_id));

        if let Some(doi) = doi {
            builder = builder.doi(doi);
        }

        Some(builder.build())
    }
}

impl Default for ArxivSource {
    fn default() -> Self {
        Self::new(SourceOptions::default())
    }
}

#[async_trait]
impl Source for ArxivSource {
    fn id(&self) -> &str {
        "arxiv"
    }

    fn name(&self) -> &str {
        "arXiv"
    }

    fn platform(&self) -> Platform {
        Platform::Arxiv
    }

    fn fetch<'a>(&'a self, author: &'a AuthorRef) -> RecordStream<'a> {
        Box::pin(stream! {
            let name = author
                .id_for(&Platform::Arxiv)
                .unwrap_or(author.name.as_str())
                .trim()
                .to_string();
            if name.is_empty() {
                yield Err(SourceError::NotConfigured(
                    "arXiv needs a user name to search by author".to_string(),
                ));
                return;
            }

            let page_size = self.options.page_size.min(MAX_PAGE_SIZE);
            let mut start = 0usize;
            loop {
                let records = match self.fetch_page(self.page_url(&name, start, page_size)).await {
                    Ok(records) => records,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                let received = records.len();
                for record in records {
                    yield Ok(record);
                }

                if received < page_size as usize {
                    break;
                }
                start += received;
                self.options.pause().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::RetryConfig;
    use futures_util::StreamExt;
    use mockito::Matcher;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>arXiv Query Results</title>
  <id>http://arxiv.org/api/query</id>
  <updated>2024-01-01T00:00:00Z</updated>
  <entry>
    <id>http://arxiv.org/abs/2301.12345v2</id>
    <updated>2023-02-01T10:00:00Z</updated>
    <published>2023-01-15T10:00:00Z</published>
    <title>Deep Learning
      Survey</title>
    <summary>Abstract</summary>
    <author><name>Ada Lovelace</name></author>
    <author><name>Charles Babbage</name></author>
    <link href="http://arxiv.org/abs/2301.12345v2" rel="alternate" type="text/html"/>
    <link title="doi" href="http://dx.doi.org/10.1234/dls" rel="related"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2302.00001v1</id>
    <updated>2023-02-01T10:00:00Z</updated>
    <published>2022-12-30T10:00:00Z</published>
    <title>Second Preprint</title>
    <summary>Abstract</summary>
    <author><name>Ada Lovelace</name></author>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_id() {
        assert_eq!(ArxivSource::parse_id("2301.12345").unwrap(), "2301.12345");
        assert_eq!(
            ArxivSource::parse_id("arxiv:2301.12345").unwrap(),
            "2301.12345"
        );
        assert_eq!(
            ArxivSource::parse_id("https://arxiv.org/abs/2301.12345v1").unwrap(),
            "2301.12345"
        );
        assert_eq!(ArxivSource::parse_id("2301.12345v2").unwrap(), "2301.12345");
        assert_eq!(
            ArxivSource::parse_id("ARXIV:2301.12345").unwrap(),
            "2301.12345"
        );
        assert_eq!(
            ArxivSource::parse_id("https://arxiv.org/abs/math.GT/0104020v1").unwrap(),
            "math.gt/0104020"
        );
        assert!(ArxivSource::parse_id("").is_err());
    }

    #[test]
    fn test_parse_feed() {
        let records = ArxivSource::parse_feed(FEED).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.platform_id, "2301.12345");
        assert_eq!(first.title, "Deep Learning Survey");
        assert_eq!(first.authors, vec!["Ada Lovelace", "Charles Babbage"]);
        assert_eq!(first.doi.as_deref(), Some("http://dx.doi.org/10.1234/dls"));
        assert_eq!(first.year, Some(2023));
        assert_eq!(first.citations, None);

        assert!(records[1].doi.is_none());
    }

    #[tokio::test]
    async fn test_fetch_stops_on_short_page() {
        let mut server = mockito::Server::new_async().await;
        let page = server
            .mock("GET", "/")
            .match_query(Matcher::UrlEncoded("start".into(), "0".into()))
            .with_status(200)
            .with_header("content-type", "application/atom+xml")
            .with_body(FEED)
            .expect(1)
            .create_async()
            .await;

        let mut options = SourceOptions::default().base_url(server.url()).page_size(10);
        options.retry = RetryConfig::immediate(1);
        let source = ArxivSource::new(options);

        let author = AuthorRef::new("Ada Lovelace");
        let records: Vec<_> = source.fetch(&author).collect().await;

        page.assert_async().await;
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_fetch_requires_name() {
        let source = ArxivSource::default();
        let author = AuthorRef::default();
        let records: Vec<_> = source.fetch(&author).collect().await;
        assert!(matches!(records[0], Err(SourceError::NotConfigured(_))));
    }
}

//! Google Scholar adapter.
//!
//! Google Scholar has no public API. This adapter scrapes the public profile
//! page (`/citations?user=ID`), paging with `cstart`. It requires a configured
//! profile id and ships disabled; scraping may violate Google's Terms of
//! Service and is frequently blocked with a CAPTCHA.

use async_stream::stream;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use crate::models::{AuthorRef, Platform, RawRecord, RecordBuilder};
use crate::sources::{RecordStream, Source, SourceCapabilities, SourceError, SourceOptions};
use crate::utils::with_retry;

const GOOGLE_SCHOLAR_URL: &str = "https://scholar.google.com";

/// Largest page the profile view serves
const MAX_PAGE_SIZE: u32 = 100;

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko)";

/// Google Scholar profile scraper
#[derive(Debug, Clone)]
pub struct GoogleScholarSource {
    options: SourceOptions,
    base_url: String,
}

impl GoogleScholarSource {
    pub fn new(options: SourceOptions) -> Self {
        let base_url = options.base_url_or(GOOGLE_SCHOLAR_URL);
        Self { options, base_url }
    }

    fn page_url(&self, profile: &str, start: usize, page_size: u32) -> String {
        format!(
            "{}/citations?user={}&hl=en&cstart={}&pagesize={}",
            self.base_url,
            urlencoding::encode(profile),
            start,
            page_size
        )
    }

    async fn fetch_page(&self, url: String) -> Result<String, SourceError> {
        let http = self.options.http.clone();
        with_retry(self.options.retry, || {
            let http = http.clone();
            let url = url.clone();
            async move {
                http.send_text(http.get(&url).header("User-Agent", BROWSER_USER_AGENT))
                    .await
            }
        })
        .await
    }

    /// Parse one profile page. Returns the rows found on it.
    fn parse_profile(html: &str) -> Result<Vec<RawRecord>, SourceError> {
        if html.contains("gs_captcha") || html.contains("id=\"captcha\"") {
            return Err(SourceError::PlatformUnavailable(
                "Google Scholar answered with a CAPTCHA".to_string(),
            ));
        }

        let document = Html::parse_document(html);
        let row_selector = parse_selector("tr.gsc_a_tr")?;
        let title_selector = parse_selector("a.gsc_a_at")?;
        let gray_selector = parse_selector("div.gs_gray")?;
        let cites_selector = parse_selector("a.gsc_a_ac")?;
        let year_selector = parse_selector("span.gsc_a_h")?;

        let mut records = Vec::new();
        for row in document.select(&row_selector) {
            let Some(title_elem) = row.select(&title_selector).next() else {
                continue;
            };
            let title = element_text(&title_elem);
            if title.is_empty() {
                continue;
            }

            let href = title_elem.value().attr("href").unwrap_or_default();
            let platform_id = citation_id(href).unwrap_or_else(|| title.clone());

            let mut gray = row.select(&gray_selector).map(|e| element_text(&e));
            let authors: Vec<String> = gray
                .next()
                .map(|line| {
                    line.split(',')
                        .map(|a| a.trim().to_string())
                        .filter(|a| a != "...")
                        .collect()
                })
                .unwrap_or_default();
            let venue = gray.next().unwrap_or_default();

            // Scholar leaves the cell empty for uncited papers, so blank means 0.
            let citations = row
                .select(&cites_selector)
                .next()
                .map(|e| element_text(&e))
                .and_then(|t| t.parse::<u32>().ok())
                .unwrap_or(0);

            let year = row
                .select(&year_selector)
                .next()
                .and_then(|e| element_text(&e).parse::<i32>().ok());

            let mut builder = RecordBuilder::new(Platform::GoogleScholar, platform_id, title)
                .authors(authors)
                .venue(venue)
                .maybe_year(year)
                .citations(citations);
            if !href.is_empty() {
                builder = builder.url(format!("{}{}", GOOGLE_SCHOLAR_URL, href));
            }

            records.push(builder.build());
        }

        Ok(records)
    }
}

fn parse_selector(input: &str) -> Result<Selector, SourceError> {
    Selector::parse(input).map_err(|e| SourceError::Parse(format!("invalid selector {input}: {e}")))
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `citation_for_view=USER:ID` from a profile row link
fn citation_id(href: &str) -> Option<String> {
    href.split(['?', '&'])
        .find_map(|pair| pair.strip_prefix("citation_for_view="))
        .map(|v| urlencoding::decode(v).map(|s| s.into_owned()).unwrap_or_else(|_| v.to_string()))
        .filter(|v| !v.is_empty())
}

impl Default for GoogleScholarSource {
    fn default() -> Self {
        Self::new(SourceOptions::default())
    }
}

#[async_trait]
impl Source for GoogleScholarSource {
    fn id(&self) -> &str {
        "google_scholar"
    }

    fn name(&self) -> &str {
        "Google Scholar"
    }

    fn platform(&self) -> Platform {
        Platform::GoogleScholar
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::FETCH | SourceCapabilities::CITATION_COUNTS
    }

    fn fetch<'a>(&'a self, author: &'a AuthorRef) -> RecordStream<'a> {
        Box::pin(stream! {
            let Some(profile) = author.id_for(&Platform::GoogleScholar) else {
                yield Err(SourceError::NotConfigured(
                    "Google Scholar needs platforms.google_scholar.author_id".to_string(),
                ));
                return;
            };

            let page_size = self.options.page_size.min(MAX_PAGE_SIZE);
            let mut start = 0usize;
            loop {
                let body = match self.fetch_page(self.page_url(profile, start, page_size)).await {
                    Ok(body) => body,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                // Parsed synchronously; the document is not kept across awaits
                let records = match Self::parse_profile(&body) {
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

    const PROFILE: &str = r#"<html><body><table id="gsc_a_t"><tbody id="gsc_a_b">
<tr class="gsc_a_tr">
  <td class="gsc_a_t">
    <a href="/citations?view_op=view_citation&amp;hl=en&amp;user=abcDEF&amp;citation_for_view=abcDEF:u5HHmVD_uO8C" class="gsc_a_at">Deep Learning Survey</a>
    <div class="gs_gray">A Lovelace, C Babbage</div>
    <div class="gs_gray">Journal of Tests 12 (3), 2019</div>
  </td>
  <td class="gsc_a_c"><a href="/scholar?cites=1" class="gsc_a_ac gs_ibl">42</a></td>
  <td class="gsc_a_y"><span class="gsc_a_h gsc_a_hc gs_ibl">2019</span></td>
</tr>
<tr class="gsc_a_tr">
  <td class="gsc_a_t">
    <a href="/citations?view_op=view_citation&amp;citation_for_view=abcDEF:zzz" class="gsc_a_at">Uncited Note</a>
    <div class="gs_gray">A Lovelace</div>
    <div class="gs_gray"></div>
  </td>
  <td class="gsc_a_c"><a class="gsc_a_ac gs_ibl"></a></td>
  <td class="gsc_a_y"><span class="gsc_a_h gsc_a_hc gs_ibl"></span></td>
</tr>
</tbody></table></body></html>"#;

    #[test]
    fn test_parse_profile() {
        let records = GoogleScholarSource::parse_profile(PROFILE).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.platform_id, "abcDEF:u5HHmVD_uO8C");
        assert_eq!(first.title, "Deep Learning Survey");
        assert_eq!(first.authors, vec!["A Lovelace", "C Babbage"]);
        assert_eq!(first.venue.as_deref(), Some("Journal of Tests 12 (3), 2019"));
        assert_eq!(first.citations, Some(42));
        assert_eq!(first.year, Some(2019));

        let second = &records[1];
        assert_eq!(second.citations, Some(0));
        assert_eq!(second.year, None);
        assert!(second.venue.is_none());
    }

    #[test]
    fn test_captcha_is_unavailable() {
        let result = GoogleScholarSource::parse_profile("<div id=\"gs_captcha_c\"></div>");
        assert!(matches!(result, Err(SourceError::PlatformUnavailable(_))));
    }

    #[tokio::test]
    async fn test_fetch_profile() {
        let mut server = mockito::Server::new_async().await;
        let page = server
            .mock("GET", "/citations")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("user".into(), "abcDEF".into()),
                Matcher::UrlEncoded("cstart".into(), "0".into()),
            ]))
            .with_status(200)
            .with_body(PROFILE)
            .create_async()
            .await;

        let mut options = SourceOptions::default().base_url(server.url());
        options.retry = RetryConfig::immediate(1);
        let source = GoogleScholarSource::new(options);
        let author = AuthorRef::new("Ada").platform_id(&Platform::GoogleScholar, "abcDEF");

        let records: Vec<_> = source.fetch(&author).collect().await;
        page.assert_async().await;
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_requires_profile_id() {
        let source = GoogleScholarSource::default();
        let author = AuthorRef::new("Ada");
        let records: Vec<_> = source.fetch(&author).collect().await;
        assert!(matches!(records[0], Err(SourceError::NotConfigured(_))));
    }
}

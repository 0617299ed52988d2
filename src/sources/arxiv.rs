use super::traits::{LookupId, SearchQuery, SourceAdapter, SourceError};
use super::user_agent;
use crate::config::SourcesConfig;
use crate::paper::{normalize_arxiv_id, IdKind, RawPaper};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const SOURCE_NAME: &str = "arxiv";

/// arXiv Atom API adapter
pub struct ArxivAdapter {
    client: Client,
    base_url: String,
}

impl ArxivAdapter {
    pub fn new(sources: &SourcesConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent(sources))
            .build()
            .map_err(|e| SourceError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: "http://export.arxiv.org/api/query".to_string(),
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build arXiv API URL for a search round
    fn build_search_url(&self, query: &SearchQuery) -> Result<String, SourceError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SourceError::InvalidQuery(format!("Invalid base URL: {}", e)))?;

        let mut search_query = format!("all:\"{}\"", query.query);
        if let Some(domain) = query.domain.as_deref() {
            // Only forward domains that look like arXiv category codes
            if domain.contains('.') && !domain.contains(' ') {
                search_query.push_str(&format!(" AND cat:{}", domain));
            }
        }
        if let Some(year) = query.year_from {
            search_query.push_str(&format!(
                " AND submittedDate:[{:04}01010000 TO 210001010000]",
                year
            ));
        }

        url.query_pairs_mut()
            .append_pair("search_query", &search_query)
            .append_pair("start", "0")
            .append_pair("max_results", &query.limit.to_string())
            .append_pair("sortBy", "relevance")
            .append_pair("sortOrder", "descending");

        Ok(url.to_string())
    }

    /// Build arXiv API URL for an id_list fetch
    fn build_fetch_url(&self, arxiv_id: &str) -> Result<String, SourceError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SourceError::InvalidQuery(format!("Invalid base URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("id_list", arxiv_id)
            .append_pair("max_results", "1");
        Ok(url.to_string())
    }

    async fn get_feed(&self, url: &str) -> Result<String, SourceError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout
            } else {
                SourceError::Network(format!("Request failed: {}", e))
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(match status.as_u16() {
                429 => SourceError::RateLimit,
                503 => SourceError::ServiceUnavailable(
                    "arXiv service temporarily unavailable".to_string(),
                ),
                _ => SourceError::Network(format!("HTTP {}", status)),
            });
        }

        response
            .text()
            .await
            .map_err(|e| SourceError::Network(format!("Failed to read response: {}", e)))
    }

    /// Parse an arXiv Atom feed into raw paper records
    fn parse_feed(&self, response_text: &str) -> Result<Vec<RawPaper>, SourceError> {
        use roxmltree::Document;

        let doc = Document::parse(response_text)
            .map_err(|e| SourceError::Parse(format!("Failed to parse XML: {}", e)))?;

        let mut papers = Vec::new();

        for entry in doc.descendants().filter(|n| n.has_tag_name("entry")) {
            let mut paper = RawPaper {
                source: SOURCE_NAME.to_string(),
                venue: Some("arXiv".to_string()),
                is_open_access: Some(true),
                ..Default::default()
            };

            for child in entry.children().filter(|n| n.is_element()) {
                match child.tag_name().name() {
                    "id" => {
                        if let Some(id) = child.text() {
                            // The entry id is a URL ending in the arXiv id
                            if let Some(raw_id) = id.rsplit('/').next() {
                                paper
                                    .identifiers
                                    .insert(IdKind::Arxiv, normalize_arxiv_id(raw_id));
                            }
                            paper.paper_url = Some(id.trim().to_string());
                        }
                    }
                    "title" => {
                        if let Some(title) = child.text() {
                            paper.title = collapse_whitespace(title);
                        }
                    }
                    "summary" => {
                        if let Some(summary) = child.text() {
                            paper.abstract_text = Some(collapse_whitespace(summary));
                        }
                    }
                    "published" => {
                        if let Some(published) = child.text() {
                            paper.publication_date = Some(published.trim().to_string());
                        }
                    }
                    "author" => {
                        for name_elem in child.descendants().filter(|n| n.has_tag_name("name")) {
                            if let Some(author_name) = name_elem.text() {
                                paper.authors.push(author_name.trim().to_string());
                            }
                        }
                    }
                    "doi" => {
                        if let Some(doi) = child.text() {
                            paper.doi = Some(doi.trim().to_string());
                        }
                    }
                    "link" => {
                        if let (Some(href), Some("application/pdf")) =
                            (child.attribute("href"), child.attribute("type"))
                        {
                            paper.pdf_url = Some(href.to_string());
                        }
                    }
                    _ => {}
                }
            }

            if !paper.title.is_empty() {
                papers.push(paper);
            }
        }

        debug!("Parsed {} papers from arXiv response", papers.len());
        Ok(papers)
    }
}

#[async_trait]
impl SourceAdapter for ArxivAdapter {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn description(&self) -> &'static str {
        "arXiv.org - Open access e-prints in physics, mathematics, computer science, and more"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawPaper>, SourceError> {
        info!("Searching arXiv for: {}", query.query);

        let url = self.build_search_url(query)?;
        debug!("arXiv search URL: {}", url);

        let body = self.get_feed(&url).await?;
        let papers = self.parse_feed(&body)?;

        info!("arXiv search completed: {} papers found", papers.len());
        Ok(papers)
    }

    async fn fetch(&self, id: &LookupId) -> Result<Option<RawPaper>, SourceError> {
        let arxiv_id = match id {
            LookupId::Arxiv(id) => id.clone(),
            _ => return Ok(None),
        };

        let url = self.build_fetch_url(&arxiv_id)?;
        let body = self.get_feed(&url).await?;
        Ok(self.parse_feed(&body)?.into_iter().next())
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::IdKind;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <published>2017-06-12T17:57:34Z</published>
    <title>Attention Is All
      You Need</title>
    <summary>The dominant sequence transduction models are based on
      complex recurrent or convolutional neural networks.</summary>
    <author><name>Ashish Vaswani</name></author>
    <author><name>Noam Shazeer</name></author>
    <arxiv:doi>10.48550/arXiv.1706.03762</arxiv:doi>
    <link href="http://arxiv.org/pdf/1706.03762v7" rel="related" type="application/pdf"/>
  </entry>
</feed>"#;

    fn adapter() -> ArxivAdapter {
        ArxivAdapter::new(&crate::config::SourcesConfig::default()).unwrap()
    }

    #[test]
    fn test_search_url_building() {
        let query = SearchQuery::new("quantum computing", 10);
        let url = adapter().build_search_url(&query).unwrap();
        assert!(url.contains("search_query=all%3A%22quantum+computing%22"));
        assert!(url.contains("max_results=10"));
        assert!(url.contains("start=0"));
    }

    #[test]
    fn test_search_url_with_category_domain() {
        let mut query = SearchQuery::new("transformers", 5);
        query.domain = Some("cs.CL".to_string());
        let url = adapter().build_search_url(&query).unwrap();
        assert!(url.contains("cat%3Acs.CL"));

        // Free-text domains are not forwarded as categories
        query.domain = Some("computer science".to_string());
        let url = adapter().build_search_url(&query).unwrap();
        assert!(!url.contains("cat%3A"));
    }

    #[test]
    fn test_parse_feed() {
        let papers = adapter().parse_feed(SAMPLE_FEED).unwrap();
        assert_eq!(papers.len(), 1);

        let paper = &papers[0];
        assert_eq!(paper.title, "Attention Is All You Need");
        assert_eq!(paper.source, "arxiv");
        assert_eq!(paper.identifier(IdKind::Arxiv), Some("1706.03762"));
        assert_eq!(paper.doi.as_deref(), Some("10.48550/arXiv.1706.03762"));
        assert_eq!(paper.authors.len(), 2);
        assert_eq!(
            paper.pdf_url.as_deref(),
            Some("http://arxiv.org/pdf/1706.03762v7")
        );
        assert_eq!(
            paper.publication_date.as_deref(),
            Some("2017-06-12T17:57:34Z")
        );
    }

    #[tokio::test]
    async fn test_fetch_against_mock_server() {
        use wiremock::matchers::{method, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("id_list", "1706.03762"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_FEED))
            .mount(&server)
            .await;

        let adapter = adapter().with_base_url(server.uri());
        let paper = adapter
            .fetch(&LookupId::Arxiv("1706.03762".to_string()))
            .await
            .unwrap()
            .expect("paper");
        assert_eq!(paper.identifier(IdKind::Arxiv), Some("1706.03762"));
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_source_error() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let adapter = adapter().with_base_url(server.uri());
        let err = adapter
            .search(&SearchQuery::new("anything", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::RateLimit));
    }
}

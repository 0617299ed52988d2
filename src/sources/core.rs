use super::traits::{SearchQuery, SourceAdapter, SourceError};
use super::user_agent;
use crate::config::SourcesConfig;
use crate::paper::{IdKind, RawPaper};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const SOURCE_NAME: &str = "core";

/// CORE v3 aggregator adapter. Requires an API key; the registry skips
/// this source entirely when no key is configured.
pub struct CoreAdapter {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<CoreWork>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoreWork {
    id: Option<u64>,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    authors: Option<Vec<CoreAuthor>>,
    year_published: Option<i32>,
    published_date: Option<String>,
    doi: Option<String>,
    download_url: Option<String>,
    publisher: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CoreAuthor {
    name: Option<String>,
}

impl CoreAdapter {
    pub fn new(sources: &SourcesConfig, api_key: String) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent(sources))
            .build()
            .map_err(|e| SourceError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: "https://api.core.ac.uk/v3".to_string(),
            api_key,
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn convert(work: CoreWork) -> Option<RawPaper> {
        let title = work.title.filter(|t| !t.trim().is_empty())?;

        let authors = work
            .authors
            .map(|authors| {
                authors
                    .into_iter()
                    .filter_map(|a| a.name)
                    .collect::<Vec<String>>()
            })
            .unwrap_or_default();

        // CORE names are often "Last, First"; flip them for display order
        let authors = authors
            .into_iter()
            .map(|name: String| match name.split_once(", ") {
                Some((last, first)) => format!("{} {}", first, last),
                None => name,
            })
            .collect();

        let publication_date = work
            .published_date
            .or_else(|| work.year_published.map(|y| y.to_string()));

        let mut paper = RawPaper {
            title,
            source: SOURCE_NAME.to_string(),
            doi: work.doi,
            abstract_text: work.abstract_text,
            authors,
            publication_date,
            publisher: work.publisher,
            pdf_url: work.download_url,
            ..Default::default()
        };

        if let Some(id) = work.id {
            paper.identifiers.insert(IdKind::Core, id.to_string());
            paper.paper_url = Some(format!("https://core.ac.uk/works/{}", id));
        }

        Some(paper)
    }
}

#[async_trait]
impl SourceAdapter for CoreAdapter {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn description(&self) -> &'static str {
        "CORE - Aggregated open access research papers from repositories worldwide"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawPaper>, SourceError> {
        info!("Searching CORE for: {}", query.query);

        let mut q = query.query.clone();
        if let Some(year) = query.year_from {
            q.push_str(&format!(" AND yearPublished>={}", year));
        }

        let response = self
            .client
            .get(format!("{}/search/works/", self.base_url))
            .bearer_auth(&self.api_key)
            .query(&[("q", q), ("limit", query.limit.min(100).to_string())])
            .send()
            .await?;

        match response.status().as_u16() {
            401 | 403 => return Err(SourceError::Auth("CORE API key rejected".to_string())),
            429 => return Err(SourceError::RateLimit),
            s if s >= 500 => return Err(SourceError::ServiceUnavailable(format!("HTTP {}", s))),
            _ => {}
        }

        let body: SearchResponse = response.json().await?;
        let papers: Vec<RawPaper> = body
            .results
            .into_iter()
            .filter_map(Self::convert)
            .collect();

        debug!("CORE returned {} papers", papers.len());
        Ok(papers)
    }
}

use super::traits::{LookupId, SearchQuery, SourceAdapter, SourceError};
use super::user_agent;
use crate::config::SourcesConfig;
use crate::paper::{IdKind, RawPaper};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

const SOURCE_NAME: &str = "openalex";

/// OpenAlex works API adapter
pub struct OpenAlexAdapter {
    client: Client,
    base_url: String,
    mailto: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorksResponse {
    results: Vec<Work>,
}

#[derive(Debug, Deserialize)]
struct Work {
    id: Option<String>,
    title: Option<String>,
    doi: Option<String>,
    publication_date: Option<String>,
    authorships: Option<Vec<Authorship>>,
    abstract_inverted_index: Option<BTreeMap<String, Vec<u32>>>,
    primary_location: Option<Location>,
    open_access: Option<OpenAccess>,
    cited_by_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Authorship {
    author: Option<Author>,
}

#[derive(Debug, Deserialize)]
struct Author {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Location {
    source: Option<LocationSource>,
}

#[derive(Debug, Deserialize)]
struct LocationSource {
    display_name: Option<String>,
    host_organization_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAccess {
    is_oa: Option<bool>,
    oa_url: Option<String>,
}

impl OpenAlexAdapter {
    pub fn new(sources: &SourcesConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent(sources))
            .build()
            .map_err(|e| SourceError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: "https://api.openalex.org".to_string(),
            mailto: sources.contact_email.clone(),
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get_works(
        &self,
        params: &[(&str, String)],
        path: &str,
    ) -> Result<reqwest::Response, SourceError> {
        let mut request = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(params);
        if let Some(mailto) = &self.mailto {
            request = request.query(&[("mailto", mailto.as_str())]);
        }

        let response = request.send().await?;
        match response.status().as_u16() {
            429 => Err(SourceError::RateLimit),
            s if s >= 500 => Err(SourceError::ServiceUnavailable(format!("HTTP {}", s))),
            _ => Ok(response),
        }
    }

    fn convert(&self, work: Work) -> Option<RawPaper> {
        let title = work.title.filter(|t| !t.trim().is_empty())?;

        let mut paper = RawPaper {
            title,
            source: SOURCE_NAME.to_string(),
            doi: work.doi,
            abstract_text: work.abstract_inverted_index.as_ref().map(rebuild_abstract),
            publication_date: work.publication_date,
            citation_count: work.cited_by_count,
            ..Default::default()
        };

        if let Some(authorships) = work.authorships {
            paper.authors = authorships
                .into_iter()
                .filter_map(|a| a.author.and_then(|a| a.display_name))
                .collect();
        }
        if let Some(location) = work.primary_location.and_then(|l| l.source) {
            paper.venue = location.display_name;
            paper.publisher = location.host_organization_name;
        }
        if let Some(oa) = work.open_access {
            paper.is_open_access = oa.is_oa;
            paper.pdf_url = oa.oa_url;
        }
        if let Some(id_url) = work.id {
            // Work ids come as https://openalex.org/W...
            if let Some(id) = id_url.rsplit('/').next().filter(|id| !id.is_empty()) {
                paper.identifiers.insert(IdKind::OpenAlex, id.to_string());
            }
            paper.paper_url = Some(id_url);
        }

        Some(paper)
    }
}

/// Rebuild an abstract from OpenAlex's inverted index representation
fn rebuild_abstract(index: &BTreeMap<String, Vec<u32>>) -> String {
    let mut positions: Vec<(u32, &str)> = Vec::new();
    for (word, offsets) in index {
        for &offset in offsets {
            positions.push((offset, word.as_str()));
        }
    }
    positions.sort_unstable_by_key(|&(offset, _)| offset);
    positions
        .into_iter()
        .map(|(_, word)| word)
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl SourceAdapter for OpenAlexAdapter {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn description(&self) -> &'static str {
        "OpenAlex - Open catalog of scholarly works, authors, and venues"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawPaper>, SourceError> {
        info!("Searching OpenAlex for: {}", query.query);

        let mut params = vec![
            ("search", query.query.clone()),
            ("per-page", query.limit.min(200).to_string()),
        ];
        if let Some(year) = query.year_from {
            params.push(("filter", format!("from_publication_date:{:04}-01-01", year)));
        }

        let response = self.get_works(&params, "/works").await?;
        let body: WorksResponse = response.json().await?;

        let papers: Vec<RawPaper> = body
            .results
            .into_iter()
            .filter_map(|w| self.convert(w))
            .collect();
        debug!("OpenAlex returned {} papers", papers.len());
        Ok(papers)
    }

    async fn fetch(&self, id: &LookupId) -> Result<Option<RawPaper>, SourceError> {
        let path = match id {
            LookupId::Doi(doi) => format!("/works/doi:{}", doi),
            _ => return Ok(None),
        };

        let response = self.get_works(&[], &path).await?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let work: Work = response.json().await?;
        Ok(self.convert(work))
    }
}

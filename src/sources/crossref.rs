use super::traits::{LookupId, SearchQuery, SourceAdapter, SourceError};
use super::user_agent;
use crate::config::SourcesConfig;
use crate::paper::{normalize_title, RawPaper};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const SOURCE_NAME: &str = "crossref";
const SELECT_FIELDS: &str =
    "DOI,title,author,abstract,published,container-title,publisher,is-referenced-by-count";

/// Crossref works API adapter.
///
/// Participates in metadata enrichment (DOI lookups and title-search
/// fallback); it is not part of the default fanout set.
pub struct CrossrefAdapter {
    client: Client,
    base_url: String,
    jats_tags: Regex,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    message: ListMessage,
}

#[derive(Debug, Deserialize)]
struct ListMessage {
    items: Vec<CrossrefWork>,
}

#[derive(Debug, Deserialize)]
struct WorkResponse {
    message: CrossrefWork,
}

#[derive(Debug, Deserialize)]
struct CrossrefWork {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    title: Option<Vec<String>>,
    author: Option<Vec<CrossrefAuthor>>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    published: Option<CrossrefDate>,
    #[serde(rename = "container-title")]
    container_title: Option<Vec<String>>,
    publisher: Option<String>,
    #[serde(rename = "is-referenced-by-count")]
    citation_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CrossrefAuthor {
    given: Option<String>,
    family: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrossrefDate {
    #[serde(rename = "date-parts")]
    date_parts: Option<Vec<Vec<u32>>>,
}

impl CrossrefAdapter {
    pub fn new(sources: &SourcesConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent(sources))
            .build()
            .map_err(|e| SourceError::Network(format!("Failed to create HTTP client: {}", e)))?;

        let jats_tags = Regex::new(r"</?[a-zA-Z][^>]*>")
            .map_err(|e| SourceError::Parse(format!("JATS regex: {}", e)))?;

        Ok(Self {
            client,
            base_url: "https://api.crossref.org".to_string(),
            jats_tags,
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<reqwest::Response, SourceError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(params)
            .send()
            .await?;

        match response.status().as_u16() {
            429 => Err(SourceError::RateLimit),
            s if s >= 500 => Err(SourceError::ServiceUnavailable(format!("HTTP {}", s))),
            _ => Ok(response),
        }
    }

    fn convert(&self, work: CrossrefWork) -> Option<RawPaper> {
        let title = work
            .title
            .as_ref()
            .and_then(|t| t.first())
            .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|t| !t.is_empty())?;

        let authors = work
            .author
            .map(|authors| {
                authors
                    .into_iter()
                    .filter_map(|a| match (a.given, a.family) {
                        (Some(given), Some(family)) => Some(format!("{} {}", given, family)),
                        (None, Some(family)) => Some(family),
                        (Some(given), None) => Some(given),
                        (None, None) => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let publication_date = work.published.and_then(|d| format_date_parts(&d));
        let abstract_text = work
            .abstract_text
            .map(|a| self.strip_jats(&a))
            .filter(|a| !a.is_empty());

        let paper_url = work
            .doi
            .as_deref()
            .map(|doi| format!("https://doi.org/{}", doi));

        Some(RawPaper {
            title,
            source: SOURCE_NAME.to_string(),
            doi: work.doi,
            abstract_text,
            authors,
            publication_date,
            venue: work.container_title.and_then(|t| t.into_iter().next()),
            publisher: work.publisher,
            citation_count: work.citation_count,
            paper_url,
            ..Default::default()
        })
    }

    /// Strip JATS markup from a Crossref abstract
    fn strip_jats(&self, text: &str) -> String {
        let stripped = self.jats_tags.replace_all(text, " ");
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

fn format_date_parts(date: &CrossrefDate) -> Option<String> {
    let parts = date.date_parts.as_ref()?.first()?;
    match parts.as_slice() {
        [year] => Some(format!("{}", year)),
        [year, month] => Some(format!("{}-{:02}", year, month)),
        [year, month, day, ..] => Some(format!("{}-{:02}-{:02}", year, month, day)),
        _ => None,
    }
}

#[async_trait]
impl SourceAdapter for CrossrefAdapter {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn description(&self) -> &'static str {
        "Crossref - DOI registration agency metadata for scholarly publications"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawPaper>, SourceError> {
        info!("Searching Crossref for: {}", query.query);

        let mut params = vec![
            ("query.bibliographic", query.query.clone()),
            ("rows", query.limit.min(100).to_string()),
            ("select", SELECT_FIELDS.to_string()),
        ];
        if let Some(year) = query.year_from {
            params.push(("filter", format!("from-pub-date:{:04}-01-01", year)));
        }

        let response = self.get("/works", &params).await?;
        let body: ListResponse = response.json().await?;

        let papers: Vec<RawPaper> = body
            .message
            .items
            .into_iter()
            .filter_map(|w| self.convert(w))
            .collect();
        debug!("Crossref returned {} papers", papers.len());
        Ok(papers)
    }

    async fn fetch(&self, id: &LookupId) -> Result<Option<RawPaper>, SourceError> {
        match id {
            LookupId::Doi(doi) => {
                let path = format!("/works/{}", urlencoding::encode(doi));
                let response = self.get(&path, &[]).await?;
                if response.status().as_u16() == 404 {
                    return Ok(None);
                }
                let body: WorkResponse = response.json().await?;
                Ok(self.convert(body.message))
            }
            LookupId::Title(title) => {
                // Title fallback: search and accept only an exact
                // normalized-title match
                let params = vec![
                    ("query.title", title.clone()),
                    ("rows", "3".to_string()),
                    ("select", SELECT_FIELDS.to_string()),
                ];
                let response = self.get("/works", &params).await?;
                let body: ListResponse = response.json().await?;

                let wanted = normalize_title(title);
                Ok(body
                    .message
                    .items
                    .into_iter()
                    .filter_map(|w| self.convert(w))
                    .find(|p| normalize_title(&p.title) == wanted))
            }
            _ => Ok(None),
        }
    }
}

use super::traits::{LookupId, SearchQuery, SourceAdapter, SourceError};
use super::user_agent;
use crate::config::SourcesConfig;
use crate::paper::{IdKind, RawPaper};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const SOURCE_NAME: &str = "semantic_scholar";
const PAPER_FIELDS: &str =
    "title,abstract,authors,publicationDate,year,externalIds,openAccessPdf,venue,citationCount,isOpenAccess,url";

/// Semantic Scholar Graph API adapter
pub struct SemanticScholarAdapter {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    data: Option<Vec<S2Paper>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Paper {
    paper_id: Option<String>,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    authors: Option<Vec<S2Author>>,
    publication_date: Option<String>,
    year: Option<i32>,
    external_ids: Option<ExternalIds>,
    open_access_pdf: Option<OpenAccessPdf>,
    venue: Option<String>,
    citation_count: Option<u32>,
    is_open_access: Option<bool>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2Author {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "ArXiv")]
    arxiv: Option<String>,
    pub_med: Option<serde_json::Value>,
    pub_med_central: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OpenAccessPdf {
    url: Option<String>,
}

impl SemanticScholarAdapter {
    pub fn new(sources: &SourcesConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent(sources))
            .build()
            .map_err(|e| SourceError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: "https://api.semanticscholar.org/graph/v1".to_string(),
            api_key: sources.semantic_scholar_api_key.clone(),
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<reqwest::Response, SourceError> {
        let mut request = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(params);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await?;
        match response.status().as_u16() {
            401 | 403 => Err(SourceError::Auth(
                "Semantic Scholar API key rejected".to_string(),
            )),
            429 => Err(SourceError::RateLimit),
            s if s >= 500 => Err(SourceError::ServiceUnavailable(format!("HTTP {}", s))),
            _ => Ok(response),
        }
    }

    fn convert(paper: S2Paper) -> Option<RawPaper> {
        let title = paper.title.filter(|t| !t.trim().is_empty())?;

        let authors = paper
            .authors
            .map(|authors| authors.into_iter().filter_map(|a| a.name).collect())
            .unwrap_or_default();

        let publication_date = paper
            .publication_date
            .or_else(|| paper.year.map(|y| y.to_string()));

        let mut raw = RawPaper {
            title,
            source: SOURCE_NAME.to_string(),
            abstract_text: paper.abstract_text,
            authors,
            publication_date,
            venue: paper.venue.filter(|v| !v.is_empty()),
            citation_count: paper.citation_count,
            is_open_access: paper.is_open_access,
            paper_url: paper.url,
            pdf_url: paper.open_access_pdf.and_then(|p| p.url),
            ..Default::default()
        };

        if let Some(id) = paper.paper_id {
            raw.identifiers.insert(IdKind::SemanticScholar, id);
        }
        if let Some(ids) = paper.external_ids {
            raw.doi = ids.doi;
            if let Some(arxiv) = ids.arxiv {
                raw.identifiers
                    .insert(IdKind::Arxiv, crate::paper::normalize_arxiv_id(&arxiv));
            }
            if let Some(pmid) = json_id_string(ids.pub_med) {
                raw.identifiers.insert(IdKind::Pmid, pmid);
            }
            if let Some(pmcid) = json_id_string(ids.pub_med_central) {
                raw.identifiers.insert(IdKind::Pmcid, pmcid);
            }
        }

        Some(raw)
    }
}

/// External ids arrive as either strings or numbers depending on namespace
fn json_id_string(value: Option<serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl SourceAdapter for SemanticScholarAdapter {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn description(&self) -> &'static str {
        "Semantic Scholar - AI-curated scholarly graph with citation context"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawPaper>, SourceError> {
        info!("Searching Semantic Scholar for: {}", query.query);

        let mut params = vec![
            ("query", query.query.clone()),
            ("limit", query.limit.min(100).to_string()),
            ("fields", PAPER_FIELDS.to_string()),
        ];
        if let Some(year) = query.year_from {
            params.push(("year", format!("{}-", year)));
        }

        let response = self.get("/paper/search", &params).await?;
        let body: SearchResponse = response.json().await?;

        let papers: Vec<RawPaper> = body
            .data
            .unwrap_or_default()
            .into_iter()
            .filter_map(Self::convert)
            .collect();
        debug!("Semantic Scholar returned {} papers", papers.len());
        Ok(papers)
    }

    async fn fetch(&self, id: &LookupId) -> Result<Option<RawPaper>, SourceError> {
        let path = match id {
            LookupId::Doi(doi) => format!("/paper/DOI:{}", doi),
            LookupId::SemanticScholar(id) => format!("/paper/{}", id),
            LookupId::Arxiv(id) => format!("/paper/ARXIV:{}", id),
            _ => return Ok(None),
        };

        let response = self
            .get(&path, &[("fields", PAPER_FIELDS.to_string())])
            .await?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let paper: S2Paper = response.json().await?;
        Ok(Self::convert(paper))
    }

    fn search_timeout(&self) -> Option<Duration> {
        // The public Graph API is slow without an API key
        Some(Duration::from_secs(60))
    }
}

use super::traits::{SearchQuery, SourceAdapter, SourceError};
use super::user_agent;
use crate::config::SourcesConfig;
use crate::paper::{IdKind, RawPaper};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const SOURCE_NAME: &str = "europe_pmc";

/// Europe PMC REST API adapter
pub struct EuropePmcAdapter {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    result_list: Option<ResultList>,
}

#[derive(Debug, Deserialize)]
struct ResultList {
    result: Vec<PmcResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PmcResult {
    pmid: Option<String>,
    pmcid: Option<String>,
    doi: Option<String>,
    title: Option<String>,
    author_string: Option<String>,
    journal_title: Option<String>,
    first_publication_date: Option<String>,
    pub_year: Option<String>,
    abstract_text: Option<String>,
    is_open_access: Option<String>,
    cited_by_count: Option<u32>,
    full_text_url_list: Option<FullTextUrlList>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullTextUrlList {
    full_text_url: Vec<FullTextUrl>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullTextUrl {
    document_style: Option<String>,
    url: Option<String>,
}

impl EuropePmcAdapter {
    pub fn new(sources: &SourcesConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent(sources))
            .build()
            .map_err(|e| SourceError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: "https://www.ebi.ac.uk/europepmc/webservices/rest".to_string(),
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_query(query: &SearchQuery) -> String {
        let mut q = query.query.clone();
        if let Some(year) = query.year_from {
            q.push_str(&format!(" AND PUB_YEAR:[{} TO 2100]", year));
        }
        q
    }

    fn convert(result: PmcResult) -> Option<RawPaper> {
        let title = result.title.filter(|t| !t.trim().is_empty())?;

        let authors = result
            .author_string
            .as_deref()
            .map(|names| {
                names
                    .trim_end_matches('.')
                    .split(", ")
                    .map(str::to_string)
                    .filter(|n| !n.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let pdf_url = result.full_text_url_list.and_then(|list| {
            list.full_text_url
                .into_iter()
                .find(|u| u.document_style.as_deref() == Some("pdf"))
                .and_then(|u| u.url)
        });

        let mut paper = RawPaper {
            title,
            source: SOURCE_NAME.to_string(),
            doi: result.doi,
            abstract_text: result.abstract_text,
            authors,
            publication_date: result.first_publication_date.or(result.pub_year),
            venue: result.journal_title,
            citation_count: result.cited_by_count,
            is_open_access: result.is_open_access.as_deref().map(|flag| flag == "Y"),
            pdf_url,
            ..Default::default()
        };

        if let Some(pmid) = result.pmid {
            paper.paper_url = Some(format!("https://europepmc.org/article/MED/{}", pmid));
            paper.identifiers.insert(IdKind::Pmid, pmid);
        }
        if let Some(pmcid) = result.pmcid {
            paper.identifiers.insert(IdKind::Pmcid, pmcid);
        }

        Some(paper)
    }
}

#[async_trait]
impl SourceAdapter for EuropePmcAdapter {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn description(&self) -> &'static str {
        "Europe PMC - Life sciences literature with open access full texts"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawPaper>, SourceError> {
        info!("Searching Europe PMC for: {}", query.query);

        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("query", Self::build_query(query)),
                ("format", "json".to_string()),
                ("resultType", "core".to_string()),
                ("pageSize", query.limit.min(100).to_string()),
            ])
            .send()
            .await?;

        match response.status().as_u16() {
            429 => return Err(SourceError::RateLimit),
            s if s >= 500 => return Err(SourceError::ServiceUnavailable(format!("HTTP {}", s))),
            _ => {}
        }

        let body: SearchResponse = response.json().await?;
        let papers: Vec<RawPaper> = body
            .result_list
            .map(|list| list.result.into_iter().filter_map(Self::convert).collect())
            .unwrap_or_default();

        debug!("Europe PMC returned {} papers", papers.len());
        Ok(papers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> PmcResult {
        PmcResult {
            pmid: Some("31462379".to_string()),
            pmcid: Some("PMC6719747".to_string()),
            doi: Some("10.1016/j.cell.2019.07.038".to_string()),
            title: Some("A Reference Genome".to_string()),
            author_string: Some("Smith J, Jones K.".to_string()),
            journal_title: Some("Cell".to_string()),
            first_publication_date: Some("2019-08-27".to_string()),
            pub_year: Some("2019".to_string()),
            abstract_text: Some("We present a genome.".to_string()),
            is_open_access: Some("Y".to_string()),
            cited_by_count: Some(42),
            full_text_url_list: Some(FullTextUrlList {
                full_text_url: vec![
                    FullTextUrl {
                        document_style: Some("html".to_string()),
                        url: Some("https://example.org/full".to_string()),
                    },
                    FullTextUrl {
                        document_style: Some("pdf".to_string()),
                        url: Some("https://example.org/full.pdf".to_string()),
                    },
                ],
            }),
        }
    }

    #[test]
    fn test_convert_full_record() {
        let paper = EuropePmcAdapter::convert(sample_result()).unwrap();
        assert_eq!(paper.authors, vec!["Smith J", "Jones K"]);
        assert_eq!(paper.identifier(IdKind::Pmid), Some("31462379"));
        assert_eq!(paper.identifier(IdKind::Pmcid), Some("PMC6719747"));
        assert_eq!(paper.is_open_access, Some(true));
        assert_eq!(
            paper.pdf_url.as_deref(),
            Some("https://example.org/full.pdf")
        );
        assert_eq!(paper.publication_date.as_deref(), Some("2019-08-27"));
    }

    #[test]
    fn test_build_query_with_year_filter() {
        let mut query = SearchQuery::new("crispr repair", 10);
        query.year_from = Some(2020);
        assert_eq!(
            EuropePmcAdapter::build_query(&query),
            "crispr repair AND PUB_YEAR:[2020 TO 2100]"
        );
    }

    #[tokio::test]
    async fn test_search_against_mock_server() {
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let body = serde_json::json!({
            "resultList": {
                "result": [{
                    "pmid": "1",
                    "title": "CRISPR Advances",
                    "authorString": "Lee A",
                    "pubYear": "2021"
                }]
            }
        });
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let adapter = EuropePmcAdapter::new(&SourcesConfig::default())
            .unwrap()
            .with_base_url(server.uri());
        let papers = adapter
            .search(&SearchQuery::new("crispr", 5))
            .await
            .unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].publication_date.as_deref(), Some("2021"));
    }
}

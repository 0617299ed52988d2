use super::traits::{SearchQuery, SourceAdapter, SourceError};
use super::user_agent;
use crate::config::SourcesConfig;
use crate::paper::{IdKind, RawPaper};
use async_trait::async_trait;
use reqwest::Client;
use roxmltree::{Document, Node};
use std::time::Duration;
use tracing::{debug, info};

const SOURCE_NAME: &str = "pubmed";
const TOOL_NAME: &str = "scholar-harvester";

/// PubMed E-utilities adapter (esearch + efetch)
pub struct PubMedAdapter {
    client: Client,
    base_url: String,
    email: Option<String>,
}

impl PubMedAdapter {
    pub fn new(sources: &SourcesConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent(sources))
            .build()
            .map_err(|e| SourceError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string(),
            email: sources.contact_email.clone(),
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_term(query: &SearchQuery) -> String {
        let mut term = query.query.clone();
        if let Some(year) = query.year_from {
            term.push_str(&format!(
                " AND (\"{}\"[Date - Publication] : \"3000\"[Date - Publication])",
                year
            ));
        }
        term
    }

    async fn get_xml(&self, path: &str, params: &[(&str, String)]) -> Result<String, SourceError> {
        let mut request = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(params)
            .query(&[("tool", TOOL_NAME)]);
        if let Some(email) = &self.email {
            request = request.query(&[("email", email.as_str())]);
        }

        let response = request.send().await?;
        match response.status().as_u16() {
            429 => return Err(SourceError::RateLimit),
            s if s >= 500 => return Err(SourceError::ServiceUnavailable(format!("HTTP {}", s))),
            _ => {}
        }
        Ok(response.text().await?)
    }

    /// Extract PMIDs from an esearch response
    fn parse_id_list(xml: &str) -> Result<Vec<String>, SourceError> {
        let doc = Document::parse(xml)
            .map_err(|e| SourceError::Parse(format!("esearch response: {}", e)))?;
        Ok(doc
            .descendants()
            .filter(|n| n.has_tag_name("Id"))
            .filter_map(|n| n.text())
            .map(str::to_string)
            .collect())
    }

    /// Parse PubmedArticle records from an efetch response
    fn parse_articles(xml: &str) -> Result<Vec<RawPaper>, SourceError> {
        let doc = Document::parse(xml)
            .map_err(|e| SourceError::Parse(format!("efetch response: {}", e)))?;

        let mut papers = Vec::new();
        for article in doc
            .descendants()
            .filter(|n| n.has_tag_name("PubmedArticle"))
        {
            if let Some(paper) = Self::parse_article(&article) {
                papers.push(paper);
            }
        }
        Ok(papers)
    }

    fn parse_article(article: &Node<'_, '_>) -> Option<RawPaper> {
        let title = article
            .descendants()
            .find(|n| n.has_tag_name("ArticleTitle"))
            .and_then(|n| collect_text(&n))
            .filter(|t| !t.is_empty())?;

        let mut paper = RawPaper {
            title,
            source: SOURCE_NAME.to_string(),
            ..Default::default()
        };

        if let Some(pmid) = article
            .descendants()
            .find(|n| n.has_tag_name("PMID"))
            .and_then(|n| n.text())
        {
            paper.paper_url = Some(format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid));
            paper.identifiers.insert(IdKind::Pmid, pmid.to_string());
        }

        let abstract_parts: Vec<String> = article
            .descendants()
            .filter(|n| n.has_tag_name("AbstractText"))
            .filter_map(|n| collect_text(&n))
            .collect();
        if !abstract_parts.is_empty() {
            paper.abstract_text = Some(abstract_parts.join(" "));
        }

        for author in article.descendants().filter(|n| n.has_tag_name("Author")) {
            let last = child_text(&author, "LastName");
            let fore = child_text(&author, "ForeName");
            let name = match (fore, last) {
                (Some(fore), Some(last)) => Some(format!("{} {}", fore, last)),
                (None, Some(last)) => Some(last),
                _ => child_text(&author, "CollectiveName"),
            };
            if let Some(name) = name {
                paper.authors.push(name);
            }
        }

        paper.venue = article
            .descendants()
            .find(|n| n.has_tag_name("Journal"))
            .and_then(|j| {
                j.children()
                    .find(|n| n.has_tag_name("Title"))
                    .and_then(|n| n.text())
                    .map(str::to_string)
            });

        if let Some(pub_date) = article.descendants().find(|n| n.has_tag_name("PubDate")) {
            paper.publication_date = format_pub_date(&pub_date);
        }

        for article_id in article
            .descendants()
            .filter(|n| n.has_tag_name("ArticleId"))
        {
            match (article_id.attribute("IdType"), article_id.text()) {
                (Some("doi"), Some(doi)) => paper.doi = Some(doi.trim().to_string()),
                (Some("pmc"), Some(pmc)) => {
                    paper
                        .identifiers
                        .insert(IdKind::Pmcid, pmc.trim().to_string());
                }
                _ => {}
            }
        }

        Some(paper)
    }
}

/// Concatenate all text under a node, including inside inline markup
fn collect_text(node: &Node<'_, '_>) -> Option<String> {
    let text: String = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<Vec<_>>()
        .join("");
    let trimmed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn child_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|n| n.has_tag_name(tag))
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
}

/// Assemble a best-effort ISO date string from a PubDate element
fn format_pub_date(pub_date: &Node<'_, '_>) -> Option<String> {
    let year = child_text(pub_date, "Year")?;
    let month = child_text(pub_date, "Month").and_then(|m| month_number(&m));
    let day = child_text(pub_date, "Day").and_then(|d| d.parse::<u32>().ok());

    Some(match (month, day) {
        (Some(month), Some(day)) => format!("{}-{:02}-{:02}", year, month, day),
        (Some(month), None) => format!("{}-{:02}", year, month),
        _ => year,
    })
}

fn month_number(month: &str) -> Option<u32> {
    if let Ok(n) = month.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    let prefix: String = month.chars().take(3).collect::<String>().to_lowercase();
    let n = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(n)
}

#[async_trait]
impl SourceAdapter for PubMedAdapter {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn description(&self) -> &'static str {
        "PubMed - Biomedical literature from MEDLINE and life science journals"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawPaper>, SourceError> {
        info!("Searching PubMed for: {}", query.query);

        let search_xml = self
            .get_xml(
                "/esearch.fcgi",
                &[
                    ("db", "pubmed".to_string()),
                    ("term", Self::build_term(query)),
                    ("retmax", query.limit.min(100).to_string()),
                    ("sort", "relevance".to_string()),
                ],
            )
            .await?;

        let pmids = Self::parse_id_list(&search_xml)?;
        if pmids.is_empty() {
            debug!("No PubMed matches for query");
            return Ok(Vec::new());
        }

        let fetch_xml = self
            .get_xml(
                "/efetch.fcgi",
                &[
                    ("db", "pubmed".to_string()),
                    ("id", pmids.join(",")),
                    ("retmode", "xml".to_string()),
                    ("rettype", "abstract".to_string()),
                ],
            )
            .await?;

        let papers = Self::parse_articles(&fetch_xml)?;
        info!("PubMed search completed: {} papers found", papers.len());
        Ok(papers)
    }
}

use crate::config::PdfConfig;
use crate::paper::{normalize_arxiv_id, CanonicalPaper, IdKind};
use crate::sources::UnpaywallClient;
use crate::{Error, Result};
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

/// Publisher domains where scraping only finds paywalls
const PAYWALL_DOMAINS: [&str; 7] = [
    "nature.com",
    "springer.com",
    "ieee.org",
    "sciencedirect.com",
    "wiley.com",
    "acm.org",
    "elsevier.com",
];

/// Browser-style user agent; several publishers refuse obvious bots
pub(crate) const DOWNLOAD_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// One rung of the acquisition cascade.
///
/// A strategy proposes candidate download URLs, best first; the
/// acquirer downloads and validates them. Strategies that do not apply
/// to a paper return no candidates.
#[async_trait]
pub trait PdfStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn candidates(&self, paper: &CanonicalPaper) -> Vec<String>;
}

/// The fixed cascade, in trial order
pub fn default_cascade(
    config: &PdfConfig,
    unpaywall: Option<Arc<UnpaywallClient>>,
) -> Result<Vec<Arc<dyn PdfStrategy>>> {
    Ok(vec![
        Arc::new(DirectUrlStrategy),
        Arc::new(DoiResolveStrategy),
        Arc::new(ArxivStrategy::new()?),
        Arc::new(OpenAccessStrategy::new(unpaywall)),
        Arc::new(ScrapeStrategy::new(config)?),
    ])
}

/// The PDF URL the source metadata already carried
pub struct DirectUrlStrategy;

#[async_trait]
impl PdfStrategy for DirectUrlStrategy {
    fn name(&self) -> &'static str {
        "direct_url"
    }

    async fn candidates(&self, paper: &CanonicalPaper) -> Vec<String> {
        paper.pdf_url.iter().cloned().collect()
    }
}

/// Resolve the DOI and hope the publisher serves the PDF directly.
///
/// Works for open-access publishers; landing pages fail validation and
/// cost one cheap download attempt. PLOS DOIs get their printable-file
/// pattern as well.
pub struct DoiResolveStrategy;

#[async_trait]
impl PdfStrategy for DoiResolveStrategy {
    fn name(&self) -> &'static str {
        "doi_resolve"
    }

    async fn candidates(&self, paper: &CanonicalPaper) -> Vec<String> {
        let Some(doi) = &paper.doi else {
            return Vec::new();
        };
        let mut urls = vec![format!("https://doi.org/{}", doi)];
        if doi.starts_with("10.1371/") {
            urls.push(format!(
                "https://journals.plos.org/plosone/article/file?id={}&type=printable",
                doi
            ));
        }
        urls
    }
}

/// arXiv mirror URLs derived from the paper's arXiv identifier
pub struct ArxivStrategy {
    id_from_url: Regex,
}

impl ArxivStrategy {
    pub fn new() -> Result<Self> {
        // Modern and legacy id forms, optional version suffix
        let id_from_url = Regex::new(
            r"arxiv\.org/(?:abs|pdf)/([0-9]{4}\.[0-9]{4,5}(?:v[0-9]+)?|[a-z-]+/[0-9]{7}(?:v[0-9]+)?)",
        )
        .map_err(|e| Error::Parse {
            context: "arxiv id pattern".to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { id_from_url })
    }

    fn extract_id(&self, paper: &CanonicalPaper) -> Option<String> {
        if let Some(id) = paper.identifier(IdKind::Arxiv) {
            return Some(id.to_string());
        }
        for url in [&paper.paper_url, &paper.pdf_url].into_iter().flatten() {
            if let Some(capture) = self.id_from_url.captures(url) {
                return Some(normalize_arxiv_id(&capture[1]));
            }
        }
        None
    }
}

#[async_trait]
impl PdfStrategy for ArxivStrategy {
    fn name(&self) -> &'static str {
        "arxiv"
    }

    async fn candidates(&self, paper: &CanonicalPaper) -> Vec<String> {
        let Some(id) = self.extract_id(paper) else {
            return Vec::new();
        };
        vec![
            format!("https://arxiv.org/pdf/{}.pdf", id),
            format!("https://arxiv.org/pdf/{}v1.pdf", id),
            format!("https://export.arxiv.org/pdf/{}.pdf", id),
        ]
    }
}

/// Open-access locations: an Unpaywall lookup by DOI, then PubMed
/// Central render URLs for papers with a PMC id.
pub struct OpenAccessStrategy {
    unpaywall: Option<Arc<UnpaywallClient>>,
}

impl OpenAccessStrategy {
    pub fn new(unpaywall: Option<Arc<UnpaywallClient>>) -> Self {
        Self { unpaywall }
    }
}

#[async_trait]
impl PdfStrategy for OpenAccessStrategy {
    fn name(&self) -> &'static str {
        "open_access"
    }

    async fn candidates(&self, paper: &CanonicalPaper) -> Vec<String> {
        let mut urls = Vec::new();

        if let (Some(client), Some(doi)) = (&self.unpaywall, &paper.doi) {
            match client.pdf_url_for_doi(doi).await {
                Ok(Some(url)) => urls.push(url),
                Ok(None) => {}
                Err(error) => {
                    debug!(doi = %doi, %error, "unpaywall lookup failed");
                }
            }
        }

        if let Some(pmcid) = paper.identifier(IdKind::Pmcid) {
            let digits = pmcid.trim_start_matches("PMC");
            urls.push(format!(
                "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC{}/pdf/",
                digits
            ));
            urls.push(format!(
                "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC{}/pdf/main.pdf",
                digits
            ));
            urls.push(format!(
                "https://europepmc.org/articles/PMC{}?pdf=render",
                digits
            ));
        }

        urls
    }
}

/// Scrape the paper's landing page for `.pdf` links.
///
/// Known paywalled publisher domains are skipped outright; at most
/// `max_scrape_links` found links are proposed.
pub struct ScrapeStrategy {
    client: reqwest::Client,
    max_links: usize,
}

impl ScrapeStrategy {
    pub fn new(config: &PdfConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent(DOWNLOAD_USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            max_links: config.max_scrape_links,
        })
    }

    fn is_paywalled(url: &str) -> bool {
        let lowered = url.to_lowercase();
        PAYWALL_DOMAINS
            .iter()
            .any(|domain| lowered.contains(domain))
    }

    fn extract_pdf_links(html: &str, base: &url::Url, max_links: usize) -> Vec<String> {
        let Ok(selector) = scraper::Selector::parse("a[href]") else {
            return Vec::new();
        };
        let document = scraper::Html::parse_document(html);

        let mut links = Vec::new();
        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if !href.to_lowercase().ends_with(".pdf") {
                continue;
            }
            let Ok(resolved) = base.join(href) else {
                continue;
            };
            let resolved = resolved.to_string();
            if !links.contains(&resolved) {
                links.push(resolved);
            }
            if links.len() >= max_links {
                break;
            }
        }
        links
    }
}

#[async_trait]
impl PdfStrategy for ScrapeStrategy {
    fn name(&self) -> &'static str {
        "scrape"
    }

    async fn candidates(&self, paper: &CanonicalPaper) -> Vec<String> {
        let Some(page_url) = &paper.paper_url else {
            return Vec::new();
        };
        if Self::is_paywalled(page_url) {
            debug!(url = %page_url, "skipping paywalled landing page");
            return Vec::new();
        }
        let Ok(base) = url::Url::parse(page_url) else {
            return Vec::new();
        };

        let html = match self.client.get(page_url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(html) => html,
                Err(error) => {
                    debug!(url = %page_url, %error, "failed to read landing page");
                    return Vec::new();
                }
            },
            Ok(response) => {
                debug!(url = %page_url, status = %response.status(), "landing page fetch failed");
                return Vec::new();
            }
            Err(error) => {
                debug!(url = %page_url, %error, "landing page fetch failed");
                return Vec::new();
            }
        };

        Self::extract_pdf_links(&html, &base, self.max_links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::RawPaper;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn paper() -> CanonicalPaper {
        CanonicalPaper::from_raw(RawPaper {
            title: "Test Paper".to_string(),
            source: "arxiv".to_string(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_direct_url_passes_through_metadata_url() {
        let mut p = paper();
        p.pdf_url = Some("https://example.org/p.pdf".to_string());
        let urls = DirectUrlStrategy.candidates(&p).await;
        assert_eq!(urls, vec!["https://example.org/p.pdf"]);

        assert!(DirectUrlStrategy.candidates(&paper()).await.is_empty());
    }

    #[tokio::test]
    async fn test_doi_resolve_adds_plos_pattern() {
        let mut p = paper();
        p.doi = Some("10.1371/journal.pone.0001234".to_string());
        let urls = DoiResolveStrategy.candidates(&p).await;
        assert_eq!(urls[0], "https://doi.org/10.1371/journal.pone.0001234");
        assert!(urls[1].contains("journals.plos.org"));

        p.doi = Some("10.1038/xyz".to_string());
        assert_eq!(DoiResolveStrategy.candidates(&p).await.len(), 1);
    }

    #[tokio::test]
    async fn test_arxiv_candidates_from_identifier() {
        let mut p = paper();
        p.identifiers.insert(IdKind::Arxiv, "2301.00001".to_string());
        let urls = ArxivStrategy::new().unwrap().candidates(&p).await;
        assert_eq!(urls[0], "https://arxiv.org/pdf/2301.00001.pdf");
        assert_eq!(urls[1], "https://arxiv.org/pdf/2301.00001v1.pdf");
        assert_eq!(urls[2], "https://export.arxiv.org/pdf/2301.00001.pdf");
    }

    #[tokio::test]
    async fn test_arxiv_id_recovered_from_paper_url() {
        let mut p = paper();
        p.paper_url = Some("https://arxiv.org/abs/2105.12345v3".to_string());
        let urls = ArxivStrategy::new().unwrap().candidates(&p).await;
        assert_eq!(urls[0], "https://arxiv.org/pdf/2105.12345.pdf");

        let mut legacy = paper();
        legacy.paper_url = Some("https://arxiv.org/abs/hep-th/9901001".to_string());
        let urls = ArxivStrategy::new().unwrap().candidates(&legacy).await;
        assert_eq!(urls[0], "https://arxiv.org/pdf/hep-th/9901001.pdf");
    }

    #[tokio::test]
    async fn test_open_access_pmc_urls_without_unpaywall() {
        let mut p = paper();
        p.identifiers
            .insert(IdKind::Pmcid, "PMC7654321".to_string());
        let urls = OpenAccessStrategy::new(None).candidates(&p).await;
        assert_eq!(urls.len(), 3);
        assert!(urls[0].contains("/PMC7654321/pdf/"));
        assert!(urls[2].contains("europepmc.org/articles/PMC7654321?pdf=render"));
    }

    #[tokio::test]
    async fn test_scrape_skips_paywalled_domains() {
        let mut p = paper();
        p.paper_url = Some("https://www.sciencedirect.com/science/article/pii/S1".to_string());
        let strategy = ScrapeStrategy::new(&PdfConfig::default()).unwrap();
        assert!(strategy.candidates(&p).await.is_empty());
    }

    #[tokio::test]
    async fn test_scrape_collects_limited_pdf_links() {
        let server = MockServer::start().await;
        let html = r#"<html><body>
            <a href="/files/one.pdf">PDF</a>
            <a href="/about">About</a>
            <a href="https://cdn.example.org/two.PDF">mirror</a>
            <a href="/files/one.pdf">PDF again</a>
            <a href="/files/three.pdf">three</a>
            <a href="/files/four.pdf">four</a>
        </body></html>"#;
        Mock::given(method("GET"))
            .and(path("/article/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(&server)
            .await;

        let mut p = paper();
        p.paper_url = Some(format!("{}/article/1", server.uri()));
        let strategy = ScrapeStrategy::new(&PdfConfig::default()).unwrap();
        let urls = strategy.candidates(&p).await;

        assert_eq!(urls.len(), 3);
        assert_eq!(urls[0], format!("{}/files/one.pdf", server.uri()));
        assert_eq!(urls[1], "https://cdn.example.org/two.PDF");
        assert_eq!(urls[2], format!("{}/files/three.pdf", server.uri()));
    }

    #[tokio::test]
    async fn test_scrape_page_without_pdf_links_yields_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/article/2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><a href='/home'>home</a></html>"),
            )
            .mount(&server)
            .await;

        let mut p = paper();
        p.paper_url = Some(format!("{}/article/2", server.uri()));
        let strategy = ScrapeStrategy::new(&PdfConfig::default()).unwrap();
        assert!(strategy.candidates(&p).await.is_empty());
    }
}

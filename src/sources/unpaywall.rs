use super::traits::SourceError;
use super::user_agent;
use crate::config::SourcesConfig;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Unpaywall open-access location client.
///
/// Requires a contact e-mail; construction is skipped when none is
/// configured. This is a lookup helper for PDF discovery, not a search
/// source.
pub struct UnpaywallClient {
    client: Client,
    base_url: String,
    email: String,
}

#[derive(Debug, Deserialize)]
struct UnpaywallResponse {
    best_oa_location: Option<OaLocation>,
    oa_locations: Option<Vec<OaLocation>>,
}

#[derive(Debug, Deserialize)]
struct OaLocation {
    url_for_pdf: Option<String>,
}

impl UnpaywallClient {
    pub fn new(sources: &SourcesConfig, email: String) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(user_agent(sources))
            .build()
            .map_err(|e| SourceError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: "https://api.unpaywall.org/v2".to_string(),
            email,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Best open-access PDF URL for a DOI, if any is known
    pub async fn pdf_url_for_doi(&self, doi: &str) -> Result<Option<String>, SourceError> {
        let url = format!(
            "{}/{}?email={}",
            self.base_url,
            urlencoding::encode(doi),
            self.email
        );

        let response = self.client.get(&url).send().await?;
        match response.status().as_u16() {
            404 => return Ok(None),
            422 => return Ok(None), // Unpaywall rejects malformed DOIs with 422
            429 => return Err(SourceError::RateLimit),
            s if s >= 500 => return Err(SourceError::ServiceUnavailable(format!("HTTP {}", s))),
            _ => {}
        }

        let body: UnpaywallResponse = response.json().await?;
        let best = body
            .best_oa_location
            .and_then(|loc| loc.url_for_pdf)
            .or_else(|| {
                body.oa_locations
                    .unwrap_or_default()
                    .into_iter()
                    .find_map(|loc| loc.url_for_pdf)
            });

        debug!(doi = %doi, found = best.is_some(), "Unpaywall lookup");
        Ok(best)
    }
}

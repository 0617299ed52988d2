//! PDF acquisition: turn paper metadata into stored, validated PDFs.
//!
//! Each paper runs through a fixed cascade of location strategies; the
//! first candidate URL that downloads as a plausible PDF is persisted
//! to object storage under a stable, identifier-derived key. Failures
//! are per paper and never abort the batch.

pub mod strategies;

pub use strategies::{default_cascade, PdfStrategy};

use crate::config::PdfConfig;
use crate::paper::{normalize_title, CanonicalPaper, IdKind};
use crate::resilience::Deadline;
use crate::storage::ObjectStore;
use crate::Result;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

/// Downloads, validates, and stores PDFs for a batch of papers
#[derive(Clone)]
pub struct PdfAcquirer {
    config: PdfConfig,
    strategies: Vec<Arc<dyn PdfStrategy>>,
    client: reqwest::Client,
    store: Arc<dyn ObjectStore>,
}

impl PdfAcquirer {
    pub fn new(
        config: &PdfConfig,
        strategies: Vec<Arc<dyn PdfStrategy>>,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.download_timeout())
            .user_agent(strategies::DOWNLOAD_USER_AGENT)
            .build()?;
        Ok(Self {
            config: config.clone(),
            strategies,
            client,
            store,
        })
    }

    /// Acquire PDFs for every paper, bounded by `max_concurrent`.
    ///
    /// Input order is preserved. Papers whose acquisition fails come
    /// back unchanged with `pdf_content_url` still unset; the assembler
    /// decides what to do with them.
    #[instrument(skip_all, fields(papers = papers.len()))]
    pub async fn acquire_all(
        &self,
        papers: Vec<CanonicalPaper>,
        deadline: Deadline,
    ) -> Vec<CanonicalPaper> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
        let mut tasks = Vec::with_capacity(papers.len());
        for paper in papers {
            let acquirer = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return paper,
                };
                acquirer.acquire_one(paper, deadline).await
            }));
        }

        let mut acquired = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(paper) => acquired.push(paper),
                Err(error) => warn!(%error, "pdf acquisition task panicked"),
            }
        }
        acquired
    }

    async fn acquire_one(&self, mut paper: CanonicalPaper, deadline: Deadline) -> CanonicalPaper {
        if paper.pdf_content_url.is_some() {
            return paper;
        }
        let key = object_key(&paper);

        // A previous batch may already hold this paper's PDF
        match self.store.exists(&key).await {
            Ok(true) => {
                debug!(key = %key, "pdf already stored");
                paper.pdf_content_url = Some(self.store.url_for(&key));
                return paper;
            }
            Ok(false) => {}
            Err(error) => warn!(key = %key, %error, "storage existence check failed"),
        }

        for strategy in &self.strategies {
            if deadline.expired() {
                debug!(title = %paper.title, "deadline reached before a pdf was found");
                break;
            }
            let candidates = strategy.candidates(&paper).await;
            if candidates.is_empty() {
                continue;
            }
            debug!(
                strategy = strategy.name(),
                count = candidates.len(),
                title = %paper.title,
                "trying pdf candidates"
            );
            for url in candidates {
                if deadline.expired() {
                    break;
                }
                let Some(bytes) = self.try_download(&url).await else {
                    continue;
                };
                match self.store.put(&key, &bytes).await {
                    Ok(stored_url) => {
                        info!(
                            strategy = strategy.name(),
                            key = %key,
                            size = bytes.len(),
                            "pdf stored"
                        );
                        paper.pdf_content_url = Some(stored_url);
                    }
                    Err(error) => {
                        warn!(key = %key, %error, "pdf upload failed");
                    }
                }
                // Valid bytes end the cascade either way; a storage
                // failure leaves the paper PDF-less for this batch.
                return paper;
            }
        }
        debug!(title = %paper.title, "no strategy produced a valid pdf");
        paper
    }

    /// Download one candidate, enforcing the size cap while streaming.
    ///
    /// Any failure is logged at debug level and reported as a miss so
    /// the cascade moves on to the next candidate.
    async fn try_download(&self, url: &str) -> Option<Vec<u8>> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(error) => {
                debug!(url = %url, %error, "download request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(url = %url, status = %response.status(), "download rejected");
            return None;
        }
        if let Some(length) = response.content_length() {
            if length > self.config.max_size_bytes {
                debug!(url = %url, length, "content length above limit");
                return None;
            }
        }

        let mut bytes: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(error) => {
                    debug!(url = %url, %error, "download stream failed");
                    return None;
                }
            };
            bytes.extend_from_slice(&chunk);
            if bytes.len() as u64 > self.config.max_size_bytes {
                debug!(url = %url, "download exceeded size limit");
                return None;
            }
        }

        match validate(&bytes, &self.config) {
            Ok(()) => Some(bytes),
            Err(reason) => {
                debug!(url = %url, reason, size = bytes.len(), "candidate rejected");
                None
            }
        }
    }
}

/// Check that downloaded bytes look like a real PDF document
fn validate(bytes: &[u8], config: &PdfConfig) -> std::result::Result<(), &'static str> {
    if (bytes.len() as u64) < config.min_size_bytes {
        return Err("below minimum size");
    }
    if bytes.len() as u64 > config.max_size_bytes {
        return Err("above maximum size");
    }
    if !bytes.starts_with(b"%PDF") {
        return Err("missing pdf magic bytes");
    }
    Ok(())
}

/// Storage key for a paper's PDF, stable across batches.
///
/// Derived from the strongest identifier available so the same paper
/// always lands on the same object. Titleless, identifierless papers
/// fall back to a random key; in practice every paper has a title.
pub fn object_key(paper: &CanonicalPaper) -> String {
    if let Some(doi) = &paper.doi {
        return format!("doi_{}.pdf", sanitize_key(doi));
    }
    if let Some(id) = paper.identifier(IdKind::Arxiv) {
        return format!("arxiv_{}.pdf", sanitize_key(id));
    }
    if let Some(id) = paper.identifier(IdKind::Pmid) {
        return format!("pmid_{}.pdf", sanitize_key(id));
    }
    if let Some(id) = paper.identifier(IdKind::SemanticScholar) {
        return format!("ss_{}.pdf", sanitize_key(id));
    }
    let normalized = normalize_title(&paper.title);
    if !normalized.is_empty() {
        let digest = Sha256::digest(normalized.as_bytes());
        let hex: String = digest.iter().take(16).map(|b| format!("{b:02x}")).collect();
        return format!("title_{}.pdf", hex);
    }
    format!("paper_{}.pdf", uuid::Uuid::new_v4())
}

fn sanitize_key(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | ':' | ' ' => '_',
            other => other,
        })
        .collect()
}

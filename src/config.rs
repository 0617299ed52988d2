use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Immutable service configuration, built once at startup and threaded
/// through the pipeline as `Arc<Config>`.
///
/// Layering: built-in defaults, then an optional TOML file, then
/// environment variables (`SCHOLAR_` prefix, `__` section separator,
/// e.g. `SCHOLAR_SERVER__PORT=9090`), then CLI overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub search: SearchConfig,
    pub sources: SourcesConfig,
    pub enrichment: EnrichmentConfig,
    pub pdf: PdfConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Overall deadline for one search request, in seconds
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Results requested from each source per round
    pub papers_per_source: u32,
    /// Batch size used when a request does not specify one
    pub default_batch_size: u32,
    /// Upper bound on the requested batch size
    pub max_batch_size: u32,
    /// Search rounds ceiling; rounds after the first use refined queries
    pub max_rounds: u32,
    /// Candidates collected per requested paper before PDF acquisition,
    /// anticipating acquisition losses
    pub pdf_compensation_factor: f64,
    /// Sources queried concurrently during fanout
    pub max_parallel_sources: usize,
    /// Per-source search timeout, in seconds
    pub source_timeout_secs: u64,
    /// Retries of a source that reports rate limiting
    pub max_rate_limit_retries: u32,
    /// Initial backoff after a rate-limit response, in seconds
    pub rate_limit_backoff_secs: u64,
    /// Order surviving papers by query-term relevance instead of fanout order
    pub relevance_ranking: bool,
    /// Restrict results to the last N years when set
    pub recent_years: Option<u32>,
    /// Ask the configured query refiner for extra rounds
    pub enable_refinement: bool,
    /// Refined queries requested per extra round
    pub max_refined_queries: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            papers_per_source: 5,
            default_batch_size: 5,
            max_batch_size: 50,
            max_rounds: 2,
            pdf_compensation_factor: 2.0,
            max_parallel_sources: 5,
            source_timeout_secs: 30,
            max_rate_limit_retries: 2,
            rate_limit_backoff_secs: 2,
            relevance_ranking: true,
            recent_years: None,
            enable_refinement: false,
            max_refined_queries: 3,
        }
    }
}

impl SearchConfig {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_secs(self.rate_limit_backoff_secs)
    }

    /// Number of candidates to collect before PDF acquisition
    pub fn collection_target(&self, batch_size: u32) -> usize {
        let target = (f64::from(batch_size) * self.pdf_compensation_factor).ceil();
        target as usize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Fanout sources in registration order
    pub enabled: Vec<String>,
    /// Contact e-mail embedded in the user agent and polite-pool params
    pub contact_email: Option<String>,
    /// CORE requires an API key; the source is skipped without one
    pub core_api_key: Option<String>,
    pub semantic_scholar_api_key: Option<String>,
    /// Unpaywall requires a contact e-mail; lookups are skipped without one
    pub unpaywall_email: Option<String>,
    /// Requests per second per source, keyed by source name
    pub rates: HashMap<String, f64>,
    /// Pacing applied to sources without an explicit rate
    pub default_rate: f64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            enabled: vec![
                "arxiv".to_string(),
                "pubmed".to_string(),
                "openalex".to_string(),
                "core".to_string(),
                "europe_pmc".to_string(),
            ],
            contact_email: None,
            core_api_key: None,
            semantic_scholar_api_key: None,
            unpaywall_email: None,
            rates: HashMap::new(),
            default_rate: 1.0,
        }
    }
}

impl SourcesConfig {
    pub fn rate_for(&self, source: &str) -> f64 {
        self.rates.get(source).copied().unwrap_or(self.default_rate)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Papers enriched in parallel
    pub max_concurrent: usize,
    /// Lookup providers in priority order
    pub lookup_order: Vec<String>,
    /// Consult a Crossref title search for papers with no usable identifier
    pub title_fallback: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            lookup_order: vec![
                "crossref".to_string(),
                "arxiv".to_string(),
                "semantic_scholar".to_string(),
            ],
            title_fallback: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// Papers whose PDFs are acquired in parallel
    pub max_concurrent: usize,
    /// Smallest byte size accepted as a real PDF
    pub min_size_bytes: u64,
    /// Largest byte size accepted
    pub max_size_bytes: u64,
    /// Per-download timeout, in seconds
    pub download_timeout_secs: u64,
    /// Drop papers without a stored PDF from the final batch; when false
    /// they are kept with a null content URL
    pub require_pdf: bool,
    /// Candidate links tried per scraped landing page
    pub max_scrape_links: usize,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            min_size_bytes: 1024,
            max_size_bytes: 50 * 1024 * 1024,
            download_timeout_secs: 15,
            require_pdf: true,
            max_scrape_links: 3,
        }
    }
}

impl PdfConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Store PDFs under a local directory (default)
    Filesystem,
    /// Keep PDFs in memory; testing only
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for the filesystem backend
    pub directory: PathBuf,
    /// Optional prefix prepended to every storage key
    pub key_prefix: String,
    /// Base URL reported for stored objects; file paths when unset
    pub public_base_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Filesystem,
            directory: PathBuf::from("./papers"),
            key_prefix: String::new(),
            public_base_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            search: SearchConfig::default(),
            sources: SourcesConfig::default(),
            enrichment: EnrichmentConfig::default(),
            pdf: PdfConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with full layering and validate it
    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("SCHOLAR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut cfg: Config = builder.build()?.try_deserialize()?;
        overrides.apply(&mut cfg);
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("server.port", "must be non-zero"));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(invalid("server.request_timeout_secs", "must be positive"));
        }
        if self.search.default_batch_size == 0 {
            return Err(invalid("search.default_batch_size", "must be positive"));
        }
        if self.search.default_batch_size > self.search.max_batch_size {
            return Err(invalid(
                "search.default_batch_size",
                "must not exceed search.max_batch_size",
            ));
        }
        if self.search.max_rounds == 0 {
            return Err(invalid("search.max_rounds", "must be positive"));
        }
        if self.search.pdf_compensation_factor < 1.0 {
            return Err(invalid(
                "search.pdf_compensation_factor",
                "must be at least 1.0",
            ));
        }
        if self.search.max_parallel_sources == 0 {
            return Err(invalid("search.max_parallel_sources", "must be positive"));
        }
        if self.search.source_timeout_secs == 0 {
            return Err(invalid("search.source_timeout_secs", "must be positive"));
        }
        if self.sources.enabled.is_empty() {
            return Err(invalid("sources.enabled", "at least one source required"));
        }
        if self.sources.default_rate <= 0.0 {
            return Err(invalid("sources.default_rate", "must be positive"));
        }
        if let Some((name, rate)) = self
            .sources
            .rates
            .iter()
            .find(|(_, rate)| **rate <= 0.0)
        {
            return Err(invalid(
                "sources.rates",
                &format!("rate for '{}' must be positive, got {}", name, rate),
            ));
        }
        if self.enrichment.max_concurrent == 0 {
            return Err(invalid("enrichment.max_concurrent", "must be positive"));
        }
        if self.pdf.max_concurrent == 0 {
            return Err(invalid("pdf.max_concurrent", "must be positive"));
        }
        if self.pdf.min_size_bytes >= self.pdf.max_size_bytes {
            return Err(invalid(
                "pdf.min_size_bytes",
                "must be smaller than pdf.max_size_bytes",
            ));
        }
        if self.storage.backend == StorageBackend::Filesystem
            && self.storage.directory.as_os_str().is_empty()
        {
            return Err(invalid("storage.directory", "must not be empty"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

fn invalid(field: &str, reason: &str) -> Error {
    Error::InvalidInput {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// CLI-level overrides applied after file and environment layers
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub storage_directory: Option<PathBuf>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(dir) = &self.storage_directory {
            config.storage.directory = dir.clone();
        }
    }
}

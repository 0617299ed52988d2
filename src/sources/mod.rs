pub mod arxiv;
pub mod core;
pub mod crossref;
pub mod europe_pmc;
pub mod openalex;
pub mod pubmed;
pub mod semantic_scholar;
pub mod traits;
pub mod unpaywall;

pub use arxiv::ArxivAdapter;
pub use core::CoreAdapter;
pub use crossref::CrossrefAdapter;
pub use europe_pmc::EuropePmcAdapter;
pub use openalex::OpenAlexAdapter;
pub use pubmed::PubMedAdapter;
pub use semantic_scholar::SemanticScholarAdapter;
pub use traits::{FieldValue, LookupId, SearchQuery, SourceAdapter, SourceError};
pub use unpaywall::UnpaywallClient;

use crate::config::Config;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// User agent applied to all outbound API calls; carries the contact
/// address when one is configured, per API etiquette guidelines.
pub fn user_agent(sources: &crate::config::SourcesConfig) -> String {
    match &sources.contact_email {
        Some(email) => format!(
            "scholar-harvester/{} (mailto:{})",
            env!("CARGO_PKG_VERSION"),
            email
        ),
        None => format!("scholar-harvester/{}", env!("CARGO_PKG_VERSION")),
    }
}

/// The set of constructed source adapters for one service instance.
///
/// `searchers` drive the fanout in registration order; `lookups` drive
/// enrichment in configured priority order. The same adapter may appear
/// in both roles.
pub struct SourceRegistry {
    searchers: Vec<Arc<dyn SourceAdapter>>,
    lookups: Vec<Arc<dyn SourceAdapter>>,
    unpaywall: Option<Arc<UnpaywallClient>>,
}

impl SourceRegistry {
    /// Build every adapter named in the configuration.
    ///
    /// Sources that need credentials are skipped with a warning when the
    /// credentials are absent; an unknown source name is a config error.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut constructed: BTreeMap<String, Arc<dyn SourceAdapter>> = BTreeMap::new();

        let wanted: Vec<&String> = config
            .sources
            .enabled
            .iter()
            .chain(config.enrichment.lookup_order.iter())
            .collect();
        for name in wanted {
            if constructed.contains_key(name) {
                continue;
            }
            if let Some(adapter) = build_adapter(name, config)? {
                constructed.insert(name.clone(), adapter);
            }
        }

        let searchers: Vec<Arc<dyn SourceAdapter>> = config
            .sources
            .enabled
            .iter()
            .filter_map(|name| constructed.get(name).cloned())
            .collect();
        let lookups: Vec<Arc<dyn SourceAdapter>> = config
            .enrichment
            .lookup_order
            .iter()
            .filter_map(|name| constructed.get(name).cloned())
            .collect();

        let unpaywall = match &config.sources.unpaywall_email {
            Some(email) => Some(Arc::new(UnpaywallClient::new(
                &config.sources,
                email.clone(),
            )?)),
            None => {
                info!("Unpaywall disabled: no contact e-mail configured");
                None
            }
        };

        info!(
            sources = ?searchers.iter().map(|s| s.name()).collect::<Vec<_>>(),
            lookups = ?lookups.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "Source registry ready"
        );

        Ok(Self {
            searchers,
            lookups,
            unpaywall,
        })
    }

    /// Assemble a registry from already-built adapters
    pub fn new(
        searchers: Vec<Arc<dyn SourceAdapter>>,
        lookups: Vec<Arc<dyn SourceAdapter>>,
        unpaywall: Option<Arc<UnpaywallClient>>,
    ) -> Self {
        Self {
            searchers,
            lookups,
            unpaywall,
        }
    }

    /// Fanout sources in registration order
    pub fn searchers(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.searchers
    }

    /// Enrichment lookup providers in priority order
    pub fn lookups(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.lookups
    }

    pub fn unpaywall(&self) -> Option<Arc<UnpaywallClient>> {
        self.unpaywall.clone()
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.searchers.iter().map(|s| s.name()).collect()
    }
}

fn build_adapter(name: &str, config: &Config) -> Result<Option<Arc<dyn SourceAdapter>>> {
    let sources = &config.sources;
    let adapter: Arc<dyn SourceAdapter> = match name {
        "arxiv" => Arc::new(ArxivAdapter::new(sources)?),
        "pubmed" => Arc::new(PubMedAdapter::new(sources)?),
        "openalex" => Arc::new(OpenAlexAdapter::new(sources)?),
        "europe_pmc" => Arc::new(EuropePmcAdapter::new(sources)?),
        "crossref" => Arc::new(CrossrefAdapter::new(sources)?),
        "semantic_scholar" => Arc::new(SemanticScholarAdapter::new(sources)?),
        "core" => match &sources.core_api_key {
            Some(key) => Arc::new(CoreAdapter::new(sources, key.clone())?),
            None => {
                warn!("CORE source skipped: no API key configured");
                return Ok(None);
            }
        },
        other => {
            return Err(Error::InvalidInput {
                field: "sources.enabled".to_string(),
                reason: format!("unknown source '{}'", other),
            })
        }
    };
    Ok(Some(adapter))
}

use crate::config::EnrichmentConfig;
use crate::paper::{CanonicalPaper, IdKind, MandatoryField, RawPaper};
use crate::resilience::{Deadline, SourcePacer, TimeoutExt};
use crate::sources::{FieldValue, LookupId, SourceAdapter};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Budget for a single metadata lookup call
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Fills missing mandatory fields from configured lookup providers.
///
/// Providers are consulted in priority order; each one is asked for a
/// full record via the strongest identifier it recognizes, and every
/// still-missing field the record can answer is adopted. A field is
/// therefore always filled by the earliest provider that had a value
/// for it. Lookup failures are non-fatal and advance to the next
/// provider. Papers are enriched independently and concurrently, with
/// completed work preserved when the request deadline expires mid-stage.
pub struct Enricher {
    config: EnrichmentConfig,
    providers: Vec<Arc<dyn SourceAdapter>>,
    pacer: Arc<SourcePacer>,
}

impl Enricher {
    pub fn new(
        config: EnrichmentConfig,
        providers: Vec<Arc<dyn SourceAdapter>>,
        pacer: Arc<SourcePacer>,
    ) -> Self {
        Self {
            config,
            providers,
            pacer,
        }
    }

    /// Enrich a batch, preserving input order
    pub async fn enrich_all(
        &self,
        papers: Vec<CanonicalPaper>,
        deadline: Deadline,
    ) -> Vec<CanonicalPaper> {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.max_concurrent));

        let mut tasks = Vec::new();
        for paper in papers {
            let semaphore = semaphore.clone();
            let providers = self.providers.clone();
            let pacer = self.pacer.clone();
            let title_fallback = self.config.title_fallback;

            tasks.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return paper;
                };
                enrich_one(paper, &providers, &pacer, title_fallback, deadline).await
            }));
        }

        let mut enriched = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(paper) => enriched.push(paper),
                Err(join_error) => {
                    // A panicked task loses that paper's enrichment, not the batch
                    warn!(%join_error, "enrichment task panicked");
                }
            }
        }
        enriched
    }
}

async fn enrich_one(
    mut paper: CanonicalPaper,
    providers: &[Arc<dyn SourceAdapter>],
    pacer: &SourcePacer,
    title_fallback: bool,
    deadline: Deadline,
) -> CanonicalPaper {
    let mut gap = paper.missing_mandatory();
    if gap.is_empty() {
        return paper;
    }

    let ids = candidate_ids(&paper, title_fallback);
    if ids.is_empty() {
        debug!(title = %paper.title, "no usable identifier for enrichment");
        return paper;
    }

    for provider in providers {
        if gap.is_empty() || deadline.expired() {
            break;
        }

        match fetch_record(provider.as_ref(), &ids, pacer, deadline).await {
            Some(record) => {
                let filled = fill_missing(&mut paper, &mut gap, &record);
                if filled > 0 {
                    debug!(
                        title = %paper.title,
                        provider = provider.name(),
                        filled,
                        "adopted fields from lookup"
                    );
                }
            }
            None => continue,
        }
    }

    if !gap.is_empty() {
        debug!(
            title = %paper.title,
            missing = ?gap.iter().map(|f| f.as_str()).collect::<Vec<_>>(),
            "fields remain unfilled after all lookups"
        );
    }
    paper
}

/// Ask one provider for a record, trying identifiers strongest-first.
///
/// An identifier the provider does not recognize comes back as a cheap
/// miss; transport errors are logged and skipped.
async fn fetch_record(
    provider: &dyn SourceAdapter,
    ids: &[LookupId],
    pacer: &SourcePacer,
    deadline: Deadline,
) -> Option<RawPaper> {
    for id in ids {
        let budget = deadline.clamp(LOOKUP_TIMEOUT);
        if budget.is_zero() {
            return None;
        }
        pacer.acquire(provider.name()).await;
        match provider.fetch(id).with_timeout_duration(budget).await {
            Ok(Ok(Some(record))) => return Some(record),
            Ok(Ok(None)) => continue,
            Ok(Err(error)) => {
                warn!(provider = provider.name(), %error, "lookup failed");
                continue;
            }
            Err(_) => {
                warn!(provider = provider.name(), "lookup timed out");
                return None;
            }
        }
    }
    None
}

/// Identifiers usable for lookups, strongest evidence first
fn candidate_ids(paper: &CanonicalPaper, title_fallback: bool) -> Vec<LookupId> {
    let mut ids = Vec::new();
    if let Some(doi) = &paper.doi {
        ids.push(LookupId::Doi(doi.clone()));
    }
    if let Some(id) = paper.identifier(IdKind::Arxiv) {
        ids.push(LookupId::Arxiv(id.to_string()));
    }
    if let Some(id) = paper.identifier(IdKind::SemanticScholar) {
        ids.push(LookupId::SemanticScholar(id.to_string()));
    }
    if let Some(id) = paper.identifier(IdKind::Pmid) {
        ids.push(LookupId::Pmid(id.to_string()));
    }
    if ids.is_empty() && title_fallback && !paper.title.trim().is_empty() {
        ids.push(LookupId::Title(paper.title.clone()));
    }
    ids
}

/// Adopt every still-missing field the record can answer; returns how
/// many were filled. Malformed values (bad dates, blank abstracts) are
/// treated as absent.
fn fill_missing(
    paper: &mut CanonicalPaper,
    gap: &mut Vec<MandatoryField>,
    record: &RawPaper,
) -> usize {
    let before = gap.len();
    gap.retain(|field| match FieldValue::from_raw(record, *field) {
        Some(value) => {
            apply_field(paper, *field, value);
            false
        }
        None => true,
    });
    before - gap.len()
}

fn apply_field(paper: &mut CanonicalPaper, field: MandatoryField, value: FieldValue) {
    match (field, value) {
        (MandatoryField::Doi, FieldValue::Text(doi)) => paper.doi = Some(doi),
        (MandatoryField::Abstract, FieldValue::Text(text)) => paper.abstract_text = Some(text),
        (MandatoryField::Authors, FieldValue::Authors(authors)) => paper.authors = authors,
        (MandatoryField::PublicationDate, FieldValue::Date(date)) => {
            paper.publication_date = Some(date);
        }
        _ => {}
    }
}

use crate::paper::{normalize_title, CanonicalPaper, IdKind, RawPaper};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Default Jaro-Winkler similarity above which two normalized titles are
/// considered the same work when no strong identifier links them.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.93;

/// Identity evidence strong enough for exact-match merging
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum IdentityKey {
    Doi(String),
    Arxiv(String),
    Pmcid(String),
}

/// Counters reported alongside the merged batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupStats {
    pub unique_papers: usize,
    /// Distinct strong identity keys registered across the batch
    pub total_identifiers: usize,
    pub duplicates_removed: usize,
}

/// Merges raw search hits into canonical papers.
///
/// The identity index lives for one `merge` call only: weak title
/// matching never reaches across batches. Input order determines both
/// output order and which value wins a field conflict (first-seen
/// non-null), so the result is deterministic for a fixed input order.
pub struct Deduplicator {
    similarity_threshold: f64,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl Deduplicator {
    #[must_use]
    pub const fn new(similarity_threshold: f64) -> Self {
        Self {
            similarity_threshold,
        }
    }

    /// Merge a batch of raw hits into canonical papers plus counters
    pub fn merge(&self, raw_papers: Vec<RawPaper>) -> (Vec<CanonicalPaper>, DedupStats) {
        let total_input = raw_papers.len();
        let mut canonicals: Vec<CanonicalPaper> = Vec::new();
        let mut index: HashMap<IdentityKey, usize> = HashMap::new();

        for raw in raw_papers {
            let incoming = CanonicalPaper::from_raw(raw);
            let keys = strong_keys(&incoming);

            let slot = keys
                .iter()
                .find_map(|key| index.get(key).copied())
                .or_else(|| self.weak_match(&canonicals, &incoming));

            match slot {
                Some(i) => {
                    debug!(
                        title = %incoming.title,
                        source = %incoming.source,
                        "merging duplicate into existing canonical"
                    );
                    merge_into(&mut canonicals[i], incoming);
                    // Newly learned keys point at the matched slot; keys
                    // already registered elsewhere keep their mapping
                    for key in keys {
                        index.entry(key).or_insert(i);
                    }
                }
                None => {
                    let i = canonicals.len();
                    for key in &keys {
                        index.insert(key.clone(), i);
                    }
                    canonicals.push(incoming);
                }
            }
        }

        let stats = DedupStats {
            unique_papers: canonicals.len(),
            total_identifiers: index.len(),
            duplicates_removed: total_input - canonicals.len(),
        };
        (canonicals, stats)
    }

    /// Fuzzy signature match: normalized-title similarity gated on the
    /// first author's surname when both sides have one.
    fn weak_match(&self, canonicals: &[CanonicalPaper], incoming: &CanonicalPaper) -> Option<usize> {
        let incoming_title = normalize_title(&incoming.title);
        if incoming_title.is_empty() {
            return None;
        }
        let incoming_surname = first_author_surname(&incoming.authors);

        canonicals.iter().position(|existing| {
            let existing_title = normalize_title(&existing.title);
            let titles_match = existing_title == incoming_title
                || strsim::jaro_winkler(&existing_title, &incoming_title)
                    >= self.similarity_threshold;
            if !titles_match {
                return false;
            }
            match (first_author_surname(&existing.authors), &incoming_surname) {
                (Some(a), Some(b)) => a == *b,
                // Either side missing authors cannot contradict the title
                _ => true,
            }
        })
    }
}

fn strong_keys(paper: &CanonicalPaper) -> Vec<IdentityKey> {
    let mut keys = Vec::new();
    if let Some(doi) = &paper.doi {
        keys.push(IdentityKey::Doi(doi.clone()));
    }
    if let Some(id) = paper.identifier(IdKind::Arxiv) {
        keys.push(IdentityKey::Arxiv(id.to_string()));
    }
    if let Some(id) = paper.identifier(IdKind::Pmcid) {
        keys.push(IdentityKey::Pmcid(id.to_uppercase()));
    }
    keys
}

fn first_author_surname(authors: &[String]) -> Option<String> {
    let name = authors.first()?.trim();
    if name.is_empty() {
        return None;
    }
    let surname = match name.split_once(',') {
        Some((last, _)) => last,
        None => name.rsplit(' ').next()?,
    };
    let surname = surname.trim();
    if surname.is_empty() {
        None
    } else {
        Some(surname.to_lowercase())
    }
}

/// Field-level reconciliation: scalars keep the first-seen non-null
/// value, lists union in first-seen order, `source` stays the first
/// contributor.
fn merge_into(existing: &mut CanonicalPaper, incoming: CanonicalPaper) {
    adopt_if_missing(&mut existing.doi, incoming.doi);
    adopt_if_missing(&mut existing.abstract_text, incoming.abstract_text);
    adopt_if_missing(&mut existing.publication_date, incoming.publication_date);
    adopt_if_missing(&mut existing.venue, incoming.venue);
    adopt_if_missing(&mut existing.publisher, incoming.publisher);
    adopt_if_missing(&mut existing.citation_count, incoming.citation_count);
    adopt_if_missing(&mut existing.is_open_access, incoming.is_open_access);
    adopt_if_missing(&mut existing.paper_url, incoming.paper_url);
    adopt_if_missing(&mut existing.pdf_url, incoming.pdf_url);
    adopt_if_missing(&mut existing.pdf_content_url, incoming.pdf_content_url);

    if existing.authors.is_empty() {
        existing.authors = incoming.authors;
    } else {
        for author in incoming.authors {
            if !existing
                .authors
                .iter()
                .any(|a| a.eq_ignore_ascii_case(&author))
            {
                existing.authors.push(author);
            }
        }
    }

    for (kind, value) in incoming.identifiers {
        existing.identifiers.entry(kind).or_insert(value);
    }

    for origin in incoming.origins {
        if !existing.origins.contains(&origin) {
            existing.origins.push(origin);
        }
    }
}

fn adopt_if_missing<T>(existing: &mut Option<T>, incoming: Option<T>) {
    if existing.is_none() {
        *existing = incoming;
    }
}

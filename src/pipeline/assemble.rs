use crate::config::{PdfConfig, SearchConfig};
use crate::paper::CanonicalPaper;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Terminal state of one search request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchStatus {
    /// The requested batch size was delivered in full
    Completed,
    /// Some papers were delivered, but fewer than requested or the
    /// deadline cut the pipeline short
    Partial,
    /// No paper survived the pipeline
    Empty,
}

/// The final batch plus what the assembler did to produce it
#[derive(Debug)]
pub struct AssembledBatch {
    pub papers: Vec<CanonicalPaper>,
    pub status: SearchStatus,
    /// Papers discarded for lacking a stored PDF
    pub dropped_without_pdf: usize,
}

/// Final pipeline stage: filter, rank, truncate, classify.
pub struct ResultAssembler {
    relevance_ranking: bool,
    require_pdf: bool,
}

impl ResultAssembler {
    pub fn new(search: &SearchConfig, pdf: &PdfConfig) -> Self {
        Self {
            relevance_ranking: search.relevance_ranking,
            require_pdf: pdf.require_pdf,
        }
    }

    /// Shape the acquired papers into the delivered batch.
    ///
    /// Papers without a stored PDF are dropped when the configuration
    /// demands one. Survivors are ranked by query-term relevance (a
    /// stable sort, so equal scores keep pipeline order) and truncated
    /// to the requested batch size.
    pub fn assemble(
        &self,
        papers: Vec<CanonicalPaper>,
        query_terms: &[String],
        batch_size: u32,
        deadline_hit: bool,
    ) -> AssembledBatch {
        let before = papers.len();
        let mut papers: Vec<CanonicalPaper> = if self.require_pdf {
            papers
                .into_iter()
                .filter(|p| p.pdf_content_url.is_some())
                .collect()
        } else {
            papers
        };
        let dropped_without_pdf = before - papers.len();
        if dropped_without_pdf > 0 {
            debug!(dropped = dropped_without_pdf, "papers dropped without a pdf");
        }

        if self.relevance_ranking && !papers.is_empty() {
            let mut scored: Vec<(usize, CanonicalPaper)> = papers
                .into_iter()
                .map(|p| (relevance_score(&p, query_terms), p))
                .collect();
            scored.sort_by(|a, b| b.0.cmp(&a.0));
            papers = scored.into_iter().map(|(_, p)| p).collect();
        }

        papers.truncate(batch_size as usize);

        let status = if papers.is_empty() {
            SearchStatus::Empty
        } else if (papers.len() as u32) < batch_size || deadline_hit {
            SearchStatus::Partial
        } else {
            SearchStatus::Completed
        };

        if status != SearchStatus::Completed {
            warn!(
                delivered = papers.len(),
                requested = batch_size,
                deadline_hit,
                "batch under-fulfilled"
            );
        }

        AssembledBatch {
            papers,
            status,
            dropped_without_pdf,
        }
    }
}

/// Occurrences of the query terms in title plus abstract, case-insensitive
fn relevance_score(paper: &CanonicalPaper, terms: &[String]) -> usize {
    let haystack = match &paper.abstract_text {
        Some(abstract_text) => format!("{} {}", paper.title, abstract_text).to_lowercase(),
        None => paper.title.to_lowercase(),
    };
    terms
        .iter()
        .map(|term| {
            let term = term.to_lowercase();
            if term.is_empty() {
                0
            } else {
                haystack.matches(&term).count()
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::RawPaper;

    fn paper(title: &str, abstract_text: Option<&str>, with_pdf: bool) -> CanonicalPaper {
        let mut p = CanonicalPaper::from_raw(RawPaper {
            title: title.to_string(),
            source: "arxiv".to_string(),
            abstract_text: abstract_text.map(str::to_string),
            ..Default::default()
        });
        if with_pdf {
            p.pdf_content_url = Some(format!("memory://{}.pdf", title));
        }
        p
    }

    fn assembler(relevance_ranking: bool, require_pdf: bool) -> ResultAssembler {
        let mut search = SearchConfig::default();
        search.relevance_ranking = relevance_ranking;
        let mut pdf = PdfConfig::default();
        pdf.require_pdf = require_pdf;
        ResultAssembler::new(&search, &pdf)
    }

    fn terms(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_papers_without_pdf_are_dropped() {
        let batch = assembler(false, true).assemble(
            vec![
                paper("kept", None, true),
                paper("dropped", None, false),
                paper("also kept", None, true),
            ],
            &terms(&["kept"]),
            5,
            false,
        );
        assert_eq!(batch.papers.len(), 2);
        assert_eq!(batch.dropped_without_pdf, 1);
        assert!(batch.papers.iter().all(|p| p.pdf_content_url.is_some()));
    }

    #[test]
    fn test_pdfless_papers_survive_when_not_required() {
        let batch = assembler(false, false).assemble(
            vec![paper("no pdf", None, false)],
            &terms(&["pdf"]),
            5,
            false,
        );
        assert_eq!(batch.papers.len(), 1);
        assert!(batch.papers[0].pdf_content_url.is_none());
        assert_eq!(batch.dropped_without_pdf, 0);
    }

    #[test]
    fn test_relevance_ranking_orders_by_term_occurrences() {
        let batch = assembler(true, true).assemble(
            vec![
                paper("graphs in practice", Some("about networks"), true),
                paper(
                    "transformer survey",
                    Some("transformer models and transformer training"),
                    true,
                ),
                paper("a transformer note", None, true),
            ],
            &terms(&["transformer"]),
            5,
            false,
        );
        assert_eq!(batch.papers[0].title, "transformer survey");
        assert_eq!(batch.papers[1].title, "a transformer note");
        assert_eq!(batch.papers[2].title, "graphs in practice");
    }

    #[test]
    fn test_equal_scores_keep_pipeline_order() {
        let batch = assembler(true, true).assemble(
            vec![
                paper("first match", None, true),
                paper("second match", None, true),
            ],
            &terms(&["match"]),
            5,
            false,
        );
        assert_eq!(batch.papers[0].title, "first match");
        assert_eq!(batch.papers[1].title, "second match");
    }

    #[test]
    fn test_ranking_disabled_keeps_input_order() {
        let batch = assembler(false, true).assemble(
            vec![
                paper("irrelevant", None, true),
                paper("match match match", None, true),
            ],
            &terms(&["match"]),
            5,
            false,
        );
        assert_eq!(batch.papers[0].title, "irrelevant");
    }

    #[test]
    fn test_truncates_to_batch_size() {
        let papers: Vec<CanonicalPaper> =
            (0..6).map(|i| paper(&format!("p{}", i), None, true)).collect();
        let batch = assembler(false, true).assemble(papers, &terms(&["p"]), 2, false);
        assert_eq!(batch.papers.len(), 2);
        assert_eq!(batch.papers[0].title, "p0");
        assert_eq!(batch.status, SearchStatus::Completed);
    }

    #[test]
    fn test_status_classification() {
        let full = assembler(false, true).assemble(
            vec![paper("a", None, true), paper("b", None, true)],
            &terms(&["a"]),
            2,
            false,
        );
        assert_eq!(full.status, SearchStatus::Completed);

        let partial = assembler(false, true).assemble(
            vec![paper("a", None, true)],
            &terms(&["a"]),
            2,
            false,
        );
        assert_eq!(partial.status, SearchStatus::Partial);

        let empty =
            assembler(false, true).assemble(Vec::new(), &terms(&["a"]), 2, false);
        assert_eq!(empty.status, SearchStatus::Empty);
    }

    #[test]
    fn test_deadline_hit_forces_partial_even_when_full() {
        let batch = assembler(false, true).assemble(
            vec![paper("a", None, true), paper("b", None, true)],
            &terms(&["a"]),
            2,
            true,
        );
        assert_eq!(batch.status, SearchStatus::Partial);
    }

    #[test]
    fn test_blank_query_term_scores_zero() {
        let batch = assembler(true, true).assemble(
            vec![paper("anything", None, true)],
            &terms(&[""]),
            1,
            false,
        );
        assert_eq!(batch.papers.len(), 1);
        assert_eq!(batch.status, SearchStatus::Completed);
    }

    #[test]
    fn test_status_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&SearchStatus::Completed).unwrap(),
            "\"COMPLETED\""
        );
        assert_eq!(
            serde_json::to_string(&SearchStatus::Partial).unwrap(),
            "\"PARTIAL\""
        );
    }
}

use crate::config::SearchConfig;
use crate::paper::CanonicalPaper;
use crate::pipeline::{DedupStats, PipelineOutcome, SearchJob, SearchStatus, SourceStats};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Strategy tag stamped on every result envelope
pub const SEARCH_STRATEGY: &str = "multi_source";

/// Inbound search request.
///
/// The same JSON shape serves the HTTP endpoint and any queue consumer
/// in front of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    pub query_terms: Vec<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub batch_size: Option<u32>,
}

impl SearchRequest {
    /// Validate the request and resolve it into a pipeline job.
    ///
    /// Terms are trimmed and blank ones discarded; the batch size falls
    /// back to the configured default and is bounded by the configured
    /// maximum.
    pub fn validate(&self, search: &SearchConfig) -> Result<SearchJob> {
        let query_terms: Vec<String> = self
            .query_terms
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if query_terms.is_empty() {
            return Err(Error::InvalidInput {
                field: "queryTerms".to_string(),
                reason: "must contain at least one non-empty term".to_string(),
            });
        }

        let batch_size = self.batch_size.unwrap_or(search.default_batch_size);
        if batch_size == 0 {
            return Err(Error::InvalidInput {
                field: "batchSize".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if batch_size > search.max_batch_size {
            return Err(Error::InvalidInput {
                field: "batchSize".to_string(),
                reason: format!("exceeds the maximum of {}", search.max_batch_size),
            });
        }

        Ok(SearchJob {
            query_terms,
            domain: self.domain.clone(),
            batch_size,
        })
    }
}

/// Outbound result envelope.
///
/// `batch_size` reports the number of papers actually delivered, which
/// can be below the requested size.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub project_id: Option<String>,
    pub correlation_id: Option<String>,
    pub papers: Vec<CanonicalPaper>,
    pub batch_size: u32,
    pub query_terms: Vec<String>,
    pub domain: Option<String>,
    pub status: SearchStatus,
    pub search_strategy: String,
    pub total_sources_used: usize,
    pub ai_enhanced: bool,
    pub search_rounds: u32,
    pub deduplication_stats: DedupStats,
    pub source_stats: BTreeMap<String, SourceStats>,
}

impl SearchResult {
    pub fn from_outcome(request: &SearchRequest, outcome: PipelineOutcome) -> Self {
        Self {
            project_id: request.project_id.clone(),
            correlation_id: request.correlation_id.clone(),
            batch_size: outcome.papers.len() as u32,
            papers: outcome.papers,
            query_terms: request.query_terms.clone(),
            domain: request.domain.clone(),
            status: outcome.status,
            search_strategy: SEARCH_STRATEGY.to_string(),
            total_sources_used: outcome.total_sources_used,
            ai_enhanced: outcome.refinement_used,
            search_rounds: outcome.search_rounds,
            deduplication_stats: outcome.dedup_stats,
            source_stats: outcome.source_stats,
        }
    }
}

/// Outbound channel for finished result envelopes.
///
/// The HTTP reply path answers the caller directly; deployments with a
/// message channel publish the same envelope through this trait.
#[async_trait]
pub trait ResultPublisher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn publish(&self, result: &SearchResult) -> Result<()>;
}

/// Publisher that logs the envelope, for channel-less deployments
pub struct LoggingPublisher;

#[async_trait]
impl ResultPublisher for LoggingPublisher {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn publish(&self, result: &SearchResult) -> Result<()> {
        info!(
            correlation_id = ?result.correlation_id,
            status = ?result.status,
            papers = result.papers.len(),
            "search result ready"
        );
        debug!(envelope = %serde_json::to_string(result)?, "result envelope");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(terms: &[&str]) -> SearchRequest {
        SearchRequest {
            project_id: Some("p-1".to_string()),
            correlation_id: Some("c-1".to_string()),
            query_terms: terms.iter().map(|t| t.to_string()).collect(),
            domain: None,
            batch_size: None,
        }
    }

    fn outcome(papers: Vec<CanonicalPaper>) -> PipelineOutcome {
        PipelineOutcome {
            papers,
            status: SearchStatus::Empty,
            dedup_stats: DedupStats::default(),
            source_stats: BTreeMap::new(),
            search_rounds: 1,
            refinement_used: false,
            total_sources_used: 2,
            dropped_without_pdf: 0,
        }
    }

    #[test]
    fn test_empty_terms_rejected() {
        let config = SearchConfig::default();
        assert!(request(&[]).validate(&config).is_err());
        assert!(request(&["  ", ""]).validate(&config).is_err());
    }

    #[test]
    fn test_terms_are_trimmed() {
        let job = request(&[" deep ", "learning", " "])
            .validate(&SearchConfig::default())
            .unwrap();
        assert_eq!(job.query_terms, vec!["deep", "learning"]);
    }

    #[test]
    fn test_batch_size_defaults_and_bounds() {
        let config = SearchConfig::default();

        let job = request(&["x"]).validate(&config).unwrap();
        assert_eq!(job.batch_size, config.default_batch_size);

        let mut zero = request(&["x"]);
        zero.batch_size = Some(0);
        assert!(zero.validate(&config).is_err());

        let mut huge = request(&["x"]);
        huge.batch_size = Some(config.max_batch_size + 1);
        assert!(huge.validate(&config).is_err());

        let mut max = request(&["x"]);
        max.batch_size = Some(config.max_batch_size);
        assert_eq!(
            max.validate(&config).unwrap().batch_size,
            config.max_batch_size
        );
    }

    #[test]
    fn test_request_parses_camel_case() {
        let request: SearchRequest = serde_json::from_str(
            r#"{"projectId":"p","queryTerms":["a","b"],"batchSize":3,"correlationId":"c"}"#,
        )
        .unwrap();
        assert_eq!(request.project_id.as_deref(), Some("p"));
        assert_eq!(request.query_terms, vec!["a", "b"]);
        assert_eq!(request.batch_size, Some(3));
    }

    #[test]
    fn test_result_envelope_reports_actual_count() {
        let result = SearchResult::from_outcome(&request(&["a"]), outcome(Vec::new()));
        assert_eq!(result.batch_size, 0);
        assert_eq!(result.search_strategy, "multi_source");
        assert_eq!(result.project_id.as_deref(), Some("p-1"));
        assert!(!result.ai_enhanced);
    }

    #[test]
    fn test_result_envelope_serializes_camel_case_with_nulls() {
        let mut req = request(&["a"]);
        req.project_id = None;
        let json = serde_json::to_value(SearchResult::from_outcome(&req, outcome(Vec::new())))
            .unwrap();

        assert!(json["projectId"].is_null());
        assert_eq!(json["status"], "EMPTY");
        assert_eq!(json["totalSourcesUsed"], 2);
        assert_eq!(json["searchRounds"], 1);
        assert!(json["deduplicationStats"]["uniquePapers"].is_number());
    }

    #[tokio::test]
    async fn test_logging_publisher_accepts_envelope() {
        let result = SearchResult::from_outcome(&request(&["a"]), outcome(Vec::new()));
        assert!(LoggingPublisher.publish(&result).await.is_ok());
    }
}

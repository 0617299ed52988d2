use crate::config::SearchConfig;
use crate::paper::CanonicalPaper;
use crate::sources::SearchQuery;
use crate::Result;
use async_trait::async_trait;
use chrono::Datelike;
use tracing::{debug, warn};

/// Produces alternative query strings for extra search rounds.
///
/// Implementations may call out to an external service; the default is
/// a no-op so the pipeline degrades to single-round search.
#[async_trait]
pub trait QueryRefiner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Suggest up to `max_queries` refinements of the original query.
    ///
    /// `found_titles` samples what earlier rounds already returned, so
    /// refinements can steer away from covered ground.
    async fn refine(
        &self,
        original: &str,
        domain: Option<&str>,
        found_titles: &[String],
        max_queries: u32,
    ) -> Result<Vec<String>>;
}

/// Refiner that never suggests anything
pub struct DisabledRefiner;

#[async_trait]
impl QueryRefiner for DisabledRefiner {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn refine(
        &self,
        _original: &str,
        _domain: Option<&str>,
        _found_titles: &[String],
        _max_queries: u32,
    ) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Builds the per-round queries issued to the fanout stage
pub struct QueryPlanner {
    config: SearchConfig,
    refiner: Box<dyn QueryRefiner>,
}

impl QueryPlanner {
    pub fn new(config: SearchConfig, refiner: Box<dyn QueryRefiner>) -> Self {
        Self { config, refiner }
    }

    pub fn with_disabled_refiner(config: SearchConfig) -> Self {
        Self::new(config, Box::new(DisabledRefiner))
    }

    /// The round-one query: terms joined, domain and year filter attached
    pub fn primary(&self, terms: &[String], domain: Option<&str>) -> SearchQuery {
        let mut query = SearchQuery::new(terms.join(" "), self.config.papers_per_source);
        query.domain = domain.map(str::to_string);
        query.year_from = self.year_floor();
        query
    }

    /// Queries for an extra round, derived from the refiner.
    ///
    /// Refinement must never sink a request: a refiner failure logs a
    /// warning and yields no extra queries.
    pub async fn refined(
        &self,
        terms: &[String],
        domain: Option<&str>,
        found: &[CanonicalPaper],
    ) -> Vec<SearchQuery> {
        if !self.config.enable_refinement {
            return Vec::new();
        }

        let original = terms.join(" ");
        let titles: Vec<String> = found.iter().take(5).map(|p| p.title.clone()).collect();

        let suggestions = match self
            .refiner
            .refine(&original, domain, &titles, self.config.max_refined_queries)
            .await
        {
            Ok(suggestions) => suggestions,
            Err(error) => {
                warn!(refiner = self.refiner.name(), %error, "query refinement failed");
                return Vec::new();
            }
        };

        let queries: Vec<SearchQuery> = suggestions
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .filter(|s| !s.eq_ignore_ascii_case(&original))
            .take(self.config.max_refined_queries as usize)
            .map(|s| {
                let mut query = SearchQuery::new(s, self.config.papers_per_source);
                query.domain = domain.map(str::to_string);
                query.year_from = self.year_floor();
                query
            })
            .collect();

        debug!(
            refiner = self.refiner.name(),
            count = queries.len(),
            "planned refined queries"
        );
        queries
    }

    fn year_floor(&self) -> Option<i32> {
        self.config
            .recent_years
            .map(|n| chrono::Utc::now().year() - n.saturating_sub(1) as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRefiner(Vec<&'static str>);

    #[async_trait]
    impl QueryRefiner for FixedRefiner {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn refine(
            &self,
            _original: &str,
            _domain: Option<&str>,
            _found_titles: &[String],
            _max_queries: u32,
        ) -> Result<Vec<String>> {
            Ok(self.0.iter().map(ToString::to_string).collect())
        }
    }

    struct FailingRefiner;

    #[async_trait]
    impl QueryRefiner for FailingRefiner {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn refine(
            &self,
            _original: &str,
            _domain: Option<&str>,
            _found_titles: &[String],
            _max_queries: u32,
        ) -> Result<Vec<String>> {
            Err(crate::Error::Service("refiner offline".to_string()))
        }
    }

    fn terms() -> Vec<String> {
        vec!["quantum".to_string(), "computing".to_string()]
    }

    #[test]
    fn test_primary_joins_terms_and_carries_domain() {
        let planner = QueryPlanner::with_disabled_refiner(SearchConfig::default());
        let query = planner.primary(&terms(), Some("cs.AI"));
        assert_eq!(query.query, "quantum computing");
        assert_eq!(query.domain.as_deref(), Some("cs.AI"));
        assert_eq!(query.limit, 5);
        assert_eq!(query.year_from, None);
    }

    #[test]
    fn test_primary_applies_recent_years_floor() {
        let mut config = SearchConfig::default();
        config.recent_years = Some(3);
        let planner = QueryPlanner::with_disabled_refiner(config);
        let query = planner.primary(&terms(), None);
        let this_year = chrono::Utc::now().year();
        assert_eq!(query.year_from, Some(this_year - 2));
    }

    #[tokio::test]
    async fn test_refinement_disabled_yields_no_queries() {
        let mut config = SearchConfig::default();
        config.enable_refinement = false;
        let planner = QueryPlanner::new(config, Box::new(FixedRefiner(vec!["qc hardware"])));
        assert!(planner.refined(&terms(), None, &[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_refined_queries_filtered_and_capped() {
        let mut config = SearchConfig::default();
        config.enable_refinement = true;
        config.max_refined_queries = 2;
        let planner = QueryPlanner::new(
            config,
            Box::new(FixedRefiner(vec![
                "quantum computing", // duplicate of the original
                "  ",                // blank
                "quantum error correction",
                "topological qubits",
                "quantum supremacy",
            ])),
        );

        let queries = planner.refined(&terms(), Some("cs.AI"), &[]).await;
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].query, "quantum error correction");
        assert_eq!(queries[1].query, "topological qubits");
        assert_eq!(queries[0].domain.as_deref(), Some("cs.AI"));
    }

    #[tokio::test]
    async fn test_refiner_failure_is_non_fatal() {
        let mut config = SearchConfig::default();
        config.enable_refinement = true;
        let planner = QueryPlanner::new(config, Box::new(FailingRefiner));
        assert!(planner.refined(&terms(), None, &[]).await.is_empty());
    }
}

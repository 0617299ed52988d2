use crate::config::SearchConfig;
use crate::paper::RawPaper;
use crate::resilience::{
    retry_with_policy, Deadline, RetryConfig, RetryPolicy, SourcePacer, TimeoutExt,
};
use crate::sources::{SearchQuery, SourceAdapter};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Per-source outcome counters for one request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStats {
    /// Raw papers this source contributed
    pub count: usize,
    pub elapsed_ms: u64,
    /// Failure tag when the source contributed nothing
    pub error: Option<String>,
}

impl SourceStats {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Fold another round's outcome into this one.
    ///
    /// Counts and time accumulate; the first recorded error sticks so a
    /// later clean round does not hide an earlier failure tag.
    pub fn absorb(&mut self, other: &SourceStats) {
        self.count += other.count;
        self.elapsed_ms += other.elapsed_ms;
        if self.error.is_none() {
            self.error = other.error.clone();
        }
    }
}

/// Everything one fanout round produced
#[derive(Debug, Default)]
pub struct FanoutResult {
    /// Raw papers concatenated in source-registration order
    pub papers: Vec<RawPaper>,
    pub stats: BTreeMap<String, SourceStats>,
}

impl FanoutResult {
    /// True when every queried source failed.
    ///
    /// An empty result from working sources is a legitimate outcome and
    /// does not count as failure.
    pub fn all_failed(&self) -> bool {
        !self.stats.is_empty() && self.stats.values().all(|s| s.error.is_some())
    }
}

/// Runs one query against every registered source concurrently.
///
/// Each adapter call is its own task behind a shared semaphore; a
/// per-source timeout (the configured default unless the adapter
/// overrides it, clamped to the request deadline) bounds the worst
/// case, and rate-limited sources are retried on a short backoff.
/// Results come back in registration order regardless of completion
/// order, so output is deterministic for deterministic adapters.
pub struct SourceFanout {
    config: SearchConfig,
    pacer: Arc<SourcePacer>,
}

impl SourceFanout {
    pub fn new(config: SearchConfig, pacer: Arc<SourcePacer>) -> Self {
        Self { config, pacer }
    }

    pub async fn run(
        &self,
        query: &SearchQuery,
        adapters: &[Arc<dyn SourceAdapter>],
        deadline: Deadline,
    ) -> FanoutResult {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(
            self.config.max_parallel_sources,
        ));
        let policy = RetryPolicy::rate_limit_only(RetryConfig::for_rate_limits(&self.config));
        let default_timeout = self.config.source_timeout();

        debug!(
            query = %query.query,
            sources = adapters.len(),
            "starting source fanout"
        );

        let mut tasks = Vec::new();
        for adapter in adapters {
            let adapter = adapter.clone();
            let query = query.clone();
            let semaphore = semaphore.clone();
            let pacer = self.pacer.clone();
            let policy = policy.clone();

            let task = tokio::spawn(async move {
                let name = adapter.name();
                let started = Instant::now();

                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            name,
                            started.elapsed(),
                            Err(Error::Service("fanout semaphore closed".to_string())),
                        )
                    }
                };

                let result = retry_with_policy(
                    || {
                        let adapter = adapter.clone();
                        let query = query.clone();
                        let pacer = pacer.clone();
                        async move {
                            let timeout = adapter.search_timeout().unwrap_or(default_timeout);
                            let budget = deadline.clamp(timeout);
                            if budget.is_zero() {
                                return Err(Error::RequestTimeout {
                                    elapsed: deadline.elapsed(),
                                });
                            }
                            pacer.acquire(adapter.name()).await;
                            adapter
                                .search(&query)
                                .with_timeout_duration(budget)
                                .await?
                                .map_err(Error::from)
                        }
                    },
                    &policy,
                    name,
                )
                .await;

                (name, started.elapsed(), result)
            });
            tasks.push(task);
        }

        // The collection barrier: awaiting in registration order keeps
        // concatenation deterministic while the tasks run concurrently
        let mut result = FanoutResult::default();
        for task in tasks {
            match task.await {
                Ok((name, elapsed, Ok(papers))) => {
                    info!(source = name, count = papers.len(), "source returned results");
                    result.stats.insert(
                        name.to_string(),
                        SourceStats {
                            count: papers.len(),
                            elapsed_ms: elapsed.as_millis() as u64,
                            error: None,
                        },
                    );
                    result.papers.extend(papers);
                }
                Ok((name, elapsed, Err(error))) => {
                    warn!(source = name, %error, "source failed");
                    result.stats.insert(
                        name.to_string(),
                        SourceStats {
                            count: 0,
                            elapsed_ms: elapsed.as_millis() as u64,
                            error: Some(error.to_string()),
                        },
                    );
                }
                Err(join_error) => {
                    warn!(%join_error, "fanout task panicked");
                }
            }
        }

        if result.all_failed() {
            let aggregate = Error::AllSourcesFailed {
                attempted: result.stats.len(),
            };
            warn!(%aggregate, "fanout produced nothing");
        }
        result
    }
}

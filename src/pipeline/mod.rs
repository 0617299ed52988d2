//! The search pipeline, stage by stage: query planning, source fanout,
//! deduplication, metadata enrichment, PDF acquisition, and final batch
//! assembly, all bounded by one request deadline.

pub mod assemble;
pub mod dedup;
pub mod enrich;
pub mod fanout;
pub mod planner;

pub use assemble::{AssembledBatch, ResultAssembler, SearchStatus};
pub use dedup::{DedupStats, Deduplicator};
pub use enrich::Enricher;
pub use fanout::{FanoutResult, SourceFanout, SourceStats};
pub use planner::{DisabledRefiner, QueryPlanner, QueryRefiner};

use crate::config::Config;
use crate::paper::{CanonicalPaper, RawPaper};
use crate::pdf::{default_cascade, PdfAcquirer};
use crate::resilience::{Deadline, SourcePacer};
use crate::sources::SourceRegistry;
use crate::storage::ObjectStore;
use crate::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// One validated search job, as the pipeline sees it
#[derive(Debug, Clone)]
pub struct SearchJob {
    pub query_terms: Vec<String>,
    pub domain: Option<String>,
    pub batch_size: u32,
}

/// Everything one pipeline run produced, ready for the result envelope
#[derive(Debug)]
pub struct PipelineOutcome {
    pub papers: Vec<CanonicalPaper>,
    pub status: SearchStatus,
    pub dedup_stats: DedupStats,
    /// Per-source counters accumulated across all rounds
    pub source_stats: BTreeMap<String, SourceStats>,
    pub search_rounds: u32,
    /// Whether refined queries contributed to the search
    pub refinement_used: bool,
    /// Sources that returned at least one paper across all rounds
    pub total_sources_used: usize,
    pub dropped_without_pdf: usize,
}

/// The assembled pipeline for one service instance.
///
/// Rounds of fanout and deduplication run until the compensated
/// collection target is met or rounds run out; the survivors are then
/// enriched, their PDFs acquired, and the batch assembled. Every stage
/// respects the shared deadline, and a deadline hit never discards work
/// already done.
pub struct SearchPipeline {
    config: Config,
    registry: SourceRegistry,
    planner: QueryPlanner,
    fanout: SourceFanout,
    dedup: Deduplicator,
    enricher: Enricher,
    acquirer: PdfAcquirer,
    assembler: ResultAssembler,
}

impl SearchPipeline {
    /// Wire the pipeline from configuration, building the registry and
    /// storage-backed PDF acquirer.
    pub fn from_config(config: &Config, store: Arc<dyn ObjectStore>) -> Result<Self> {
        let registry = SourceRegistry::from_config(config)?;
        Self::new(
            config.clone(),
            registry,
            Box::new(DisabledRefiner),
            store,
        )
    }

    /// Wire the pipeline around an existing registry and refiner
    pub fn new(
        config: Config,
        registry: SourceRegistry,
        refiner: Box<dyn QueryRefiner>,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self> {
        let pacer = Arc::new(SourcePacer::new(&config.sources));
        let planner = QueryPlanner::new(config.search.clone(), refiner);
        let fanout = SourceFanout::new(config.search.clone(), pacer.clone());
        let enricher = Enricher::new(
            config.enrichment.clone(),
            registry.lookups().to_vec(),
            pacer.clone(),
        );
        let strategies = default_cascade(&config.pdf, registry.unpaywall())?;
        let acquirer = PdfAcquirer::new(&config.pdf, strategies, store)?;
        let assembler = ResultAssembler::new(&config.search, &config.pdf);

        Ok(Self {
            dedup: Deduplicator::default(),
            config,
            registry,
            planner,
            fanout,
            enricher,
            acquirer,
            assembler,
        })
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Run the whole pipeline for one job.
    ///
    /// Never fails: source trouble degrades the result (down to an
    /// `EMPTY` batch) instead of erroring the request.
    #[instrument(skip(self, job), fields(batch_size = job.batch_size))]
    pub async fn run(&self, job: &SearchJob) -> PipelineOutcome {
        let deadline = Deadline::after(Duration::from_secs(
            self.config.server.request_timeout_secs,
        ));
        let target = self.config.search.collection_target(job.batch_size);

        info!(
            terms = ?job.query_terms,
            batch_size = job.batch_size,
            target,
            "search pipeline started"
        );

        let mut raw: Vec<RawPaper> = Vec::new();
        let mut source_stats: BTreeMap<String, SourceStats> = BTreeMap::new();
        let mut canonical: Vec<CanonicalPaper> = Vec::new();
        let mut dedup_stats = DedupStats::default();
        let mut rounds = 0u32;
        let mut refinement_used = false;

        let mut queries = vec![self
            .planner
            .primary(&job.query_terms, job.domain.as_deref())];

        while rounds < self.config.search.max_rounds && !queries.is_empty() {
            rounds += 1;
            for query in &queries {
                if deadline.expired() {
                    break;
                }
                let result = self
                    .fanout
                    .run(query, self.registry.searchers(), deadline)
                    .await;
                for (name, stats) in &result.stats {
                    source_stats.entry(name.clone()).or_default().absorb(stats);
                }
                raw.extend(result.papers);
            }

            let (merged, stats) = self.dedup.merge(raw.clone());
            canonical = merged;
            dedup_stats = stats;
            debug!(
                round = rounds,
                unique = canonical.len(),
                target,
                "search round complete"
            );

            if canonical.len() >= target || deadline.expired() {
                break;
            }

            if rounds < self.config.search.max_rounds {
                queries = self
                    .planner
                    .refined(&job.query_terms, job.domain.as_deref(), &canonical)
                    .await;
                if queries.is_empty() {
                    break;
                }
                refinement_used = true;
            } else {
                queries.clear();
            }
        }

        // Candidates beyond the compensated target are not worth
        // enriching or downloading
        canonical.truncate(target);

        let canonical = self.enricher.enrich_all(canonical, deadline).await;
        let acquired = self.acquirer.acquire_all(canonical, deadline).await;

        let batch = self.assembler.assemble(
            acquired,
            &job.query_terms,
            job.batch_size,
            deadline.expired(),
        );

        info!(
            status = ?batch.status,
            papers = batch.papers.len(),
            rounds,
            elapsed = ?deadline.elapsed(),
            "search pipeline finished"
        );

        // Only sources that delivered papers count as used; registered
        // sources that failed or came back empty do not.
        let total_sources_used = source_stats.values().filter(|s| s.count > 0).count();

        PipelineOutcome {
            papers: batch.papers,
            status: batch.status,
            dedup_stats,
            source_stats,
            search_rounds: rounds,
            refinement_used,
            total_sources_used,
            dropped_without_pdf: batch.dropped_without_pdf,
        }
    }
}

pub mod config;
pub mod error;
pub mod paper;
pub mod pdf;
pub mod pipeline;
pub mod resilience;
pub mod server;
pub mod sources;
pub mod storage;

pub use config::{Config, ConfigOverrides};
pub use error::{Error, Result};
pub use paper::{CanonicalPaper, IdKind, RawPaper};
pub use pdf::PdfAcquirer;
pub use pipeline::{PipelineOutcome, SearchJob, SearchPipeline, SearchStatus};
pub use resilience::{Deadline, RetryConfig, RetryPolicy, SourcePacer, TimeoutExt};
pub use server::{AppState, ResultPublisher, SearchRequest, SearchResult};
pub use sources::{SourceAdapter, SourceRegistry};
pub use storage::ObjectStore;

pub mod deadline;
pub mod pacing;
pub mod retry;

pub use deadline::{Deadline, TimeoutExt};
pub use pacing::SourcePacer;
pub use retry::{retry_with_policy, RetryConfig, RetryPolicy};

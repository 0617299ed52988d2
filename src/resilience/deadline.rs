use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{timeout, Instant};

/// Time budget for one search request.
///
/// Created when the request arrives; each pipeline stage clamps its own
/// timeouts to whatever remains so the overall deadline holds.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    at: Instant,
}

impl Deadline {
    #[must_use]
    pub fn after(budget: Duration) -> Self {
        let start = Instant::now();
        Self {
            start,
            at: start + budget,
        }
    }

    /// Time left before the deadline, zero once it has passed
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    #[must_use]
    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Clamp a stage timeout to the remaining budget
    #[must_use]
    pub fn clamp(&self, duration: Duration) -> Duration {
        duration.min(self.remaining())
    }

    /// Time since the deadline was created
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Extension trait adding timeout handling to futures
pub trait TimeoutExt<T>: Sized {
    /// Run the future with a fixed timeout
    fn with_timeout_duration(
        self,
        duration: Duration,
    ) -> impl Future<Output = Result<T>> + Send;
}

impl<F, T> TimeoutExt<T> for F
where
    F: Future<Output = T> + Send,
    T: Send,
{
    async fn with_timeout_duration(self, duration: Duration) -> Result<T> {
        match timeout(duration, self).await {
            Ok(result) => Ok(result),
            Err(_) => Err(Error::RequestTimeout { elapsed: duration }),
        }
    }
}

use crate::config::SourcesConfig;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

/// Spacing between consecutive requests to one source.
///
/// Each enabled source gets a slot holding the instant of its last
/// permitted request; `acquire` sleeps until the configured minimum
/// interval has passed. Slots are independent, so pacing one source
/// never delays another.
pub struct SourcePacer {
    slots: HashMap<String, Mutex<Option<Instant>>>,
    intervals: HashMap<String, Duration>,
    default_interval: Duration,
}

fn interval_for_rate(requests_per_second: f64) -> Duration {
    if requests_per_second > 0.0 {
        Duration::from_millis((1000.0 / requests_per_second) as u64)
    } else {
        Duration::from_secs(1)
    }
}

impl SourcePacer {
    pub fn new(sources: &SourcesConfig) -> Self {
        let mut slots = HashMap::new();
        let mut intervals = HashMap::new();
        for name in &sources.enabled {
            slots.insert(name.clone(), Mutex::new(None));
            intervals.insert(name.clone(), interval_for_rate(sources.rate_for(name)));
        }
        Self {
            slots,
            intervals,
            default_interval: interval_for_rate(sources.default_rate),
        }
    }

    /// Wait until the source's minimum request interval has elapsed
    pub async fn acquire(&self, source: &str) {
        let interval = self
            .intervals
            .get(source)
            .copied()
            .unwrap_or(self.default_interval);

        let Some(slot) = self.slots.get(source) else {
            // Unregistered sources are not paced
            return;
        };

        let mut last = slot.lock().await;
        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < interval {
                let wait_time = interval - elapsed;
                debug!(source, wait_ms = wait_time.as_millis() as u64, "pacing request");
                sleep(wait_time).await;
            }
        }
        *last = Some(Instant::now());
    }
}

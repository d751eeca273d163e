//! Background eviction of queries past their deadline.

use std::sync::Arc;
use std::time::Duration;

use sluice_common::telemetry::QUERIES_TARGET;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::cache::ResultCache;

/// Periodic sweep task. Stops when dropped.
#[derive(Debug)]
pub struct CacheSweeper {
    handle: JoinHandle<()>,
}

impl CacheSweeper {
    pub fn spawn(cache: Arc<ResultCache>, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let evicted = cache.sweep_expired();
                if evicted > 0 {
                    tracing::info!(
                        target: QUERIES_TARGET,
                        evicted,
                        live_queries = cache.live_queries(),
                        "Evicted expired queries"
                    );
                }
            }
        });
        Self { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResultEntry;
    use sluice_common::QueryType;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_on_tick() {
        let cache = Arc::new(ResultCache::new(2));
        let entry = ResultEntry::new(
            "q",
            "y0",
            QueryType::Stream,
            10,
            4,
            Instant::now() + Duration::from_secs(5),
        );
        cache.register(cache.admit().unwrap(), entry.clone());
        let _producer = entry.attach_producer().unwrap();

        let _sweeper = CacheSweeper::spawn(cache.clone(), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(cache.live_queries(), 1);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(cache.live_queries(), 0);
        assert!(entry.is_closed());
    }
}

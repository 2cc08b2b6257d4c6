//! Interval polling of volatile billing resources

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::query::QueryClient;
use crate::resources::ResourceKey;

/// Background tasks refetching resources on a fixed interval.
///
/// Dropping the refresher stops polling.
pub struct AutoRefresher {
    handles: Vec<JoinHandle<()>>,
}

impl AutoRefresher {
    /// Start one polling task per key. Must be called inside a tokio runtime.
    pub fn start(query: &QueryClient, keys: Vec<ResourceKey>, interval: Duration) -> Self {
        tracing::info!(
            resources = keys.len(),
            interval = ?interval,
            "Starting billing auto refresh"
        );
        let handles = keys
            .into_iter()
            .map(|key| tokio::spawn(poll(query.clone(), key, interval)))
            .collect();
        Self { handles }
    }

    pub fn is_running(&self) -> bool {
        self.handles.iter().any(|h| !h.is_finished())
    }

    pub fn stop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for AutoRefresher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll(query: QueryClient, key: ResourceKey, interval: Duration) {
    // First tick after one full interval; the initial load happens elsewhere
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if query.store().is_closed() {
            tracing::debug!(resource = %key, "Store closed, stopping auto refresh");
            break;
        }
        if let Err(e) = query.refetch(&key).await {
            tracing::debug!(resource = %key, error = %e, "Auto refresh fetch failed");
        }
    }
}

//! Query client: fetches resources through the gateway into the store

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::cache::{should_refetch, FetchTicket, ResourceEntry, ResourceStore};
use crate::error::{BillingError, BillingResult};
use crate::gateway::BillingGateway;
use crate::resources::{fetch_resource, ResourceKey, ResourcePolicy, ResourceValue};

/// Backoff base; with the factor below retries wait ~200ms, ~400ms, ...
const RETRY_BASE_MILLIS: u64 = 2;
const RETRY_FACTOR: u64 = 100;

/// Maximum backoff between query retries (5 seconds)
const RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

/// Binds a [`ResourceStore`] to a [`BillingGateway`]
#[derive(Clone)]
pub struct QueryClient {
    gateway: Arc<dyn BillingGateway>,
    store: ResourceStore,
    retries: usize,
}

impl QueryClient {
    pub fn new(gateway: Arc<dyn BillingGateway>, store: ResourceStore, retries: usize) -> Self {
        Self {
            gateway,
            store,
            retries,
        }
    }

    pub fn store(&self) -> &ResourceStore {
        &self.store
    }

    pub fn gateway(&self) -> &Arc<dyn BillingGateway> {
        &self.gateway
    }

    fn begin(&self, key: &ResourceKey) -> BillingResult<FetchTicket> {
        let policy = ResourcePolicy::for_key(key);
        self.store
            .begin_fetch(key, policy.stale_after)
            .ok_or(BillingError::Disposed)
    }

    async fn run(&self, ticket: FetchTicket) -> BillingResult<ResourceValue> {
        let started = Instant::now();
        let in_flight = InFlight::new(&self.store, ticket);
        let result = self.fetch_with_retry(in_flight.key()).await;

        match &result {
            Ok(_) => tracing::debug!(
                resource = %in_flight.key(),
                elapsed = ?started.elapsed(),
                "Fetched billing resource"
            ),
            Err(e) => tracing::warn!(
                resource = %in_flight.key(),
                error = %e,
                "Failed to fetch billing resource"
            ),
        }

        in_flight.complete(result.clone());
        result
    }

    /// Fetch with exponential backoff, retrying transient failures only
    async fn fetch_with_retry(&self, key: &ResourceKey) -> BillingResult<ResourceValue> {
        let strategy = ExponentialBackoff::from_millis(RETRY_BASE_MILLIS)
            .factor(RETRY_FACTOR)
            .max_delay(RETRY_MAX_DELAY)
            .map(jitter)
            .take(self.retries);

        RetryIf::spawn(
            strategy,
            || fetch_resource(self.gateway.as_ref(), key),
            |e: &BillingError| {
                let retry = e.is_transient();
                if retry {
                    tracing::debug!(resource = %key, error = %e, "Transient error - will retry");
                }
                retry
            },
        )
        .await
    }

    /// Fetch `key` now, superseding any fetch already in flight
    pub async fn refetch(&self, key: &ResourceKey) -> BillingResult<ResourceValue> {
        let ticket = self.begin(key)?;
        self.run(ticket).await
    }

    /// Start a background refetch.
    ///
    /// The fetch is registered before this returns, so readers calling
    /// [`QueryClient::ensure`] right after will join it.
    pub fn spawn_refetch(&self, key: &ResourceKey) -> Option<JoinHandle<()>> {
        let ticket = self.begin(key).ok()?;
        let client = self.clone();
        Some(tokio::spawn(async move {
            let _ = client.run(ticket).await;
        }))
    }

    /// Read `key`, fetching first if the cached value is missing or stale.
    ///
    /// Joins a fetch already in flight instead of issuing a duplicate.
    /// Failures are recorded on the entry, not returned.
    pub async fn ensure(&self, key: &ResourceKey) -> Option<ResourceEntry> {
        let entry = self.store.entry(key);
        if should_refetch(entry.as_ref(), Instant::now()) {
            let _ = self.refetch(key).await;
        }
        self.store.wait_settled(key).await;
        self.store.entry(key)
    }
}

/// Owns a fetch ticket until its result is written.
///
/// Dropped without completing (caller timed out, task aborted), it abandons
/// the ticket so the entry stops reporting a fetch in flight.
struct InFlight<'a> {
    store: &'a ResourceStore,
    ticket: Option<FetchTicket>,
    key: ResourceKey,
}

impl<'a> InFlight<'a> {
    fn new(store: &'a ResourceStore, ticket: FetchTicket) -> Self {
        let key = ticket.key().clone();
        Self {
            store,
            ticket: Some(ticket),
            key,
        }
    }

    fn key(&self) -> &ResourceKey {
        &self.key
    }

    fn complete(mut self, result: BillingResult<ResourceValue>) {
        if let Some(ticket) = self.ticket.take() {
            self.store.complete_fetch(&ticket, result);
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            self.store.abandon(&ticket);
        }
    }
}

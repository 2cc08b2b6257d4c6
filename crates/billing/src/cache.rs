//! In-memory billing resource cache with stale-while-revalidate semantics
//!
//! Holds the last known value of every tracked resource together with its
//! loading/error/staleness state. Concurrent fetches of the same key are
//! ordered by ticket: only the most recently issued fetch may write its
//! result, so a slow earlier request can never overwrite a newer one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Notify};

use crate::error::BillingError;
use crate::resources::{ResourceKey, ResourceValue};

/// Capacity of the store event channel; slow observers skip ahead
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Cached state of one resource
#[derive(Debug, Clone)]
pub struct ResourceEntry {
    /// Last successfully fetched value, kept across failed refetches
    pub data: Option<ResourceValue>,
    /// Error of the most recent fetch, cleared on success
    pub error: Option<BillingError>,
    pub is_loading: bool,
    /// Marked stale by a mutation or pushed event
    pub is_invalidated: bool,
    pub last_fetched_at: Option<Instant>,
    pub stale_after: Duration,
    latest_ticket: u64,
    invalidated_through: u64,
}

impl ResourceEntry {
    fn new(stale_after: Duration) -> Self {
        Self {
            data: None,
            error: None,
            is_loading: false,
            is_invalidated: false,
            last_fetched_at: None,
            stale_after,
            latest_ticket: 0,
            invalidated_through: 0,
        }
    }

    /// Whether the value is invalidated or older than its staleness window
    pub fn is_stale(&self, now: Instant) -> bool {
        if self.is_invalidated {
            return true;
        }
        match self.last_fetched_at {
            Some(at) => now.saturating_duration_since(at) >= self.stale_after,
            None => true,
        }
    }

    /// The fetch in flight was issued before the latest invalidation and
    /// will not clear it
    fn in_flight_is_outdated(&self) -> bool {
        self.is_loading && self.is_invalidated && self.latest_ticket <= self.invalidated_through
    }
}

/// Decide whether a read of `entry` should trigger a fetch.
///
/// Never-fetched and stale entries are refetched. A fetch already in flight
/// is joined rather than duplicated, unless it was issued before the entry
/// was invalidated.
pub fn should_refetch(entry: Option<&ResourceEntry>, now: Instant) -> bool {
    let Some(entry) = entry else {
        return true;
    };
    if entry.is_loading && !entry.in_flight_is_outdated() {
        return false;
    }
    entry.is_stale(now)
}

/// Change notification broadcast to store observers
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Loading(ResourceKey),
    Updated(ResourceKey),
    Failed { key: ResourceKey, error: BillingError },
    Invalidated(ResourceKey),
    /// A superseded fetch completed and its result was dropped
    Discarded(ResourceKey),
    Closed,
}

/// Permission to write the result of one fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    key: ResourceKey,
    id: u64,
}

impl FetchTicket {
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }
}

struct StoreInner {
    entries: RwLock<HashMap<ResourceKey, ResourceEntry>>,
    events: broadcast::Sender<StoreEvent>,
    settled: Notify,
    next_ticket: AtomicU64,
    closed: AtomicBool,
}

/// Shared billing resource store.
///
/// Cloning is cheap and every clone sees the same entries, so one store can
/// back any number of facades. Tests create their own isolated stores.
#[derive(Clone)]
pub struct ResourceStore {
    inner: Arc<StoreInner>,
}

impl Default for ResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                entries: RwLock::new(HashMap::new()),
                events,
                settled: Notify::new(),
                next_ticket: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    // A panic while holding the lock cannot leave an entry half-written, so
    // poisoned guards are safe to reuse.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ResourceKey, ResourceEntry>> {
        self.inner.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ResourceKey, ResourceEntry>> {
        self.inner.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: StoreEvent) {
        // No receivers is fine
        let _ = self.inner.events.send(event);
    }

    /// Observe every change made to the store
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// Snapshot of one entry
    pub fn entry(&self, key: &ResourceKey) -> Option<ResourceEntry> {
        self.read().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<ResourceKey> {
        self.read().keys().cloned().collect()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Register a new fetch for `key`, superseding any fetch in flight.
    ///
    /// Returns `None` once the store is closed.
    pub fn begin_fetch(&self, key: &ResourceKey, stale_after: Duration) -> Option<FetchTicket> {
        if self.is_closed() {
            return None;
        }
        let id = {
            let mut entries = self.write();
            let id = self.inner.next_ticket.fetch_add(1, Ordering::AcqRel) + 1;
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| ResourceEntry::new(stale_after));
            entry.latest_ticket = id;
            entry.stale_after = stale_after;
            entry.is_loading = true;
            id
        };
        self.emit(StoreEvent::Loading(key.clone()));
        Some(FetchTicket { key: key.clone(), id })
    }

    /// Record the outcome of a fetch.
    ///
    /// Returns false when the result was dropped because a newer fetch was
    /// issued for the same key or the store was closed. A failure keeps the
    /// previous value.
    pub fn complete_fetch(&self, ticket: &FetchTicket, result: Result<ResourceValue, BillingError>) -> bool {
        if self.is_closed() {
            tracing::debug!(resource = %ticket.key, "Billing store closed, dropping fetch result");
            return false;
        }

        let outcome = {
            let mut entries = self.write();
            match entries.get_mut(&ticket.key) {
                Some(entry) if entry.latest_ticket == ticket.id => {
                    entry.is_loading = false;
                    Some(match result {
                        Ok(value) => {
                            entry.data = Some(value);
                            entry.error = None;
                            entry.last_fetched_at = Some(Instant::now());
                            if ticket.id > entry.invalidated_through {
                                entry.is_invalidated = false;
                            }
                            StoreEvent::Updated(ticket.key.clone())
                        }
                        Err(error) => {
                            entry.error = Some(error.clone());
                            StoreEvent::Failed {
                                key: ticket.key.clone(),
                                error,
                            }
                        }
                    })
                }
                Some(entry) => {
                    tracing::debug!(
                        resource = %ticket.key,
                        ticket = ticket.id,
                        latest = entry.latest_ticket,
                        "Discarding superseded fetch result"
                    );
                    None
                }
                None => None,
            }
        };

        match outcome {
            Some(event) => {
                self.emit(event);
                self.inner.settled.notify_waiters();
                true
            }
            None => {
                self.emit(StoreEvent::Discarded(ticket.key.clone()));
                false
            }
        }
    }

    /// Release a fetch that will never complete (its future was dropped).
    ///
    /// Clears the loading flag if `ticket` is still the latest for its key,
    /// so readers joining the fetch do not wait forever. The previous value
    /// and error are kept.
    pub fn abandon(&self, ticket: &FetchTicket) -> bool {
        let released = {
            let mut entries = self.write();
            match entries.get_mut(&ticket.key) {
                Some(entry) if entry.latest_ticket == ticket.id && entry.is_loading => {
                    entry.is_loading = false;
                    true
                }
                _ => false,
            }
        };

        if released {
            tracing::debug!(resource = %ticket.key, ticket = ticket.id, "Abandoned billing fetch");
            self.emit(StoreEvent::Discarded(ticket.key.clone()));
            self.inner.settled.notify_waiters();
        }
        released
    }

    /// Mark every entry matching `filter` as stale.
    ///
    /// Returns the keys that held data; those are the ones worth refetching.
    pub fn invalidate<F>(&self, filter: F) -> Vec<ResourceKey>
    where
        F: Fn(&ResourceKey) -> bool,
    {
        let mut invalidated = Vec::new();
        let mut with_data = Vec::new();
        {
            let mut entries = self.write();
            let through = self.inner.next_ticket.load(Ordering::Acquire);
            for (key, entry) in entries.iter_mut().filter(|(key, _)| filter(key)) {
                entry.is_invalidated = true;
                entry.invalidated_through = through;
                invalidated.push(key.clone());
                if entry.data.is_some() {
                    with_data.push(key.clone());
                }
            }
        }

        for key in invalidated {
            tracing::debug!(resource = %key, "Invalidated billing resource");
            self.emit(StoreEvent::Invalidated(key));
        }
        with_data
    }

    /// Store a value pushed from outside (real-time update).
    ///
    /// Supersedes any fetch in flight for the key.
    pub fn set_value(&self, key: &ResourceKey, value: ResourceValue, stale_after: Duration) -> bool {
        if self.is_closed() {
            return false;
        }
        {
            let mut entries = self.write();
            let id = self.inner.next_ticket.fetch_add(1, Ordering::AcqRel) + 1;
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| ResourceEntry::new(stale_after));
            entry.latest_ticket = id;
            entry.data = Some(value);
            entry.error = None;
            entry.is_loading = false;
            entry.is_invalidated = false;
            entry.last_fetched_at = Some(Instant::now());
        }
        self.emit(StoreEvent::Updated(key.clone()));
        self.inner.settled.notify_waiters();
        true
    }

    /// Wait until no fetch is in flight for `key` (or the store closes)
    pub async fn wait_settled(&self, key: &ResourceKey) {
        loop {
            let notified = self.inner.settled.notified();
            tokio::pin!(notified);
            // Register before checking so a completion in between is not missed
            notified.as_mut().enable();

            let loading = self.read().get(key).is_some_and(|e| e.is_loading);
            if !loading || self.is_closed() {
                return;
            }
            notified.await;
        }
    }

    /// Dispose the store. Later fetch results and pushes are ignored.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for entry in self.write().values_mut() {
            entry.is_loading = false;
        }
        tracing::debug!("Billing resource store closed");
        self.emit(StoreEvent::Closed);
        self.inner.settled.notify_waiters();
    }

    /// Get store statistics
    pub fn stats(&self) -> StoreStats {
        let now = Instant::now();
        let entries = self.read();
        StoreStats {
            total_entries: entries.len(),
            loading_entries: entries.values().filter(|e| e.is_loading).count(),
            stale_entries: entries.values().filter(|e| e.is_stale(now)).count(),
            errored_entries: entries.values().filter(|e| e.error.is_some()).count(),
        }
    }
}

/// Store statistics
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub total_entries: usize,
    pub loading_entries: usize,
    pub stale_entries: usize,
    pub errored_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistext_shared::CreditBalance;

    const STALE: Duration = Duration::from_secs(60);

    fn balance(cents: i64) -> ResourceValue {
        ResourceValue::CreditBalance(CreditBalance {
            balance: cents,
            currency: "usd".to_string(),
        })
    }

    fn cached_balance(store: &ResourceStore) -> Option<i64> {
        match store.entry(&ResourceKey::CreditBalance)?.data? {
            ResourceValue::CreditBalance(c) => Some(c.balance),
            _ => None,
        }
    }

    #[test]
    fn test_should_refetch_rules() {
        let now = Instant::now();
        assert!(should_refetch(None, now));

        let mut entry = ResourceEntry::new(STALE);
        assert!(should_refetch(Some(&entry), now), "never fetched");

        entry.data = Some(balance(1));
        entry.last_fetched_at = Some(now);
        assert!(!should_refetch(Some(&entry), now), "fresh");
        assert!(should_refetch(Some(&entry), now + STALE), "aged out");

        entry.is_loading = true;
        assert!(!should_refetch(Some(&entry), now + STALE), "join the fetch in flight");

        entry.is_loading = false;
        entry.is_invalidated = true;
        assert!(should_refetch(Some(&entry), now), "invalidated");
    }

    #[test]
    fn test_invalidation_outranks_older_in_flight_fetch() {
        let store = ResourceStore::new();
        let key = ResourceKey::CreditBalance;

        let before = store.begin_fetch(&key, STALE).unwrap();
        store.invalidate(|_| true);
        let entry = store.entry(&key).unwrap();
        assert!(should_refetch(Some(&entry), Instant::now()));

        // The pre-invalidation fetch lands but the entry stays invalidated
        assert!(store.complete_fetch(&before, Ok(balance(100))));
        assert!(store.entry(&key).unwrap().is_invalidated);

        let after = store.begin_fetch(&key, STALE).unwrap();
        assert!(store.complete_fetch(&after, Ok(balance(200))));
        let entry = store.entry(&key).unwrap();
        assert!(!entry.is_invalidated);
        assert!(!should_refetch(Some(&entry), Instant::now()));
    }

    #[test]
    fn test_latest_issued_fetch_wins() {
        let store = ResourceStore::new();
        let key = ResourceKey::CreditBalance;

        let first = store.begin_fetch(&key, STALE).unwrap();
        let second = store.begin_fetch(&key, STALE).unwrap();

        // Second completes first, then the older request straggles in
        assert!(store.complete_fetch(&second, Ok(balance(200))));
        assert!(!store.complete_fetch(&first, Ok(balance(100))));

        assert_eq!(cached_balance(&store), Some(200));
        assert!(!store.entry(&key).unwrap().is_loading);
    }

    #[test]
    fn test_failure_keeps_previous_value() {
        let store = ResourceStore::new();
        let key = ResourceKey::CreditBalance;

        let ticket = store.begin_fetch(&key, STALE).unwrap();
        store.complete_fetch(&ticket, Ok(balance(500)));

        let ticket = store.begin_fetch(&key, STALE).unwrap();
        store.complete_fetch(&ticket, Err(BillingError::Timeout));

        let entry = store.entry(&key).unwrap();
        assert_eq!(cached_balance(&store), Some(500));
        assert!(matches!(entry.error, Some(BillingError::Timeout)));
        assert!(!entry.is_loading);

        // The next success clears the error
        let ticket = store.begin_fetch(&key, STALE).unwrap();
        store.complete_fetch(&ticket, Ok(balance(600)));
        assert!(store.entry(&key).unwrap().error.is_none());
    }

    #[test]
    fn test_invalidate_reports_keys_with_data() {
        let store = ResourceStore::new();
        let loaded = store.begin_fetch(&ResourceKey::Settings, STALE).unwrap();
        store.complete_fetch(&loaded, Ok(balance(1)));
        store.begin_fetch(&ResourceKey::Usage, STALE).unwrap();

        let refetch = store.invalidate(|_| true);
        assert_eq!(refetch, vec![ResourceKey::Settings]);
        assert!(store.entry(&ResourceKey::Usage).unwrap().is_invalidated);
    }

    #[test]
    fn test_closed_store_ignores_writes() {
        let store = ResourceStore::new();
        let key = ResourceKey::CreditBalance;
        let ticket = store.begin_fetch(&key, STALE).unwrap();

        store.close();
        assert!(!store.complete_fetch(&ticket, Ok(balance(1))));
        assert!(store.begin_fetch(&key, STALE).is_none());
        assert!(!store.set_value(&key, balance(2), STALE));
        assert_eq!(cached_balance(&store), None);
    }

    #[test]
    fn test_set_value_supersedes_in_flight_fetch() {
        let store = ResourceStore::new();
        let key = ResourceKey::CreditBalance;
        let ticket = store.begin_fetch(&key, STALE).unwrap();

        assert!(store.set_value(&key, balance(42), STALE));
        assert!(!store.complete_fetch(&ticket, Ok(balance(1))));
        assert_eq!(cached_balance(&store), Some(42));
    }

    #[tokio::test]
    async fn test_abandoned_fetch_releases_waiters() {
        let store = ResourceStore::new();
        let key = ResourceKey::CreditBalance;
        let ticket = store.begin_fetch(&key, STALE).unwrap();
        store.complete_fetch(&ticket, Ok(balance(300)));

        let dropped = store.begin_fetch(&key, STALE).unwrap();
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.wait_settled(&ResourceKey::CreditBalance).await })
        };
        tokio::task::yield_now().await;

        assert!(store.abandon(&dropped));
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        let entry = store.entry(&key).unwrap();
        assert!(!entry.is_loading);
        assert_eq!(cached_balance(&store), Some(300));
        assert!(!store.abandon(&dropped), "already released");
    }

    #[test]
    fn test_abandoning_superseded_fetch_keeps_newer_in_flight() {
        let store = ResourceStore::new();
        let key = ResourceKey::CreditBalance;
        let older = store.begin_fetch(&key, STALE).unwrap();
        let _newer = store.begin_fetch(&key, STALE).unwrap();

        assert!(!store.abandon(&older));
        assert!(store.entry(&key).unwrap().is_loading);
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let store = ResourceStore::new();
        let mut rx = store.subscribe();
        let key = ResourceKey::CreditBalance;

        let ticket = store.begin_fetch(&key, STALE).unwrap();
        store.complete_fetch(&ticket, Ok(balance(1)));
        store.invalidate(|k| *k == ResourceKey::CreditBalance);

        assert!(matches!(rx.recv().await.unwrap(), StoreEvent::Loading(ResourceKey::CreditBalance)));
        assert!(matches!(rx.recv().await.unwrap(), StoreEvent::Updated(ResourceKey::CreditBalance)));
        assert!(matches!(rx.recv().await.unwrap(), StoreEvent::Invalidated(ResourceKey::CreditBalance)));
    }

    #[tokio::test]
    async fn test_wait_settled_returns_after_completion() {
        let store = ResourceStore::new();
        let key = ResourceKey::CreditBalance;
        let ticket = store.begin_fetch(&key, STALE).unwrap();

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.wait_settled(&ResourceKey::CreditBalance).await })
        };
        tokio::task::yield_now().await;
        store.complete_fetch(&ticket, Ok(balance(7)));

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached_balance(&store), Some(7));
    }

    #[test]
    fn test_stats() {
        let store = ResourceStore::new();
        let ticket = store.begin_fetch(&ResourceKey::CreditBalance, STALE).unwrap();
        store.complete_fetch(&ticket, Err(BillingError::Timeout));
        store.begin_fetch(&ResourceKey::Usage, STALE).unwrap();

        let stats = store.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.loading_entries, 1);
        assert_eq!(stats.errored_entries, 1);
        assert_eq!(stats.stale_entries, 2);
    }
}

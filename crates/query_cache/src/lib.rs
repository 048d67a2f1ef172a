// Rust guideline compliant 2026-10-04

//! Query cache -- keyed store of server-derived collections.
//!
//! Reads never wait: [`QueryCache::get`] returns the last known value and
//! schedules a background refresh when the entry is absent, stale or
//! invalidated (stale-while-revalidate). Refreshes for one key are
//! coalesced into a single in-flight fetch. Push events are treated as
//! invalidation hints only; values always come from the [`Fetcher`]. A
//! reconnect re-derives the pushed collections, since hints sent while the
//! channel was down are lost.
//!
//! Entry points: [`QueryCache::get`], [`QueryCache::invalidate`],
//! [`QueryCache::refresh_pending`], [`QueryCache::run`], [`QueryCache::attach`],
//! [`QueryCache::watch_connection`].
//! Configuration via [`CachePolicy::builder`].

use connection::{ConnectionManager, StateWatch};
use domain::{ConnectionState, Fetcher, QueryKey, Transport, events, namespaces};
use event_bus::{ConsumerId, EventBus, Subscription};
use futures::future::join_all;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Consumer label used on the event bus.
pub const CONSUMER: &str = "query_cache";

// ---------------------------------------------------------------------------
// QueryCacheError
// ---------------------------------------------------------------------------

/// Errors raised while configuring the cache.
///
/// Fetch failures are not errors of the cache: the last known value is kept.
#[derive(Debug, thiserror::Error)]
pub enum QueryCacheError {
    /// The supplied configuration is invalid.
    #[error("invalid cache policy: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// CachePolicy + builder
// ---------------------------------------------------------------------------

/// Staleness windows per namespace.
///
/// Construct via [`CachePolicy::builder`].
#[derive(Debug, Clone)]
pub struct CachePolicy {
    /// Window for namespaces without an explicit entry.
    pub default_stale_after: Duration,
    /// Per-namespace windows.
    pub stale_after: BTreeMap<String, Duration>,
}

/// Builder for [`CachePolicy`].
#[derive(Debug)]
pub struct CachePolicyBuilder {
    default_stale_after: Duration,
    stale_after: BTreeMap<String, Duration>,
}

impl CachePolicy {
    /// Create a builder.
    ///
    /// Default values: `transactions = 30 s`, `merchant-intel = 60 s`,
    /// anything else `30 s`.
    #[must_use]
    pub fn builder() -> CachePolicyBuilder {
        CachePolicyBuilder {
            default_stale_after: Duration::from_secs(30),
            stale_after: BTreeMap::from([
                (namespaces::TRANSACTIONS.to_owned(), Duration::from_secs(30)),
                (namespaces::MERCHANT_INTEL.to_owned(), Duration::from_secs(60)),
            ]),
        }
    }

    /// Staleness window applied to entries of `namespace`.
    #[must_use]
    pub fn stale_after_for(&self, namespace: &str) -> Duration {
        self.stale_after.get(namespace).copied().unwrap_or(self.default_stale_after)
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        let b = Self::builder();
        Self { default_stale_after: b.default_stale_after, stale_after: b.stale_after }
    }
}

impl CachePolicyBuilder {
    /// Override the window of one namespace.
    #[must_use]
    pub fn stale_after(mut self, namespace: &str, window: Duration) -> Self {
        self.stale_after.insert(namespace.to_owned(), window);
        self
    }

    /// Override the fallback window.
    #[must_use]
    pub fn default_stale_after(mut self, window: Duration) -> Self {
        self.default_stale_after = window;
        self
    }

    /// Validate and build the policy.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCacheError::InvalidConfig`] when any window is zero.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<CachePolicy, QueryCacheError> {
        if self.default_stale_after.is_zero() {
            return Err(QueryCacheError::InvalidConfig {
                reason: "default_stale_after must be > 0".to_owned(),
            });
        }
        if let Some((namespace, _)) = self.stale_after.iter().find(|(_, w)| w.is_zero()) {
            return Err(QueryCacheError::InvalidConfig {
                reason: format!("stale_after for {namespace} must be > 0"),
            });
        }
        Ok(CachePolicy { default_stale_after: self.default_stale_after, stale_after: self.stale_after })
    }
}

// ---------------------------------------------------------------------------
// CacheEntry
// ---------------------------------------------------------------------------

/// A cached value with the time it was fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    /// Key the value was fetched for.
    pub key: QueryKey,
    /// Last known value.
    pub value: V,
    /// When the fetch settled.
    pub fetched_at: Instant,
    /// Age after which the value is refreshed on read.
    pub stale_after: Duration,
}

impl<V> CacheEntry<V> {
    /// `true` once the entry is older than its window at `now`.
    #[must_use]
    pub fn is_stale_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) > self.stale_after
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchState {
    Idle,
    Queued,
    InFlight,
}

struct Slot<V> {
    entry: Option<CacheEntry<V>>,
    invalidated: bool,
    /// Bumped on every invalidation; a fetch started under an older
    /// generation must not clear the flag.
    generation: u64,
    fetch: FetchState,
}

impl<V> Slot<V> {
    fn new() -> Self {
        Self { entry: None, invalidated: false, generation: 0, fetch: FetchState::Idle }
    }
}

// ---------------------------------------------------------------------------
// QueryCache
// ---------------------------------------------------------------------------

/// Stale-while-revalidate cache in front of a [`Fetcher`].
///
/// Generic over the fetch port for static dispatch. Background refreshes
/// are driven by [`run`](Self::run) (or [`refresh_pending`](Self::refresh_pending)
/// in tests); no task is spawned.
pub struct QueryCache<F: Fetcher> {
    fetcher: F,
    policy: CachePolicy,
    slots: RefCell<HashMap<QueryKey, Slot<F::Value>>>,
    /// Keys waiting for a fetch, in scheduling order.
    queue: RefCell<Vec<QueryKey>>,
    wake: Notify,
    closed: Cell<bool>,
    fetches: Cell<usize>,
}

impl<F: Fetcher> QueryCache<F> {
    /// Create an empty cache.
    #[must_use]
    pub fn new(fetcher: F, policy: CachePolicy) -> Self {
        Self {
            fetcher,
            policy,
            slots: RefCell::new(HashMap::new()),
            queue: RefCell::new(vec![]),
            wake: Notify::new(),
            closed: Cell::new(false),
            fetches: Cell::new(0),
        }
    }

    /// The underlying fetch port.
    #[must_use]
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Last known value for `key`, without waiting.
    ///
    /// Schedules a refresh when the entry is absent, stale or invalidated,
    /// unless one is already queued or in flight for that key.
    pub fn get(&self, key: &QueryKey) -> Option<F::Value> {
        let now = Instant::now();
        let mut slots = self.slots.borrow_mut();
        let slot = slots.entry(key.clone()).or_insert_with(Slot::new);
        let fresh = !slot.invalidated && slot.entry.as_ref().is_some_and(|e| !e.is_stale_at(now));
        if !fresh && slot.fetch == FetchState::Idle {
            slot.fetch = FetchState::Queued;
            self.queue.borrow_mut().push(key.clone());
            self.wake.notify_one();
            tracing::debug!(%key, "query_cache.refresh.scheduled");
        }
        slot.entry.as_ref().map(|e| e.value.clone())
    }

    /// Cached entry for `key`, if any. Never schedules a refresh.
    #[must_use]
    pub fn peek(&self, key: &QueryKey) -> Option<CacheEntry<F::Value>> {
        self.slots.borrow().get(key).and_then(|s| s.entry.clone())
    }

    /// Force the next [`get`](Self::get) of `key` to refetch, whatever its age.
    ///
    /// Returns `false` when the key was never requested.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let mut slots = self.slots.borrow_mut();
        let Some(slot) = slots.get_mut(key) else {
            return false;
        };
        slot.invalidated = true;
        slot.generation += 1;
        tracing::debug!(%key, "query_cache.invalidated");
        true
    }

    /// Invalidate every key of `namespace`. Returns how many keys were hit.
    pub fn invalidate_namespace(&self, namespace: &str) -> usize {
        let mut hit = 0;
        for (_, slot) in self.slots.borrow_mut().iter_mut().filter(|(k, _)| k.namespace == namespace) {
            slot.invalidated = true;
            slot.generation += 1;
            hit += 1;
        }
        tracing::debug!(namespace, keys = hit, "query_cache.namespace.invalidated");
        hit
    }

    /// Number of keys waiting for a fetch.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Total fetches issued so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.get()
    }

    /// Fetch every queued key concurrently, one fetch per key, and store the
    /// results. Returns the number of fetches issued.
    ///
    /// A failed fetch keeps the last known value. A fetch overtaken by an
    /// invalidation stores its value but leaves the key invalidated.
    pub async fn refresh_pending(&self) -> usize {
        let batch: Vec<(QueryKey, u64)> = {
            let keys = std::mem::take(&mut *self.queue.borrow_mut());
            let mut slots = self.slots.borrow_mut();
            keys.into_iter()
                .filter_map(|key| {
                    let slot = slots.get_mut(&key)?;
                    slot.fetch = FetchState::InFlight;
                    let generation = slot.generation;
                    Some((key, generation))
                })
                .collect()
        };
        if batch.is_empty() {
            return 0;
        }
        self.fetches.set(self.fetches.get() + batch.len());

        let results = join_all(batch.iter().map(|(key, _)| self.fetcher.fetch(key))).await;

        let now = Instant::now();
        let issued = batch.len();
        let mut slots = self.slots.borrow_mut();
        for ((key, generation), result) in batch.into_iter().zip(results) {
            let Some(slot) = slots.get_mut(&key) else {
                continue;
            };
            slot.fetch = FetchState::Idle;
            match result {
                Ok(value) => {
                    if slot.generation == generation {
                        slot.invalidated = false;
                    } else {
                        tracing::debug!(%key, "query_cache.refresh.superseded: invalidated while in flight");
                    }
                    tracing::debug!(%key, "query_cache.refresh.stored");
                    let stale_after = self.policy.stale_after_for(&key.namespace);
                    slot.entry = Some(CacheEntry { key, value, fetched_at: now, stale_after });
                }
                Err(e) => {
                    tracing::warn!(%key, error = %e, "query_cache.refresh.failed: keeping last known value");
                }
            }
        }
        issued
    }

    /// Drive background refreshes until [`close`](Self::close) is called.
    ///
    /// Returns the number of refresh rounds executed.
    pub async fn run(&self) -> u64 {
        let mut rounds = 0u64;
        while !self.closed.get() {
            if self.queue.borrow().is_empty() {
                self.wake.notified().await;
                continue;
            }
            self.refresh_pending().await;
            rounds += 1;
        }
        tracing::info!(rounds, "query_cache.run.stopped");
        rounds
    }

    /// Stop [`run`](Self::run) after its current round.
    pub fn close(&self) {
        self.closed.set(true);
        self.wake.notify_one();
    }
}

impl<F> QueryCache<F>
where
    F: Fetcher + 'static,
    F::Value: 'static,
{
    /// Subscribe to the invalidation hints carried by the live channel.
    ///
    /// `transaction:new`, and `analytics:update` when it carries
    /// `transactions`, invalidate the whole transactions namespace. Payloads
    /// are never stored. Dropping the returned handles detaches the cache.
    pub fn attach(self: &Rc<Self>, bus: &EventBus) -> Vec<Subscription> {
        let consumer = ConsumerId::new(CONSUMER);
        let on_new = Rc::downgrade(self);
        let on_update = Rc::downgrade(self);
        vec![
            bus.on(events::TRANSACTION_NEW, &consumer, move |_| {
                if let Some(cache) = on_new.upgrade() {
                    cache.invalidate_namespace(namespaces::TRANSACTIONS);
                }
                Ok(())
            }),
            bus.on(events::ANALYTICS_UPDATE, &consumer, move |event| {
                if event.payload.get("transactions").is_some()
                    && let Some(cache) = on_update.upgrade()
                {
                    cache.invalidate_namespace(namespaces::TRANSACTIONS);
                }
                Ok(())
            }),
        ]
    }

    /// Invalidate the transactions namespace each time `manager` comes back
    /// to `Connected` after a drop. The first connection invalidates nothing.
    pub fn watch_connection<T: Transport>(self: &Rc<Self>, manager: &ConnectionManager<T>) -> StateWatch {
        let cache = Rc::downgrade(self);
        let connected_before = Cell::new(false);
        manager.on_state_change(move |status| {
            if status.state != ConnectionState::Connected {
                return;
            }
            if connected_before.replace(true)
                && let Some(cache) = cache.upgrade()
            {
                let invalidated = cache.invalidate_namespace(namespaces::TRANSACTIONS);
                tracing::info!(invalidated, "query_cache.reconnected: transactions invalidated");
            }
        })
    }
}

impl<F: Fetcher> fmt::Debug for QueryCache<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("keys", &self.slots.borrow().len())
            .field("pending", &self.queue.borrow().len())
            .field("fetches", &self.fetches.get())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

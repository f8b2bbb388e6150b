//! Three-tier cache for the service catalog
//!
//! `ServiceCache` answers "what is the current catalog?" from process memory,
//! then from the persistent store, then from the network. Concurrent callers
//! that miss both caches share a single network fetch, and a failed fetch
//! falls back to whatever catalog was seen before, however old.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::clock::{is_fresh, Clock, SystemClock};
use super::store::{KeyValueStore, StorageError};
use crate::config::CacheConfig;
use crate::data::{Catalog, CatalogSource, FetchError, Service};

type FetchResult = Result<Catalog, Arc<FetchError>>;
type FetchChannel = Shared<oneshot::Receiver<FetchResult>>;

/// The only failure `ServiceCache` reports to its callers
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The fetch failed and no earlier catalog exists to fall back to
    #[error("service catalog unavailable: {0}")]
    CatalogUnavailable(#[source] Arc<FetchError>),
}

impl CacheError {
    /// The fetch failure behind this error
    pub fn cause(&self) -> &FetchError {
        match self {
            CacheError::CatalogUnavailable(cause) => cause,
        }
    }

    /// Whether the worker answered, but not with a list of services
    pub fn is_invalid_shape(&self) -> bool {
        matches!(self.cause(), FetchError::InvalidShape(_))
    }
}

/// A catalog together with the time it was fetched
#[derive(Debug, Clone)]
struct CacheEntry {
    services: Catalog,
    /// Milliseconds since the epoch; `None` if the stored timestamp was lost
    fetched_at: Option<i64>,
}

/// The network fetch currently shared by all callers
struct InFlight {
    generation: u64,
    channel: FetchChannel,
}

#[derive(Default)]
struct State {
    memory: Option<CacheEntry>,
    in_flight: Option<InFlight>,
    next_generation: u64,
}

struct Inner {
    config: CacheConfig,
    source: Arc<dyn CatalogSource>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

/// Snapshot of one cache tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStatus {
    /// Number of services held
    pub services: usize,
    /// When the catalog was fetched, if known
    pub fetched_at: Option<DateTime<Utc>>,
    /// Whether the entry is still inside the expiry window
    pub fresh: bool,
}

/// Snapshot of the whole cache, for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStatus {
    pub memory: Option<EntryStatus>,
    pub persisted: Option<EntryStatus>,
    pub fetch_in_flight: bool,
}

/// Handle to the catalog cache
///
/// Cloning is cheap; all clones share the same memory tier and in-flight
/// fetch. Construct one per process and hand clones to every consumer.
#[derive(Clone)]
pub struct ServiceCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ServiceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCache")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl ServiceCache {
    /// Creates a cache over `source` and `store` using wall-clock time
    pub fn new(
        config: CacheConfig,
        source: Arc<dyn CatalogSource>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self::with_clock(config, source, store, Arc::new(SystemClock))
    }

    /// Creates a cache with a custom time source
    pub fn with_clock(
        config: CacheConfig,
        source: Arc<dyn CatalogSource>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                source,
                store,
                clock,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Returns the current catalog
    ///
    /// # Behavior
    /// - A fresh in-memory catalog is returned without any I/O
    /// - Otherwise a network fetch that is already running is joined
    /// - Otherwise a fresh persisted catalog is promoted to memory and returned
    /// - Otherwise a new network fetch is started; on success both tiers are
    ///   replaced
    /// - If the fetch fails, the persisted catalog is returned even if expired
    ///
    /// # Errors
    /// `CacheError::CatalogUnavailable` when the fetch failed and there is no
    /// earlier catalog at all.
    pub async fn get_services(&self) -> Result<Catalog, CacheError> {
        let inner = &self.inner;
        let now = inner.clock.now_millis();

        let joined = {
            let state = inner.state.lock();
            if let Some(services) = inner.fresh_memory(&state, now) {
                return Ok(services);
            }
            state.in_flight.as_ref().map(|in_flight| {
                debug!(generation = in_flight.generation, "joining in-flight catalog fetch");
                in_flight.channel.clone()
            })
        };
        if let Some(channel) = joined {
            return Self::await_fetch(channel).await;
        }

        // Storage is read without holding the state lock, so the checks
        // above are repeated once it is taken again.
        let persisted = inner
            .read_persisted()
            .filter(|entry| is_fresh(entry.fetched_at, now, inner.config.expiry));

        let channel = {
            let mut state = inner.state.lock();

            if let Some(services) = inner.fresh_memory(&state, now) {
                return Ok(services);
            }

            let joined = state.in_flight.as_ref().map(|in_flight| {
                debug!(generation = in_flight.generation, "joining in-flight catalog fetch");
                in_flight.channel.clone()
            });

            match (joined, persisted) {
                (Some(channel), _) => channel,
                (None, Some(entry)) => {
                    debug!(services = entry.services.len(), "catalog promoted from storage");
                    let services = entry.services.clone();
                    state.memory = Some(entry);
                    return Ok(services);
                }
                (None, None) => self.spawn_fetch(&mut state),
            }
        };

        Self::await_fetch(channel).await
    }

    async fn await_fetch(channel: FetchChannel) -> Result<Catalog, CacheError> {
        match channel.await {
            Ok(result) => result.map_err(CacheError::CatalogUnavailable),
            Err(_cancelled) => Err(CacheError::CatalogUnavailable(Arc::new(
                FetchError::Interrupted,
            ))),
        }
    }

    /// Warms the cache in the background
    ///
    /// Waits `preload_delay`, then loads the catalog. Failures are logged at
    /// debug level and otherwise dropped. The returned handle may be ignored.
    ///
    /// Must be called from within a tokio runtime.
    pub fn preload(&self) -> JoinHandle<()> {
        let cache = self.clone();
        let delay = self.inner.config.preload_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match cache.get_services().await {
                Ok(services) => debug!(services = services.len(), "catalog preloaded"),
                Err(err) => debug!(error = %err, "catalog preload failed"),
            }
        })
    }

    /// Drops both the in-memory and the persisted catalog
    ///
    /// A fetch that is already running is not cancelled and will still store
    /// its result, but later callers no longer join it.
    pub fn clear_cache(&self) {
        let inner = &self.inner;
        {
            let mut state = inner.state.lock();
            state.memory = None;
            state.in_flight = None;
        }

        for key in [&inner.config.services_key, &inner.config.timestamp_key] {
            if let Err(err) = inner.store.remove(key) {
                warn!(%key, error = %err, "failed to remove persisted catalog");
            }
        }
        info!("catalog cache cleared");
    }

    /// Reports what each tier currently holds
    pub fn status(&self) -> CacheStatus {
        let inner = &self.inner;
        let now = inner.clock.now_millis();
        let describe = |entry: &CacheEntry| EntryStatus {
            services: entry.services.len(),
            fetched_at: entry
                .fetched_at
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            fresh: is_fresh(entry.fetched_at, now, inner.config.expiry),
        };

        let (memory, fetch_in_flight) = {
            let state = inner.state.lock();
            (state.memory.as_ref().map(describe), state.in_flight.is_some())
        };

        CacheStatus {
            memory,
            persisted: inner.read_persisted().as_ref().map(describe),
            fetch_in_flight,
        }
    }

    /// Starts a network fetch on the runtime and registers it as in flight
    ///
    /// The fetch runs as its own task so that it completes even if every
    /// caller waiting on it goes away.
    fn spawn_fetch(&self, state: &mut State) -> FetchChannel {
        let generation = state.next_generation;
        state.next_generation += 1;

        let (sender, receiver) = oneshot::channel();
        let inner = self.inner.clone();

        tokio::spawn(async move {
            let result = inner.fetch_and_store(generation).await;
            sender.send(result).ok();
        });

        let channel = receiver.shared();
        state.in_flight = Some(InFlight {
            generation,
            channel: channel.clone(),
        });
        debug!(generation, "started catalog fetch");
        channel
    }
}

impl Inner {
    async fn fetch_and_store(&self, generation: u64) -> FetchResult {
        let timeout = self.config.fetch_timeout;
        let outcome = match tokio::time::timeout(timeout, self.source.fetch()).await {
            Ok(outcome) => outcome,
            Err(_elapsed) => Err(FetchError::Timeout(timeout.as_millis() as u64)),
        };

        match outcome {
            Ok(decoded) => {
                let fetched_at = self.clock.now_millis();
                let services: Catalog = Arc::new(decoded.services);
                info!(services = services.len(), "fetched service catalog");

                if let Err(err) = self.persist(&services, fetched_at) {
                    warn!(error = %err, "failed to persist catalog, keeping it in memory only");
                }

                let mut state = self.state.lock();
                state.memory = Some(CacheEntry {
                    services: services.clone(),
                    fetched_at: Some(fetched_at),
                });
                Self::finish(&mut state, generation);
                Ok(services)
            }
            Err(err) => {
                warn!(error = %err, "catalog fetch failed");
                let fallback = self.read_persisted().or_else(|| {
                    let state = self.state.lock();
                    state.memory.clone()
                });

                let mut state = self.state.lock();
                Self::finish(&mut state, generation);
                match fallback {
                    Some(entry) => {
                        warn!(
                            services = entry.services.len(),
                            fetched_at = ?entry.fetched_at,
                            "serving stale catalog"
                        );
                        Ok(entry.services)
                    }
                    None => Err(Arc::new(err)),
                }
            }
        }
    }

    fn fresh_memory(&self, state: &State, now: i64) -> Option<Catalog> {
        let entry = state.memory.as_ref()?;
        if !is_fresh(entry.fetched_at, now, self.config.expiry) {
            return None;
        }
        debug!(services = entry.services.len(), "catalog served from memory");
        Some(entry.services.clone())
    }

    /// Releases the in-flight slot, unless a newer fetch has taken it over
    fn finish(state: &mut State, generation: u64) {
        if state
            .in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.generation == generation)
        {
            state.in_flight = None;
        }
    }

    fn persist(&self, services: &[Service], fetched_at: i64) -> Result<(), StorageError> {
        let json = serde_json::to_string(services)?;
        self.store.set(&self.config.services_key, &json)?;
        self.store
            .set(&self.config.timestamp_key, &fetched_at.to_string())?;
        Ok(())
    }

    /// Reads the persisted catalog, treating any storage failure as absence
    fn read_persisted(&self) -> Option<CacheEntry> {
        match self.try_read_persisted() {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "failed to read persisted catalog");
                None
            }
        }
    }

    fn try_read_persisted(&self) -> Result<Option<CacheEntry>, StorageError> {
        let Some(json) = self.store.get(&self.config.services_key)? else {
            return Ok(None);
        };
        let services: Vec<Service> = serde_json::from_str(&json)
            .map_err(|_| StorageError::Corrupt(self.config.services_key.clone()))?;

        let fetched_at = match self.store.get(&self.config.timestamp_key)? {
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(ms) => Some(ms),
                Err(_) => {
                    debug!(%raw, "ignoring unparseable catalog timestamp");
                    None
                }
            },
            None => None,
        };

        Ok(Some(CacheEntry {
            services: Arc::new(services),
            fetched_at,
        }))
    }
}

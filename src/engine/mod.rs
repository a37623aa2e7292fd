//! Dependency-aware memoization engine
//!
//! `load` returns a shared future for an address, building it on a miss
//! with the builder registered for the address's type. Builders load their
//! own dependencies through a [`Loader`], which records a consumer edge on
//! each dependency. `invalidate` follows those edges upward.
//!
//! # Locking
//!
//! One mutex guards the entry table. It is held across the check-and-insert
//! of `load`, consumer-edge insertion and entry removal, never across a
//! build, so two concurrent loads of the same address always share one
//! build.
//!
//! # Build execution
//!
//! Inside a tokio runtime a build is spawned as soon as its entry is
//! registered and runs to completion even if the entry is invalidated or
//! nobody awaits it. Outside a runtime the build starts on first poll.

mod entry;
mod invalidate;
mod loader;
mod options;

pub use entry::EntryInfo;
pub use invalidate::{Invalidation, InvalidationReport};
pub use loader::{KindHandle, Loader};
pub use options::{EngineOptions, ExpiryPolicy, FailurePolicy};

use crate::address::Address;
use crate::container::AddressMap;
use crate::diagnostics::{DiagnosticSink, SilentSink};
use crate::error::{LoadError, LoadResult};
use crate::registry::{BuildOptions, Builder, BuilderDescriptor, BuilderRegistry};
use chrono::Utc;
use entry::CacheEntry;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, trace, warn};

/// Shared, cloneable future of a build result
pub type Pending<V> = Shared<BoxFuture<'static, LoadResult<V>>>;

/// Values an engine can memoize
///
/// `Default` supplies the value of `touch` addresses.
pub trait Artifact: Clone + Default + Send + Sync + 'static {}

impl<T> Artifact for T where T: Clone + Default + Send + Sync + 'static {}

pub(crate) type Entries<V> = AddressMap<CacheEntry<V>>;

pub(crate) struct EngineState<V> {
    registry: RwLock<BuilderRegistry<V>>,
    entries: Mutex<Entries<V>>,
    sink: RwLock<Arc<dyn DiagnosticSink>>,
    options: EngineOptions,
    generation: AtomicU64,
}

/// Memoization engine handle
///
/// Cloning is cheap and every clone shares the same cache and registry.
/// The cache lives until the last handle is dropped.
pub struct Engine<V = Value> {
    state: Arc<EngineState<V>>,
}

impl<V> Clone for Engine<V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<V: Artifact> Engine<V> {
    /// Create an engine with default options
    pub fn new(registry: BuilderRegistry<V>) -> Self {
        Self::with_options(registry, EngineOptions::default())
    }

    /// Create an engine with explicit options
    pub fn with_options(registry: BuilderRegistry<V>, options: EngineOptions) -> Self {
        Self {
            state: Arc::new(EngineState {
                registry: RwLock::new(registry),
                entries: Mutex::new(Entries::new()),
                sink: RwLock::new(Arc::new(SilentSink)),
                options,
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub(crate) fn from_state(state: Arc<EngineState<V>>) -> Self {
        Self { state }
    }

    /// Options the engine was created with
    pub fn options(&self) -> &EngineOptions {
        &self.state.options
    }

    /// Replace the diagnostic sink receiving invalidation events
    pub fn set_sink(&self, sink: Arc<dyn DiagnosticSink>) {
        *self
            .state
            .sink
            .write()
            .unwrap_or_else(PoisonError::into_inner) = sink;
    }

    /// Register (or replace) a builder after construction
    ///
    /// Entries already cached for `kind` are kept.
    pub fn offer<F, Fut>(&self, kind: impl Into<String>, build: F)
    where
        F: Fn(Address, Loader<V>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LoadResult<V>> + Send + 'static,
    {
        self.registry_mut().offer(kind, build);
    }

    /// Register (or replace) a builder with options
    pub fn offer_with<F, Fut>(&self, kind: impl Into<String>, build: F, options: BuildOptions)
    where
        F: Fn(Address, Loader<V>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LoadResult<V>> + Send + 'static,
    {
        self.registry_mut().offer_with(kind, build, options);
    }

    /// Register (or replace) a [`Builder`] implementation
    pub fn offer_builder(
        &self,
        kind: impl Into<String>,
        builder: impl Builder<V> + 'static,
        options: BuildOptions,
    ) {
        self.registry_mut().offer_builder(kind, builder, options);
    }

    /// Whether a builder is registered for a type
    pub fn has_builder(&self, kind: &str) -> bool {
        self.state
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(kind)
    }

    /// Handle that loads addresses of one type from bare field maps
    pub fn kind(&self, kind: impl Into<String>) -> KindHandle<V> {
        KindHandle::new(self.clone(), kind.into())
    }

    /// Start or join the build for `address`
    ///
    /// Fails without touching the cache when no builder is registered for
    /// the address's type. Otherwise every caller gets a clone of the same
    /// shared future until the entry is invalidated or expires, and a
    /// failed build is shared exactly like a successful one (see
    /// [`FailurePolicy`]).
    pub fn load(&self, address: &Address) -> LoadResult<Pending<V>> {
        let mut expired = Vec::new();
        let pending = {
            let mut entries = self.entries();
            self.get_or_create(&mut entries, address, &mut expired)?
        };
        self.emit(&expired);
        Ok(pending)
    }

    /// Load `address` and wait for its value
    pub async fn get(&self, address: &Address) -> LoadResult<V> {
        self.load(address)?.await
    }

    /// Load `address` on behalf of `consumer` and record the edge
    ///
    /// A live entry is reused whether or not its TTL has passed. Expiry is
    /// only acted on by top-level loads.
    pub(crate) fn load_dependency(
        &self,
        address: &Address,
        consumer: &Address,
    ) -> LoadResult<Pending<V>> {
        if address == consumer {
            return Err(LoadError::Cycle(address.to_string()));
        }

        let mut entries = self.entries();
        let pending = match entries.get(address) {
            Some(entry) => {
                if entry.value.peek().is_none()
                    && invalidate::reaches(&*entries, consumer, address)
                {
                    warn!(
                        dependency = %address,
                        consumer = %consumer,
                        "possible dependency cycle, build may never settle"
                    );
                }
                entry.value.clone()
            }
            None => {
                let mut expired = Vec::new();
                let pending = self.get_or_create(&mut entries, address, &mut expired)?;
                debug_assert!(expired.is_empty());
                pending
            }
        };
        if let Some(entry) = entries.get_mut(address) {
            entry.consumers.insert(consumer.clone());
        }
        drop(entries);

        trace!(dependency = %address, consumer = %consumer, "recorded dependency");
        Ok(pending)
    }

    /// Remove `target` and everything that transitively consumed it
    pub fn invalidate(&self, target: impl Into<Invalidation>) -> InvalidationReport {
        let removed = {
            let mut entries = self.entries();
            invalidate::apply(&mut entries, target.into())
        };
        if !removed.is_empty() {
            debug!(count = removed.len(), "invalidated entries");
        }
        self.emit(&removed);
        InvalidationReport::new(removed)
    }

    /// Invalidate every live entry whose address matches `predicate`
    ///
    /// The predicate runs while the entry table is locked and must not
    /// call back into the engine.
    pub fn invalidate_where(
        &self,
        predicate: impl Fn(&Address) -> bool + Send + Sync + 'static,
    ) -> InvalidationReport {
        self.invalidate(Invalidation::matching(predicate))
    }

    /// Number of live entries, fresh or not
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Whether an entry exists for `address`, fresh or not
    pub fn contains(&self, address: &Address) -> bool {
        self.entries().contains_key(address)
    }

    /// Addresses of all live entries
    pub fn addresses(&self) -> Vec<Address> {
        self.entries().keys().cloned().collect()
    }

    /// Addresses recorded as consumers of `address`
    pub fn consumers_of(&self, address: &Address) -> Option<Vec<Address>> {
        self.entries()
            .get(address)
            .map(|entry| entry.consumers.iter().cloned().collect())
    }

    /// Snapshot of the entry for `address`
    pub fn entry_info(&self, address: &Address) -> Option<EntryInfo> {
        self.entries().get(address).map(CacheEntry::info)
    }

    /// Drop every entry without cascading or emitting diagnostics
    pub fn clear(&self) {
        self.entries().clear();
        debug!("cache cleared");
    }

    fn entries(&self) -> MutexGuard<'_, Entries<V>> {
        self.state
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_mut(&self) -> std::sync::RwLockWriteGuard<'_, BuilderRegistry<V>> {
        self.state
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The atomic check-and-insert behind `load`. Must run with the entry
    /// table locked. Addresses removed by a cascading expiry are appended
    /// to `expired`.
    fn get_or_create(
        &self,
        entries: &mut Entries<V>,
        address: &Address,
        expired: &mut Vec<Address>,
    ) -> LoadResult<Pending<V>> {
        let now = Utc::now();
        let stale = match entries.get(address) {
            Some(entry) if entry.is_fresh(now) => {
                trace!(address = %address, "cache hit");
                return Ok(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        let descriptor = self
            .state
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address.kind())
            .cloned()
            .ok_or_else(|| LoadError::UnknownType(address.kind().to_string()))?;

        if stale {
            debug!(address = %address, policy = ?self.state.options.expiry, "entry expired");
            if self.state.options.expiry == ExpiryPolicy::Cascade {
                expired.extend(invalidate::apply(
                    entries,
                    Invalidation::Address(address.clone()),
                ));
            }
        }

        let generation = self.state.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let expires_at = self
            .state
            .options
            .ttl_for(address.kind(), descriptor.options.ttl)
            .and_then(|ttl| now.checked_add_signed(ttl));

        debug!(address = %address, generation, "building");
        let value = self.start_build(address, descriptor, generation);
        entries.insert(
            address.clone(),
            CacheEntry::new(address.clone(), value.clone(), expires_at, generation),
        );
        Ok(value)
    }

    fn start_build(
        &self,
        address: &Address,
        descriptor: BuilderDescriptor<V>,
        generation: u64,
    ) -> Pending<V> {
        let loader = Loader::new(&self.state, address.clone());
        let evict = match self.state.options.failures {
            FailurePolicy::Cache => None,
            FailurePolicy::Evict => Some(Arc::downgrade(&self.state)),
        };
        let owned = address.clone();
        let builder = descriptor.builder;

        let build = async move {
            let result = match AssertUnwindSafe(builder.build(&owned, loader))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(_) => {
                    warn!(address = %owned, "builder panicked");
                    Err(LoadError::build(&owned, "builder panicked"))
                }
            };

            if let Err(err) = &result {
                debug!(address = %owned, error = %err, "build failed");
                if let Some(state) = evict.and_then(|weak| weak.upgrade()) {
                    Engine::from_state(state).evict_failed(&owned, generation);
                }
            }
            result
        };

        let settled: BoxFuture<'static, LoadResult<V>> =
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let task = handle.spawn(build);
                    let label = address.to_string();
                    async move {
                        task.await.unwrap_or_else(|_| {
                            Err(LoadError::build(label, "build task was cancelled"))
                        })
                    }
                    .boxed()
                }
                Err(_) => build.boxed(),
            };

        settled.shared()
    }

    /// Drop a failed entry unless it was already superseded
    fn evict_failed(&self, address: &Address, generation: u64) {
        let mut entries = self.entries();
        if entries
            .get(address)
            .is_some_and(|entry| entry.generation == generation)
        {
            entries.remove(address);
            debug!(address = %address, "evicted failed build");
        }
    }

    fn emit(&self, removed: &[Address]) {
        if removed.is_empty() {
            return;
        }
        let sink = self
            .state
            .sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for address in removed {
            trace!(address = %address, "invalidated");
            sink.debug("invalidated", address);
        }
    }
}

impl<V: Artifact> Default for Engine<V> {
    fn default() -> Self {
        Self::new(BuilderRegistry::new())
    }
}

impl<V: Artifact> fmt::Debug for Engine<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("entries", &self.len())
            .field("options", &self.state.options)
            .finish_non_exhaustive()
    }
}

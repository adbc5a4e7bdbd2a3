//! Entity store - the coalescing cache for one entity type.

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::hydration::{CacheEntry, HydrationState, InFlight, Settled, SharedFetch};
use crate::observability::{NoOpMetrics, StoreMetrics};
use crate::path::ResourcePath;
use crate::strategy::FetchStrategy;
use crate::transport::Transport;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use futures::future::try_join_all;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Result of the synchronous check-and-set step of a lookup.
enum Lookup<V> {
    Ready(V),
    Pending(SharedFetch<V>),
}

/// What a lookup did, reported once the entry guard is released.
enum Event {
    Hit,
    Coalesced,
    Fetch,
    DeepFetch,
}

/// Entry counts per hydration state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total_entries: usize,
    pub loading: usize,
    pub shallow_ready: usize,
    pub deep_loading: usize,
    pub deep_ready: usize,
    pub failed: usize,
}

/// Cache of one entity type with request coalescing and staged hydration.
///
/// At most one shallow fetch and one deep fetch exist per id at any time;
/// concurrent callers attach to the fetch already in flight. Fetches run as
/// spawned tasks, so a caller that stops waiting does not stop the fetch, and
/// its result still lands in the cache.
///
/// Cloning is cheap and every clone shares the same cache.
///
/// Requires a tokio runtime.
///
/// # Example
///
/// ```ignore
/// use entity_kit::{EntityStore, transport::MemoryTransport};
///
/// let store: EntityStore<ProjectGroup, _> = EntityStore::new(transport);
///
/// let group = store.get(&"g1".to_string()).await?;        // fetches
/// let again = store.get(&"g1".to_string()).await?;        // cache hit
/// let full = store.get_deep(&"g1".to_string()).await?;    // fetches members
/// ```
pub struct EntityStore<V: Entity, T: Transport> {
    transport: Arc<T>,
    entries: Arc<DashMap<V::Key, CacheEntry<V>>>,
    versions: Arc<AtomicU64>,
    metrics: Arc<dyn StoreMetrics>,
}

impl<V: Entity, T: Transport> Clone for EntityStore<V, T> {
    fn clone(&self) -> Self {
        EntityStore {
            transport: Arc::clone(&self.transport),
            entries: Arc::clone(&self.entries),
            versions: Arc::clone(&self.versions),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<V: Entity, T: Transport> EntityStore<V, T> {
    /// Create an empty store on top of a transport.
    pub fn new(transport: T) -> Self {
        EntityStore {
            transport: Arc::new(transport),
            entries: Arc::new(DashMap::new()),
            versions: Arc::new(AtomicU64::new(0)),
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Arc<dyn StoreMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Get transport reference.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub(crate) fn metrics(&self) -> &dyn StoreMetrics {
        self.metrics.as_ref()
    }

    /// Versions and fetch tickets share one counter, so both are unique per store.
    fn next_version(&self) -> u64 {
        self.versions.fetch_add(1, Ordering::Relaxed) + 1
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Get an entity, fetching it at most once however many callers ask.
    ///
    /// - Ready entry: returned from cache.
    /// - Loading entry: the caller awaits the fetch already in flight.
    /// - Missing or failed entry: a new fetch starts.
    ///
    /// # Errors
    ///
    /// - `Error::Transport`: the fetch failed (every coalesced caller sees it)
    /// - `Error::DeserializationError` / `Error::ValidationError`: bad payload
    /// - `Error::Cancelled`: the fetch was cancelled with [`cancel`](Self::cancel)
    pub async fn get(&self, id: &V::Key) -> Result<V> {
        let (lookup, event) = self.lookup_or_fetch(id);
        self.report(id, event);

        match lookup {
            Lookup::Ready(value) => Ok(value),
            Lookup::Pending(fetch) => fetch.await,
        }
    }

    /// Get an entity with its deep fields attached.
    ///
    /// Shallow hydration happens first, exactly as in [`get`](Self::get). The
    /// deep fetch runs once per entry; later calls are served from cache.
    ///
    /// # Errors
    ///
    /// Same as `get`. A failed deep fetch is returned to its callers but leaves
    /// the shallow fields cached.
    pub async fn get_deep(&self, id: &V::Key) -> Result<V> {
        loop {
            self.get(id).await?;
            let Some((lookup, event)) = self.lookup_or_fetch_deep(id) else {
                debug!(
                    "Entry {} changed before deep fetch, restarting",
                    ResourcePath::item::<V>(id)
                );
                continue;
            };
            self.report(id, event);

            match lookup {
                Lookup::Ready(value) => return Ok(value),
                Lookup::Pending(fetch) => return fetch.await,
            }
        }
    }

    /// Get an entity using an explicit strategy.
    ///
    /// # Errors
    ///
    /// Same as `get`, plus `Error::CacheMiss` for `FetchStrategy::CacheOnly`.
    pub async fn get_with(&self, id: &V::Key, strategy: FetchStrategy) -> Result<V> {
        debug!(
            "» Lookup {} (strategy: {})",
            ResourcePath::item::<V>(id),
            strategy
        );

        match strategy {
            FetchStrategy::Cached => self.get(id).await,
            FetchStrategy::CacheOnly => self.peek(id).ok_or(Error::CacheMiss),
            FetchStrategy::Reload => {
                self.invalidate(id);
                self.get(id).await
            }
        }
    }

    /// Ready value without fetching. `None` while loading, failed, or absent.
    pub fn peek(&self, id: &V::Key) -> Option<V> {
        self.entries
            .get(id)
            .and_then(|entry| entry.ready_value().cloned())
    }

    /// Hydration state of an entry, if one exists.
    pub fn state(&self, id: &V::Key) -> Option<HydrationState> {
        self.entries.get(id).map(|entry| entry.state())
    }

    /// Error of the last fetch, if the entry is `Failed`.
    pub fn last_error(&self, id: &V::Key) -> Option<Error> {
        self.entries
            .get(id)
            .and_then(|entry| entry.last_error().cloned())
    }

    /// True if an entry exists for the id, in any state.
    pub fn contains(&self, id: &V::Key) -> bool {
        self.entries.contains_key(id)
    }

    /// Get the current number of entries, in any state.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Count entries per hydration state.
    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats::default();
        for entry in self.entries.iter() {
            stats.total_entries += 1;
            match entry.state() {
                HydrationState::Loading => stats.loading += 1,
                HydrationState::ShallowReady => stats.shallow_ready += 1,
                HydrationState::DeepLoading => stats.deep_loading += 1,
                HydrationState::DeepReady => stats.deep_ready += 1,
                HydrationState::Failed => stats.failed += 1,
            }
        }
        stats
    }

    // ------------------------------------------------------------------------
    // Cache maintenance
    // ------------------------------------------------------------------------

    /// Drop the entry for `id`. Returns whether one existed.
    ///
    /// A fetch already in flight keeps running; its result no longer matches
    /// any entry and is discarded.
    pub fn invalidate(&self, id: &V::Key) -> bool {
        let removed = self.entries.remove(id).is_some();
        if removed {
            debug!("✓ Invalidated {}", ResourcePath::item::<V>(id));
        }
        removed
    }

    /// Put a known entity into the cache as `ShallowReady`.
    pub fn seed(&self, entity: V) {
        let version = self.next_version();
        let id = entity.entity_key();
        debug!("✓ Seeded {} (version {})", ResourcePath::item::<V>(&id), version);
        self.entries.insert(id, CacheEntry::ready(entity, version));
    }

    /// Abort the fetch in flight for `id`.
    ///
    /// A shallow fetch is aborted and its entry dropped; a deep fetch is
    /// aborted and the entry falls back to its shallow fields. Waiting callers
    /// receive `Error::Cancelled`. Returns whether anything was cancelled.
    pub fn cancel(&self, id: &V::Key) -> bool {
        let loading = self.entries.remove_if(id, |_, entry| {
            entry.state() == HydrationState::Loading
        });
        if let Some((_, entry)) = loading {
            entry.abort();
            debug!("✓ Cancelled fetch for {}", ResourcePath::item::<V>(id));
            return true;
        }

        let cancelled = match self.entries.get_mut(id) {
            Some(mut entry) => entry.cancel_deep(),
            None => false,
        };
        if cancelled {
            debug!("✓ Cancelled deep fetch for {}", ResourcePath::item::<V>(id));
        }
        cancelled
    }

    /// Drop every entry (test teardown, logout).
    pub fn clear(&self) {
        self.entries.clear();
        warn!("⚠ Store CLEAR for {} - all entries dropped", V::resource());
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Create an entity and cache it.
    ///
    /// The id comes from the create response. If the response is the full
    /// entity it is seeded directly; otherwise the entity is fetched with
    /// `get`, so later lookups of the new id are cache hits either way.
    ///
    /// # Errors
    ///
    /// - `Error::SerializationError`: payload could not be encoded
    /// - `Error::Transport`: the create request failed
    /// - `Error::InvalidResponse`: the response carries no id
    /// - any error of the follow-up `get`
    pub async fn create<P: Serialize + ?Sized>(&self, payload: &P) -> Result<V> {
        let path = ResourcePath::collection::<V>();
        let body = encode(payload)?;
        let response = self.transport.post(&path, body).await?;

        let id = V::key_from_response(&response).ok_or_else(|| {
            Error::InvalidResponse(format!(
                "create on `{}` returned no `{}`",
                path,
                V::id_field()
            ))
        })?;
        let item = ResourcePath::item::<V>(&id);

        if carries_entity(&response) {
            match V::from_payload(&id, response) {
                Ok(entity) => {
                    self.seed(entity.clone());
                    info!("✓ Created {} (seeded from response)", item);
                    return Ok(entity);
                }
                Err(e) => debug!("Create response for {} is partial ({}), fetching", item, e),
            }
        }

        info!("✓ Created {}", item);
        self.get(&id).await
    }

    /// Update an entity, writing the result through to the cache.
    ///
    /// A response carrying entity fields is merged into the cached value and
    /// the entry gets a new version. An empty response drops the entry so the
    /// next access refetches.
    ///
    /// # Errors
    ///
    /// - `Error::SerializationError`: payload could not be encoded
    /// - `Error::Transport`: the update failed; the cached entry is untouched
    pub async fn update<P: Serialize + ?Sized>(&self, id: &V::Key, payload: &P) -> Result<()> {
        let path = ResourcePath::item::<V>(id);
        let body = encode(payload)?;
        let response = self.transport.put(&path, body).await?;

        if is_empty_body(&response) {
            self.entries.remove(id);
            info!("✓ Updated {} (entry dropped, refetch on next access)", path);
            return Ok(());
        }

        let version = self.next_version();
        let written = match self.entries.get_mut(id) {
            Some(mut entry) => {
                let next = match entry.ready_value() {
                    Some(current) => current.merged(&response),
                    None => V::from_payload(id, response.clone()),
                };
                match next {
                    Ok(value) => {
                        entry.write_through(value, version);
                        true
                    }
                    Err(e) => {
                        warn!("Update response for {} not applied: {}", path, e);
                        false
                    }
                }
            }
            None => true,
        };
        if !written {
            self.entries.remove(id);
        }

        info!("✓ Updated {} (version {})", path, version);
        Ok(())
    }

    /// Delete an entity and drop its entry.
    ///
    /// # Errors
    ///
    /// `Error::Transport` if the delete failed; the entry is left intact.
    pub async fn remove(&self, id: &V::Key) -> Result<()> {
        let path = ResourcePath::item::<V>(id);
        self.transport.delete(&path).await?;
        self.invalidate(id);
        info!("✓ Removed {}", path);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Check-and-set
    // ------------------------------------------------------------------------

    /// Serve, attach, or start a shallow fetch. Never awaits.
    ///
    /// Runs under the entry guard: no metrics hooks or store calls in here.
    fn lookup_or_fetch(&self, id: &V::Key) -> (Lookup<V>, Event) {
        match self.entries.entry(id.clone()) {
            MapEntry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();

                if let Some(value) = entry.ready_value() {
                    return (Lookup::Ready(value.clone()), Event::Hit);
                }

                if let Some(fetch) = entry.shallow_fetch() {
                    return (Lookup::Pending(fetch), Event::Coalesced);
                }

                // Failed: retry.
                let version = self.next_version();
                let flight = self.spawn_shallow(id.clone(), version);
                let fetch = flight.fetch.clone();
                entry.restart(flight, version);
                (Lookup::Pending(fetch), Event::Fetch)
            }
            MapEntry::Vacant(vacant) => {
                let version = self.next_version();
                let flight = self.spawn_shallow(id.clone(), version);
                let fetch = flight.fetch.clone();
                vacant.insert(CacheEntry::loading(flight, version));
                (Lookup::Pending(fetch), Event::Fetch)
            }
        }
    }

    /// Serve, attach, or start a deep fetch. Never awaits.
    ///
    /// `None` when the entry is gone or no longer holds a shallow value.
    fn lookup_or_fetch_deep(&self, id: &V::Key) -> Option<(Lookup<V>, Event)> {
        let mut entry = self.entries.get_mut(id)?;

        if let Some(value) = entry.deep_value() {
            return Some((Lookup::Ready(value.clone()), Event::Hit));
        }

        if let Some(fetch) = entry.deep_fetch() {
            return Some((Lookup::Pending(fetch), Event::Coalesced));
        }

        let shallow = entry.ready_value().cloned()?;

        if V::deep_resources().is_empty() {
            entry.promote_deep();
            return Some((Lookup::Ready(shallow), Event::Hit));
        }

        let ticket = self.next_version();
        let flight = self.spawn_deep(id.clone(), ticket, shallow);
        let fetch = flight.fetch.clone();
        entry.begin_deep(flight);
        Some((Lookup::Pending(fetch), Event::DeepFetch))
    }

    /// Log a lookup and hand it to the metrics hooks. Never called under a guard.
    fn report(&self, id: &V::Key, event: Event) {
        match event {
            Event::Fetch => debug!("» Fetching {}", ResourcePath::item::<V>(id)),
            Event::DeepFetch => debug!(
                "» Fetching deep fields of {}",
                ResourcePath::item::<V>(id)
            ),
            Event::Hit | Event::Coalesced => {}
        }

        if !self.metrics.enabled() {
            return;
        }

        match event {
            Event::Hit => self.metrics.record_hit(&ResourcePath::item::<V>(id)),
            Event::Coalesced => self.metrics.record_coalesced(&ResourcePath::item::<V>(id)),
            Event::Fetch => self.metrics.record_fetch(&ResourcePath::item::<V>(id)),
            Event::DeepFetch => {
                for sub in V::deep_resources() {
                    self.metrics.record_fetch(&ResourcePath::nested::<V>(id, sub));
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Fetch tasks
    // ------------------------------------------------------------------------

    /// Spawn a shallow fetch. Its ticket is the entry version it starts against.
    fn spawn_shallow(&self, id: V::Key, version: u64) -> InFlight<V> {
        let store = self.clone();
        let key = id.clone();
        let handle = tokio::spawn(async move {
            let path = ResourcePath::item::<V>(&key);
            let result = match store.transport.fetch_one(&path).await {
                Ok(payload) => V::from_payload(&key, payload),
                Err(e) => Err(e),
            };
            store.settle_shallow(&key, &path, version, &result);
            result
        });

        self.track(handle, id, version)
    }

    fn spawn_deep(&self, id: V::Key, ticket: u64, shallow: V) -> InFlight<V> {
        let store = self.clone();
        let key = id.clone();
        let handle = tokio::spawn(async move {
            let result = store.fetch_deep(&key, shallow).await;
            store.settle_deep(&key, ticket, &result);
            result
        });

        self.track(handle, id, ticket)
    }

    async fn fetch_deep(&self, id: &V::Key, shallow: V) -> Result<V> {
        let transport = &self.transport;
        let parts = try_join_all(V::deep_resources().iter().map(|sub| {
            let path = ResourcePath::nested::<V>(id, sub);
            async move { transport.fetch_one(&path).await.map(|body| (*sub, body)) }
        }))
        .await?;

        let mut entity = shallow;
        entity.hydrate_deep(parts)?;
        entity.validate()?;
        Ok(entity)
    }

    /// Wrap a fetch task in a shareable handle.
    ///
    /// A task that dies without settling (aborted, panicked) releases its
    /// entry so the next lookup can start over.
    fn track(&self, handle: JoinHandle<Result<V>>, id: V::Key, ticket: u64) -> InFlight<V> {
        let abort = handle.abort_handle();
        let entries = Arc::downgrade(&self.entries);
        let fetch = handle
            .map(move |joined| match joined {
                Ok(result) => result,
                Err(e) => {
                    if e.is_cancelled() {
                        debug!("Fetch task for {} aborted", id);
                    } else {
                        warn!("Fetch task for {} ended abnormally: {}", id, e);
                    }
                    if let Some(entries) = entries.upgrade() {
                        abandon(&entries, &id, ticket);
                    }
                    Err(Error::from(e))
                }
            })
            .boxed()
            .shared();

        InFlight::new(ticket, fetch, Some(abort))
    }

    fn settle_shallow(&self, id: &V::Key, path: &str, version: u64, result: &Result<V>) {
        let settled = match self.entries.get_mut(id) {
            Some(mut entry) => entry.settle_shallow(version, result),
            None => Settled::Stale,
        };

        match (settled, result) {
            (Settled::Applied, Ok(_)) => debug!("✓ Hydrated {} (shallow)", path),
            (Settled::Applied, Err(e)) => {
                self.metrics.record_error(path, &e.to_string());
                warn!("✗ Fetch for {} failed: {}", path, e);
            }
            (Settled::Stale, _) => {
                self.metrics.record_stale_discard(path);
                debug!(
                    "Discarding stale result for {} (started at version {})",
                    path, version
                );
            }
        }
    }

    fn settle_deep(&self, id: &V::Key, ticket: u64, result: &Result<V>) {
        let path = ResourcePath::item::<V>(id);
        let settled = match self.entries.get_mut(id) {
            Some(mut entry) => entry.settle_deep(ticket, result),
            None => Settled::Stale,
        };

        match (settled, result) {
            (Settled::Applied, Ok(_)) => debug!("✓ Hydrated {} (deep)", path),
            (Settled::Applied, Err(e)) => {
                self.metrics.record_error(&path, &e.to_string());
                warn!("✗ Deep fetch for {} failed, keeping shallow fields: {}", path, e);
            }
            (Settled::Stale, _) => {
                self.metrics.record_stale_discard(&path);
                debug!(
                    "Discarding stale deep result for {} (fetch {})",
                    path, ticket
                );
            }
        }
    }
}

/// Release an entry whose fetch task died without settling it.
///
/// Only touches the entry while it still waits on that same fetch.
fn abandon<V: Entity>(entries: &DashMap<V::Key, CacheEntry<V>>, id: &V::Key, ticket: u64) {
    let loading = match entries.get_mut(id) {
        Some(mut entry) if entry.holds_flight(ticket) => {
            if entry.state() == HydrationState::Loading {
                true
            } else {
                entry.cancel_deep();
                false
            }
        }
        _ => false,
    };

    if loading {
        entries.remove_if(id, |_, entry| entry.holds_flight(ticket));
    }
}

fn encode<P: Serialize + ?Sized>(payload: &P) -> Result<Value> {
    serde_json::to_value(payload).map_err(|e| Error::SerializationError(e.to_string()))
}

fn is_empty_body(body: &Value) -> bool {
    match body {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// A create response is worth decoding when it has more than the id.
fn carries_entity(response: &Value) -> bool {
    matches!(response, Value::Object(map) if map.len() > 1)
}

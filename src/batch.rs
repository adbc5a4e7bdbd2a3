//! Batch resolution with per-id failure isolation.

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::store::EntityStore;
use crate::transport::Transport;
use futures::future::join_all;
use std::collections::HashMap;
use std::future::Future;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Configuration for batch resolves.
#[derive(Clone, Debug, Default)]
pub struct ResolveConfig {
    /// Maximum number of gets in flight. `None` dispatches every id at once.
    pub concurrency: Option<usize>,
}

impl ResolveConfig {
    /// Cap in-flight gets. Values below 1 are treated as 1.
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = Some(limit.max(1));
        self
    }
}

/// An id that could not be resolved, with the reason.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchFailure<K> {
    pub id: K,
    pub error: Error,
}

/// Outcome of a batch resolve.
///
/// A batch always "succeeds": ids that failed are listed in `failures`
/// instead of failing the whole call. Check [`is_complete`](Self::is_complete)
/// to tell an empty result apart from a result where everything failed.
#[derive(Clone, Debug)]
pub struct BatchResult<V: Entity> {
    /// Resolved entities, in input order.
    pub items: Vec<V>,
    /// Ids that failed, in input order.
    pub failures: Vec<BatchFailure<V::Key>>,
}

impl<V: Entity> BatchResult<V> {
    /// True when no id failed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of ids that failed.
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Failed ids, in input order.
    pub fn failed_ids(&self) -> Vec<V::Key> {
        self.failures.iter().map(|f| f.id.clone()).collect()
    }

    /// Resolved entities keyed by id.
    pub fn into_map(self) -> HashMap<V::Key, V> {
        self.items
            .into_iter()
            .map(|item| (item.entity_key(), item))
            .collect()
    }
}

impl<V: Entity> Default for BatchResult<V> {
    fn default() -> Self {
        BatchResult {
            items: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Resolves many ids through one [`EntityStore`].
///
/// Every id goes through `store.get`, so ids already cached are served from
/// cache and ids already loading are joined rather than refetched.
pub struct BatchResolver<V: Entity, T: Transport> {
    store: EntityStore<V, T>,
    config: ResolveConfig,
}

impl<V: Entity, T: Transport> Clone for BatchResolver<V, T> {
    fn clone(&self) -> Self {
        BatchResolver {
            store: self.store.clone(),
            config: self.config.clone(),
        }
    }
}

impl<V: Entity, T: Transport> BatchResolver<V, T> {
    /// Create a resolver over a store, with no concurrency cap.
    pub fn new(store: EntityStore<V, T>) -> Self {
        BatchResolver {
            store,
            config: ResolveConfig::default(),
        }
    }

    /// Set resolve configuration.
    pub fn with_config(mut self, config: ResolveConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the underlying store.
    pub fn store(&self) -> &EntityStore<V, T> {
        &self.store
    }

    /// Resolve every id concurrently.
    ///
    /// Failed ids are excluded from `items` and recorded in `failures`.
    /// Duplicate ids share one fetch and appear once per occurrence.
    pub async fn resolve_many(&self, ids: &[V::Key]) -> BatchResult<V> {
        self.resolve_with(ids, |id| self.store.get(id)).await
    }

    /// Like [`resolve_many`](Self::resolve_many), with deep fields attached.
    pub async fn resolve_many_deep(&self, ids: &[V::Key]) -> BatchResult<V> {
        self.resolve_with(ids, |id| self.store.get_deep(id)).await
    }

    async fn resolve_with<'a, F, Fut>(&self, ids: &'a [V::Key], get: F) -> BatchResult<V>
    where
        F: Fn(&'a V::Key) -> Fut,
        Fut: Future<Output = Result<V>> + 'a,
    {
        let start = Instant::now();
        let limiter = self.config.concurrency.map(Semaphore::new);
        let limiter = limiter.as_ref();
        let get = &get;

        // The limiter is never closed, so a failed acquire just runs unbounded.
        let gets = ids.iter().map(|id| async move {
            let _permit = match limiter {
                Some(limiter) => limiter.acquire().await.ok(),
                None => None,
            };
            (id, get(id).await)
        });
        let outcomes = join_all(gets).await;

        let mut result = BatchResult::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(item) => result.items.push(item),
                Err(error) => result.failures.push(BatchFailure {
                    id: id.clone(),
                    error,
                }),
            }
        }

        let duration = start.elapsed();
        self.store
            .metrics()
            .record_batch(V::resource(), ids.len(), result.failures.len(), duration);

        if result.is_complete() {
            debug!(
                "✓ Resolved {} {} in {:?}",
                result.items.len(),
                V::resource(),
                duration
            );
        } else {
            warn!(
                "⚠ Resolved {}/{} {}, failed: {:?}",
                result.items.len(),
                ids.len(),
                V::resource(),
                result.failed_ids()
            );
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryTransport, Method, Reply};
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Group {
        id: String,
        name: String,
    }

    impl Entity for Group {
        type Key = String;

        fn entity_key(&self) -> Self::Key {
            self.id.clone()
        }

        fn resource() -> &'static str {
            "groups"
        }
    }

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn resolver(transport: &MemoryTransport) -> BatchResolver<Group, MemoryTransport> {
        BatchResolver::new(EntityStore::new(transport.clone()))
    }

    #[tokio::test]
    async fn test_partial_failure_is_data() {
        let transport = MemoryTransport::new();
        transport
            .on_get("groups/a", Reply::json(json!({"name": "A"})))
            .on_get("groups/b", Reply::error(500, "boom"))
            .on_get("groups/c", Reply::json(json!({"name": "C"})));

        let result = resolver(&transport).resolve_many(&ids(&["a", "b", "c"])).await;

        let names: Vec<_> = result.items.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["A", "C"]);
        assert_eq!(result.failed_ids(), ids(&["b"]));
        assert_eq!(result.failures[0].error.status(), Some(500));
        assert!(!result.is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_follows_input_not_completion() {
        let transport = MemoryTransport::new();
        transport
            .on_get(
                "groups/slow",
                Reply::json(json!({"name": "Slow"})).after(Duration::from_millis(30)),
            )
            .on_get(
                "groups/fast",
                Reply::json(json!({"name": "Fast"})).after(Duration::from_millis(5)),
            );

        let result = resolver(&transport)
            .resolve_many(&ids(&["slow", "fast"]))
            .await;

        let keys: Vec<_> = result.items.iter().map(|g| g.id.clone()).collect();
        assert_eq!(keys, ids(&["slow", "fast"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_concurrency_keeps_order() {
        let transport = MemoryTransport::new();
        for (i, delay) in [40u64, 10, 30, 20].iter().enumerate() {
            transport.on_get(
                format!("groups/g{}", i),
                Reply::json(json!({"name": format!("G{}", i)}))
                    .after(Duration::from_millis(*delay)),
            );
        }
        let resolver =
            resolver(&transport).with_config(ResolveConfig::default().with_concurrency(2));

        let wanted = ids(&["g0", "g1", "g2", "g3"]);
        let result = resolver.resolve_many(&wanted).await;

        assert!(result.is_complete());
        let keys: Vec<_> = result.items.iter().map(|g| g.id.clone()).collect();
        assert_eq!(keys, wanted);
    }

    #[tokio::test]
    async fn test_duplicate_ids_share_fetch() {
        let transport = MemoryTransport::new();
        transport.on_get("groups/a", Reply::json(json!({"name": "A"})));

        let result = resolver(&transport).resolve_many(&ids(&["a", "a", "a"])).await;

        assert_eq!(result.items.len(), 3);
        assert_eq!(transport.calls(Method::Get, "groups/a"), 1);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let transport = MemoryTransport::new();
        let result = resolver(&transport).resolve_many(&[]).await;

        assert!(result.items.is_empty());
        assert!(result.is_complete());
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_into_map() {
        let transport = MemoryTransport::new();
        transport
            .on_get("groups/a", Reply::json(json!({"name": "A"})))
            .on_get("groups/b", Reply::json(json!({"name": "B"})));

        let map = resolver(&transport)
            .resolve_many(&ids(&["a", "b"]))
            .await
            .into_map();

        assert_eq!(map.len(), 2);
        assert_eq!(map["b"].name, "B");
    }

    #[test]
    fn test_concurrency_floor() {
        let config = ResolveConfig::default().with_concurrency(0);
        assert_eq!(config.concurrency, Some(1));
    }
}

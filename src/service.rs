//! High-level entity service for application code.
//!
//! Bundles an [`EntityStore`] with a [`BatchResolver`] over the same cache and
//! adds collection listing.

use crate::batch::{BatchResolver, BatchResult, ResolveConfig};
use crate::entity::Entity;
use crate::error::Result;
use crate::observability::StoreMetrics;
use crate::path::ResourcePath;
use crate::store::EntityStore;
use crate::strategy::FetchStrategy;
use crate::transport::Transport;
use serde::Serialize;
use std::sync::Arc;

/// High-level service for one entity type.
///
/// Cloning is cheap; clones share the cache.
///
/// # Example
///
/// ```ignore
/// use entity_kit::{EntityService, transport::MemoryTransport};
///
/// let groups: EntityService<ProjectGroup, _> = EntityService::new(transport);
///
/// let listing = groups.list().await?;
/// if !listing.is_complete() {
///     println!("{} groups unavailable", listing.failure_count());
/// }
///
/// let group = groups.get_deep(&"g1".to_string()).await?;
/// groups.update(&group.id, &json!({"name": "Renamed"})).await?;
/// ```
pub struct EntityService<V: Entity, T: Transport> {
    store: EntityStore<V, T>,
    resolver: BatchResolver<V, T>,
}

impl<V: Entity, T: Transport> Clone for EntityService<V, T> {
    fn clone(&self) -> Self {
        EntityService {
            store: self.store.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

impl<V: Entity, T: Transport> EntityService<V, T> {
    /// Create a new service on top of a transport.
    pub fn new(transport: T) -> Self {
        Self::from_store(EntityStore::new(transport))
    }

    /// Create a new service with custom metrics.
    pub fn with_metrics(transport: T, metrics: Arc<dyn StoreMetrics>) -> Self {
        Self::from_store(EntityStore::new(transport).with_metrics(metrics))
    }

    /// Wrap an existing store.
    pub fn from_store(store: EntityStore<V, T>) -> Self {
        let resolver = BatchResolver::new(store.clone());
        EntityService { store, resolver }
    }

    /// Set batch resolve configuration.
    pub fn with_resolve_config(mut self, config: ResolveConfig) -> Self {
        self.resolver = self.resolver.with_config(config);
        self
    }

    /// Access the underlying store.
    pub fn store(&self) -> &EntityStore<V, T> {
        &self.store
    }

    /// Access the batch resolver.
    pub fn resolver(&self) -> &BatchResolver<V, T> {
        &self.resolver
    }

    pub async fn get(&self, id: &V::Key) -> Result<V> {
        self.store.get(id).await
    }

    pub async fn get_deep(&self, id: &V::Key) -> Result<V> {
        self.store.get_deep(id).await
    }

    pub async fn get_with(&self, id: &V::Key, strategy: FetchStrategy) -> Result<V> {
        self.store.get_with(id, strategy).await
    }

    /// List the whole collection.
    ///
    /// # Errors
    ///
    /// Fails only when the listing request itself fails or its body holds no
    /// ids. Entities that fail to resolve are reported in the result.
    pub async fn list(&self) -> Result<BatchResult<V>> {
        self.list_where(&[]).await
    }

    /// List the collection with query parameters.
    pub async fn list_where(&self, params: &[(&str, &str)]) -> Result<BatchResult<V>> {
        let ids = self.list_ids(params).await?;
        Ok(self.resolver.resolve_many(&ids).await)
    }

    /// List the whole collection with deep fields attached.
    pub async fn list_deep(&self) -> Result<BatchResult<V>> {
        let ids = self.list_ids(&[]).await?;
        Ok(self.resolver.resolve_many_deep(&ids).await)
    }

    pub async fn create<P: Serialize + ?Sized>(&self, payload: &P) -> Result<V> {
        self.store.create(payload).await
    }

    pub async fn update<P: Serialize + ?Sized>(&self, id: &V::Key, payload: &P) -> Result<()> {
        self.store.update(id, payload).await
    }

    pub async fn remove(&self, id: &V::Key) -> Result<()> {
        self.store.remove(id).await
    }

    pub fn invalidate(&self, id: &V::Key) -> bool {
        self.store.invalidate(id)
    }

    async fn list_ids(&self, params: &[(&str, &str)]) -> Result<Vec<V::Key>> {
        let path = ResourcePath::collection::<V>();
        let listing = self.store.transport().fetch_with(&path, params).await?;
        let ids = V::ids_from_listing(listing)?;
        debug!("» Listing {} returned {} ids", path, ids.len());
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::transport::{MemoryTransport, Method, Reply};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Group {
        id: String,
        name: String,
        #[serde(default)]
        members: Option<Vec<String>>,
    }

    impl Entity for Group {
        type Key = String;

        fn entity_key(&self) -> Self::Key {
            self.id.clone()
        }

        fn resource() -> &'static str {
            "groups"
        }

        fn deep_resources() -> &'static [&'static str] {
            &["members"]
        }
    }

    #[tokio::test]
    async fn test_list_resolves_listed_ids() {
        let transport = MemoryTransport::new();
        transport
            .on_get("groups", Reply::json(json!([{"id": "a"}, {"id": "b"}])))
            .on_get("groups/a", Reply::json(json!({"name": "A"})))
            .on_get("groups/b", Reply::error(404, "gone"));
        let service: EntityService<Group, _> = EntityService::new(transport.clone());

        let result = service.list().await.expect("Listing should succeed");

        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].name, "A");
        assert!(result.failures[0].error.is_not_found());
    }

    #[tokio::test]
    async fn test_list_where_passes_params() {
        let transport = MemoryTransport::new();
        transport.on_get("groups", Reply::json(json!({"items": ["a"]})));
        transport.on_get("groups/a", Reply::json(json!({"name": "A"})));
        let service: EntityService<Group, _> = EntityService::new(transport.clone());

        service
            .list_where(&[("owner", "me")])
            .await
            .expect("Listing should succeed");

        let listing = &transport.requests()[0];
        assert_eq!(listing.path, "groups");
        assert_eq!(listing.params, vec![("owner".to_string(), "me".to_string())]);
    }

    #[tokio::test]
    async fn test_listing_failure_is_an_error() {
        let transport = MemoryTransport::new();
        transport.on_get("groups", Reply::error(503, "unavailable"));
        let service: EntityService<Group, _> = EntityService::new(transport);

        let err = service.list().await.unwrap_err();
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn test_listing_with_bad_shape() {
        let transport = MemoryTransport::new();
        transport.on_get("groups", Reply::json(json!({"count": 2})));
        let service: EntityService<Group, _> = EntityService::new(transport);

        let err = service.list().await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_list_deep() {
        let transport = MemoryTransport::new();
        transport
            .on_get("groups", Reply::json(json!(["a"])))
            .on_get("groups/a", Reply::json(json!({"name": "A"})))
            .on_get("groups/a/members", Reply::json(json!(["u1"])));
        let service: EntityService<Group, _> = EntityService::new(transport.clone());

        let result = service.list_deep().await.expect("Listing should succeed");
        assert_eq!(result.items[0].members, Some(vec!["u1".to_string()]));

        let cached = service.get(&"a".to_string()).await.expect("Failed to get");
        assert_eq!(cached.members, Some(vec!["u1".to_string()]));
        assert_eq!(transport.calls(Method::Get, "groups/a"), 1);
    }

    #[tokio::test]
    async fn test_service_clone_shares_cache() {
        let transport = MemoryTransport::new();
        transport.on_get("groups/a", Reply::json(json!({"name": "A"})));
        let service: EntityService<Group, _> = EntityService::new(transport.clone());
        let clone = service.clone();

        service.get(&"a".to_string()).await.expect("Failed to get");
        clone.get(&"a".to_string()).await.expect("Failed to get");
        assert_eq!(transport.calls(Method::Get, "groups/a"), 1);

        assert!(clone.invalidate(&"a".to_string()));
        assert!(!service.store().contains(&"a".to_string()));
    }
}

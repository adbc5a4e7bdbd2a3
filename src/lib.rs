//! # entity-kit
//!
//! A generic client-side entity cache for REST-style backends.
//!
//! ## Features
//!
//! - **Fully Generic:** Cache any type `V` that implements [`Entity`]
//! - **Request Coalescing:** Concurrent lookups of one id share a single fetch
//! - **Staged Hydration:** Cheap shallow fetch first, deep sub-resources on demand
//! - **Stale-Write Safe:** A fetch that finishes after its entry was invalidated
//!   or rewritten is discarded
//! - **Partial Batches:** [`BatchResolver`] reports failed ids as data instead of
//!   failing the whole list
//! - **Transport Agnostic:** Plug in any [`Transport`](transport::Transport);
//!   [`MemoryTransport`](transport::MemoryTransport) ships for tests and demos
//!
//! ## Quick Start
//!
//! ```ignore
//! use entity_kit::{Entity, EntityService, transport::MemoryTransport};
//! use serde::{Deserialize, Serialize};
//!
//! // 1. Define your entity
//! #[derive(Clone, Serialize, Deserialize)]
//! struct ProjectGroup {
//!     id: String,
//!     name: String,
//!     #[serde(default)]
//!     members: Option<Vec<String>>,
//! }
//!
//! // 2. Implement Entity
//! impl Entity for ProjectGroup {
//!     type Key = String;
//!     fn entity_key(&self) -> Self::Key { self.id.clone() }
//!     fn resource() -> &'static str { "project-groups" }
//!     fn deep_resources() -> &'static [&'static str] { &["members"] }
//! }
//!
//! // 3. Create the service over a transport
//! let groups: EntityService<ProjectGroup, _> = EntityService::new(transport);
//!
//! // 4. Use it - EntityService is Clone for task sharing
//! let listing = groups.list().await?;
//! let group = groups.get_deep(&"g1".to_string()).await?;
//! ```
//!
//! ### Lower-level API
//!
//! [`EntityStore`] and [`BatchResolver`] can be used directly:
//!
//! ```ignore
//! use entity_kit::{BatchResolver, EntityStore};
//!
//! let store: EntityStore<ProjectGroup, _> = EntityStore::new(transport);
//! let resolver = BatchResolver::new(store.clone());
//! let result = resolver.resolve_many(&ids).await;
//! ```
//!
//! A tokio runtime is required: fetches run as spawned tasks.

#[macro_use]
extern crate log;

pub mod batch;
pub mod entity;
pub mod error;
pub mod hydration;
pub mod observability;
pub mod path;
pub mod service;
pub mod store;
pub mod strategy;
pub mod transport;

// Re-exports for convenience
pub use batch::{BatchFailure, BatchResolver, BatchResult, ResolveConfig};
pub use entity::Entity;
pub use error::{Error, Result};
pub use hydration::HydrationState;
pub use observability::{NoOpMetrics, StoreMetrics};
pub use path::ResourcePath;
pub use service::EntityService;
pub use store::{EntityStore, StoreStats};
pub use strategy::FetchStrategy;
pub use transport::Transport;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

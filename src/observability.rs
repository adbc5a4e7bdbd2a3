//! Observability hooks for store operations.
//!
//! Implement [`StoreMetrics`] to feed a monitoring system:
//!
//! ```ignore
//! use entity_kit::observability::StoreMetrics;
//!
//! struct PrometheusMetrics;
//!
//! impl StoreMetrics for PrometheusMetrics {
//!     fn record_fetch(&self, _key: &str) {
//!         // counter!("entity_fetches").inc();
//!     }
//!     // ... implement other methods
//! }
//!
//! // let store = EntityStore::new(transport)
//! //     .with_metrics(Arc::new(PrometheusMetrics));
//! ```
//!
//! Methods left unimplemented fall back to `log` output. A store built without
//! metrics uses [`NoOpMetrics`].
//!
//! # Events
//!
//! - `record_hit()` - served from cache
//! - `record_fetch()` - transport fetch started
//! - `record_coalesced()` - caller attached to a fetch already in flight
//! - `record_stale_discard()` - fetch result dropped because the entry moved on
//! - `record_error()` - fetch failed
//! - `record_batch()` - batch resolve finished
//!
//! Keys are item paths (`"{resource}/{id}"`).

use std::time::Duration;

/// Trait for store metrics collection.
pub trait StoreMetrics: Send + Sync {
    /// Whether the store should build keys and call the hooks at all.
    fn enabled(&self) -> bool {
        true
    }

    /// Record a cache hit.
    fn record_hit(&self, key: &str) {
        debug!("Store HIT: {}", key);
    }

    /// Record the start of a transport fetch.
    fn record_fetch(&self, key: &str) {
        debug!("Store FETCH: {}", key);
    }

    /// Record a caller joining an in-flight fetch.
    fn record_coalesced(&self, key: &str) {
        debug!("Store COALESCED: {}", key);
    }

    /// Record a fetch result dropped as stale.
    fn record_stale_discard(&self, key: &str) {
        debug!("Store STALE: {}", key);
    }

    /// Record a failed fetch.
    fn record_error(&self, key: &str, error: &str) {
        warn!("Store ERROR for {}: {}", key, error);
    }

    /// Record a finished batch resolve.
    fn record_batch(&self, resource: &str, requested: usize, failed: usize, duration: Duration) {
        debug!(
            "Store BATCH: {} {} requested, {} failed, took {:?}",
            resource, requested, failed, duration
        );
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl StoreMetrics for NoOpMetrics {
    fn enabled(&self) -> bool {
        false
    }

    fn record_hit(&self, _key: &str) {}
    fn record_fetch(&self, _key: &str) {}
    fn record_coalesced(&self, _key: &str) {}
    fn record_stale_discard(&self, _key: &str) {}
    fn record_error(&self, _key: &str, _error: &str) {}
    fn record_batch(&self, _resource: &str, _requested: usize, _failed: usize, _duration: Duration) {
    }
}

//! Fetch strategies for single-entity lookups.
//!
//! `EntityStore::get` is the everyday path. `EntityStore::get_with` takes a
//! [`FetchStrategy`] when a caller needs something else:
//!
//! ```
//! use entity_kit::strategy::FetchStrategy;
//!
//! // 1. Cached - serve from cache, fetch (or join the fetch) on miss
//! let _s = FetchStrategy::Cached;
//!
//! // 2. CacheOnly - never touch the transport
//! let _s = FetchStrategy::CacheOnly;
//!
//! // 3. Reload - drop the entry, fetch again
//! let _s = FetchStrategy::Reload;
//! ```
//!
//! | Strategy | Ready entry | Missing / failed entry | Use case |
//! |----------|-------------|------------------------|----------|
//! | **Cached** | Return | Fetch | Default |
//! | **CacheOnly** | Return | `Error::CacheMiss` | Render what is there, no network |
//! | **Reload** | Drop, fetch | Fetch | User pressed refresh |

/// Strategy controlling how a single lookup uses the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FetchStrategy {
    /// Serve a ready entry, otherwise fetch or attach to the in-flight fetch.
    #[default]
    Cached,

    /// Serve a ready entry, otherwise fail with `Error::CacheMiss`.
    ///
    /// An entry that is still loading counts as a miss.
    CacheOnly,

    /// Invalidate, then fetch.
    ///
    /// Flow:
    /// 1. Drop the entry (an in-flight fetch keeps running, its result is discarded)
    /// 2. Fetch fresh
    /// 3. Return value
    Reload,
}

impl std::fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStrategy::Cached => write!(f, "Cached"),
            FetchStrategy::CacheOnly => write!(f, "CacheOnly"),
            FetchStrategy::Reload => write!(f, "Reload"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_display() {
        assert_eq!(FetchStrategy::Cached.to_string(), "Cached");
        assert_eq!(FetchStrategy::CacheOnly.to_string(), "CacheOnly");
        assert_eq!(FetchStrategy::Reload.to_string(), "Reload");
    }

    #[test]
    fn test_strategy_default() {
        assert_eq!(FetchStrategy::default(), FetchStrategy::Cached);
    }
}

//! Per-entry hydration state machine.
//!
//! ```text
//! (none) --get--> Loading --ok--> ShallowReady --get_deep--> DeepLoading --ok--> DeepReady
//!                         --err-> Failed                                 --err-> ShallowReady
//! Failed --get--> Loading
//! any --invalidate--> (none)
//! ```
//!
//! Every transition that replaces an entry's content stamps it with a fresh
//! version. A fetch remembers the version it started against and only settles
//! an entry that still carries that version. Each fetch also carries a ticket
//! unique within its store; a deep fetch settles, and an abandoned fetch
//! releases, only the flight holding its own ticket.

use crate::error::{Error, Result};
use futures::future::{BoxFuture, Shared};
use std::fmt;
use tokio::task::AbortHandle;

/// A pending fetch every interested caller can await.
pub(crate) type SharedFetch<V> = Shared<BoxFuture<'static, Result<V>>>;

/// Handle to a fetch in progress.
pub(crate) struct InFlight<V> {
    ticket: u64,
    pub(crate) fetch: SharedFetch<V>,
    abort: Option<AbortHandle>,
}

impl<V> InFlight<V> {
    pub(crate) fn new(ticket: u64, fetch: SharedFetch<V>, abort: Option<AbortHandle>) -> Self {
        InFlight {
            ticket,
            fetch,
            abort,
        }
    }

    fn abort(&self) {
        if let Some(handle) = &self.abort {
            handle.abort();
        }
    }
}

/// Observable hydration state of a cache entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HydrationState {
    /// Shallow fetch in progress; nothing to serve yet.
    Loading,
    /// Shallow fields cached.
    ShallowReady,
    /// Shallow fields cached, deep fetch in progress.
    DeepLoading,
    /// Shallow and deep fields cached.
    DeepReady,
    /// Last shallow fetch failed; the next `get` retries.
    Failed,
}

impl fmt::Display for HydrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HydrationState::Loading => write!(f, "Loading"),
            HydrationState::ShallowReady => write!(f, "ShallowReady"),
            HydrationState::DeepLoading => write!(f, "DeepLoading"),
            HydrationState::DeepReady => write!(f, "DeepReady"),
            HydrationState::Failed => write!(f, "Failed"),
        }
    }
}

enum Slot<V> {
    Loading(InFlight<V>),
    ShallowReady(V),
    DeepLoading(V, InFlight<V>),
    DeepReady(V),
    Failed(Error),
}

/// Outcome of handing a finished fetch back to its entry.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Settled {
    Applied,
    /// The entry moved on (new version or different state); result dropped.
    Stale,
}

/// One cached entity and its hydration state.
pub(crate) struct CacheEntry<V> {
    slot: Slot<V>,
    version: u64,
}

impl<V: Clone> CacheEntry<V> {
    pub(crate) fn loading(flight: InFlight<V>, version: u64) -> Self {
        CacheEntry {
            slot: Slot::Loading(flight),
            version,
        }
    }

    pub(crate) fn ready(value: V, version: u64) -> Self {
        CacheEntry {
            slot: Slot::ShallowReady(value),
            version,
        }
    }

    #[cfg(test)]
    pub(crate) fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn state(&self) -> HydrationState {
        match &self.slot {
            Slot::Loading(_) => HydrationState::Loading,
            Slot::ShallowReady(_) => HydrationState::ShallowReady,
            Slot::DeepLoading(_, _) => HydrationState::DeepLoading,
            Slot::DeepReady(_) => HydrationState::DeepReady,
            Slot::Failed(_) => HydrationState::Failed,
        }
    }

    /// Value a consumer may see. `None` while loading or failed.
    pub(crate) fn ready_value(&self) -> Option<&V> {
        match &self.slot {
            Slot::ShallowReady(v) | Slot::DeepLoading(v, _) | Slot::DeepReady(v) => Some(v),
            Slot::Loading(_) | Slot::Failed(_) => None,
        }
    }

    /// Value with deep fields attached.
    pub(crate) fn deep_value(&self) -> Option<&V> {
        match &self.slot {
            Slot::DeepReady(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn last_error(&self) -> Option<&Error> {
        match &self.slot {
            Slot::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub(crate) fn shallow_fetch(&self) -> Option<SharedFetch<V>> {
        match &self.slot {
            Slot::Loading(flight) => Some(flight.fetch.clone()),
            _ => None,
        }
    }

    pub(crate) fn deep_fetch(&self) -> Option<SharedFetch<V>> {
        match &self.slot {
            Slot::DeepLoading(_, flight) => Some(flight.fetch.clone()),
            _ => None,
        }
    }

    /// True while this entry waits on the fetch holding `ticket`.
    pub(crate) fn holds_flight(&self, ticket: u64) -> bool {
        match &self.slot {
            Slot::Loading(flight) | Slot::DeepLoading(_, flight) => flight.ticket == ticket,
            _ => false,
        }
    }

    /// Restart a shallow fetch (retry after failure).
    pub(crate) fn restart(&mut self, flight: InFlight<V>, version: u64) {
        self.slot = Slot::Loading(flight);
        self.version = version;
    }

    /// Apply a finished shallow fetch started against `version`.
    pub(crate) fn settle_shallow(&mut self, version: u64, result: &Result<V>) -> Settled {
        if self.version != version || !matches!(self.slot, Slot::Loading(_)) {
            return Settled::Stale;
        }
        self.slot = match result {
            Ok(value) => Slot::ShallowReady(value.clone()),
            Err(e) => Slot::Failed(e.clone()),
        };
        Settled::Applied
    }

    /// Start a deep fetch. Only legal from `ShallowReady`.
    pub(crate) fn begin_deep(&mut self, flight: InFlight<V>) -> bool {
        let Slot::ShallowReady(value) = &self.slot else {
            return false;
        };
        self.slot = Slot::DeepLoading(value.clone(), flight);
        true
    }

    /// Mark deep hydration complete without a fetch (no deep resources).
    pub(crate) fn promote_deep(&mut self) {
        if let Slot::ShallowReady(value) = &self.slot {
            self.slot = Slot::DeepReady(value.clone());
        }
    }

    /// Apply the finished deep fetch holding `ticket`. A failure falls back to
    /// the shallow value.
    pub(crate) fn settle_deep(&mut self, ticket: u64, result: &Result<V>) -> Settled {
        let Slot::DeepLoading(shallow, flight) = &self.slot else {
            return Settled::Stale;
        };
        if flight.ticket != ticket {
            return Settled::Stale;
        }
        let next = match result {
            Ok(value) => Slot::DeepReady(value.clone()),
            Err(_) => Slot::ShallowReady(shallow.clone()),
        };
        self.slot = next;
        Settled::Applied
    }

    /// Abort a deep fetch and fall back to the shallow value.
    pub(crate) fn cancel_deep(&mut self) -> bool {
        let Slot::DeepLoading(shallow, flight) = &self.slot else {
            return false;
        };
        flight.abort();
        self.slot = Slot::ShallowReady(shallow.clone());
        true
    }

    /// Abort whatever fetch this entry is waiting on.
    pub(crate) fn abort(&self) {
        match &self.slot {
            Slot::Loading(flight) | Slot::DeepLoading(_, flight) => flight.abort(),
            _ => {}
        }
    }

    /// Write a mutation result through. Deep entries stay deep; anything
    /// else becomes shallow. Pending fetches become stale.
    pub(crate) fn write_through(&mut self, value: V, version: u64) {
        self.slot = if matches!(self.slot, Slot::DeepReady(_)) {
            Slot::DeepReady(value)
        } else {
            Slot::ShallowReady(value)
        };
        self.version = version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn pending_flight(ticket: u64) -> InFlight<String> {
        InFlight::new(
            ticket,
            futures::future::pending::<Result<String>>().boxed().shared(),
            None,
        )
    }

    #[test]
    fn test_loading_exposes_no_value() {
        let entry = CacheEntry::loading(pending_flight(1), 1);
        assert_eq!(entry.state(), HydrationState::Loading);
        assert!(entry.ready_value().is_none());
        assert!(entry.shallow_fetch().is_some());
    }

    #[test]
    fn test_settle_shallow_success_and_failure() {
        let mut entry = CacheEntry::loading(pending_flight(1), 1);
        assert_eq!(
            entry.settle_shallow(1, &Ok("alpha".to_string())),
            Settled::Applied
        );
        assert_eq!(entry.state(), HydrationState::ShallowReady);
        assert_eq!(entry.ready_value().map(String::as_str), Some("alpha"));

        let mut entry = CacheEntry::<String>::loading(pending_flight(2), 2);
        entry.settle_shallow(2, &Err(Error::transport(500, "boom")));
        assert_eq!(entry.state(), HydrationState::Failed);
        assert_eq!(entry.last_error().and_then(Error::status), Some(500));
    }

    #[test]
    fn test_settle_shallow_with_old_version_is_stale() {
        let mut entry = CacheEntry::loading(pending_flight(3), 3);
        assert_eq!(
            entry.settle_shallow(2, &Ok("old".to_string())),
            Settled::Stale
        );
        assert_eq!(entry.state(), HydrationState::Loading);
    }

    #[test]
    fn test_settle_shallow_after_write_through_is_stale() {
        let mut entry = CacheEntry::loading(pending_flight(1), 1);
        entry.write_through("written".to_string(), 2);

        assert_eq!(
            entry.settle_shallow(1, &Ok("fetched".to_string())),
            Settled::Stale
        );
        assert_eq!(entry.ready_value().map(String::as_str), Some("written"));
    }

    #[test]
    fn test_deep_failure_keeps_shallow_value() {
        let mut entry = CacheEntry::ready("shallow".to_string(), 1);
        assert!(entry.begin_deep(pending_flight(2)));
        assert_eq!(entry.state(), HydrationState::DeepLoading);
        assert_eq!(entry.ready_value().map(String::as_str), Some("shallow"));

        entry.settle_deep(2, &Err(Error::transport(500, "boom")));
        assert_eq!(entry.state(), HydrationState::ShallowReady);
        assert_eq!(entry.ready_value().map(String::as_str), Some("shallow"));
    }

    #[test]
    fn test_deep_success() {
        let mut entry = CacheEntry::ready("shallow".to_string(), 1);
        entry.begin_deep(pending_flight(2));
        entry.settle_deep(2, &Ok("deep".to_string()));

        assert_eq!(entry.state(), HydrationState::DeepReady);
        assert_eq!(entry.deep_value().map(String::as_str), Some("deep"));
    }

    #[test]
    fn test_begin_deep_only_from_shallow_ready() {
        let mut entry = CacheEntry::loading(pending_flight(1), 1);
        assert!(!entry.begin_deep(pending_flight(2)));

        let mut entry = CacheEntry::ready("v".to_string(), 1);
        entry.begin_deep(pending_flight(2));
        assert!(!entry.begin_deep(pending_flight(3)));
    }

    #[test]
    fn test_write_through_during_deep_load_makes_deep_result_stale() {
        let mut entry = CacheEntry::ready("v1".to_string(), 1);
        entry.begin_deep(pending_flight(2));
        entry.write_through("v2".to_string(), 3);
        assert_eq!(entry.state(), HydrationState::ShallowReady);

        assert_eq!(
            entry.settle_deep(2, &Ok("v1-deep".to_string())),
            Settled::Stale
        );
        assert_eq!(entry.ready_value().map(String::as_str), Some("v2"));
    }

    #[test]
    fn test_write_through_keeps_deep_level() {
        let mut entry = CacheEntry::ready("v1".to_string(), 1);
        entry.promote_deep();
        entry.write_through("v2".to_string(), 5);

        assert_eq!(entry.state(), HydrationState::DeepReady);
        assert_eq!(entry.version(), 5);
    }

    #[test]
    fn test_cancel_deep_reverts() {
        let mut entry = CacheEntry::ready("v".to_string(), 1);
        entry.begin_deep(pending_flight(2));

        assert!(entry.cancel_deep());
        assert_eq!(entry.state(), HydrationState::ShallowReady);
        assert!(!entry.cancel_deep());
    }

    #[test]
    fn test_deep_result_settles_only_its_own_flight() {
        let mut entry = CacheEntry::ready("v".to_string(), 1);
        entry.begin_deep(pending_flight(2));
        entry.cancel_deep();
        entry.begin_deep(pending_flight(3));

        assert!(!entry.holds_flight(2));
        assert!(entry.holds_flight(3));
        assert_eq!(
            entry.settle_deep(2, &Ok("first".to_string())),
            Settled::Stale
        );
        assert_eq!(entry.state(), HydrationState::DeepLoading);

        assert_eq!(
            entry.settle_deep(3, &Ok("second".to_string())),
            Settled::Applied
        );
        assert_eq!(entry.deep_value().map(String::as_str), Some("second"));
    }

    #[test]
    fn test_restart_after_failure() {
        let mut entry = CacheEntry::<String>::loading(pending_flight(1), 1);
        entry.settle_shallow(1, &Err(Error::transport(500, "boom")));

        entry.restart(pending_flight(4), 4);
        assert_eq!(entry.state(), HydrationState::Loading);
        assert_eq!(entry.version(), 4);
    }
}

//! Scriptable in-memory transport (thread-safe, async).
//!
//! Replies are queued per `(method, path)` route. Each request consumes the
//! next queued reply; the last reply of a route repeats for any further
//! requests. Every request is recorded so tests can count transport calls.

use super::{Method, Request, Transport};
use crate::error::{Error, Result};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

/// One scripted reply.
#[derive(Clone, Debug)]
pub struct Reply {
    outcome: Result<Value>,
    delay: Option<Duration>,
    gate: Option<Arc<Notify>>,
}

impl Reply {
    /// Successful reply with a JSON body.
    pub fn json(body: Value) -> Self {
        Reply {
            outcome: Ok(body),
            delay: None,
            gate: None,
        }
    }

    /// Successful reply with an empty body.
    pub fn empty() -> Self {
        Self::json(Value::Null)
    }

    /// Failed reply with a status code.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Reply {
            outcome: Err(Error::transport(status, message)),
            delay: None,
            gate: None,
        }
    }

    /// Delay the reply.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Hold the reply until `gate.notify_one()` is called.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

/// Thread-safe async in-memory transport.
///
/// Clones share routes and the request log.
///
/// # Example
///
/// ```no_run
/// use entity_kit::transport::{MemoryTransport, Method, Reply, Transport};
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let transport = MemoryTransport::new();
///     transport.route(Method::Get, "groups/g1", Reply::json(json!({"name": "Alpha"})));
///
///     let body = transport.fetch_one("groups/g1").await?;
///     assert_eq!(body["name"], "Alpha");
///     assert_eq!(transport.calls(Method::Get, "groups/g1"), 1);
///     Ok(())
/// }
/// ```
#[derive(Clone, Default)]
pub struct MemoryTransport {
    routes: Arc<DashMap<(Method, String), VecDeque<Reply>>>,
    log: Arc<Mutex<Vec<Request>>>,
}

impl MemoryTransport {
    /// Create a transport with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for a route.
    pub fn route(&self, method: Method, path: impl Into<String>, reply: Reply) -> &Self {
        self.routes
            .entry((method, path.into()))
            .or_default()
            .push_back(reply);
        self
    }

    /// Queue a reply for a GET route.
    pub fn on_get(&self, path: impl Into<String>, reply: Reply) -> &Self {
        self.route(Method::Get, path, reply)
    }

    /// Number of requests received for a route.
    pub fn calls(&self, method: Method, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    /// Total number of requests received.
    pub fn total_calls(&self) -> usize {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Every request received, in arrival order.
    pub fn requests(&self) -> Vec<Request> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_reply(&self, request: &Request) -> Option<Reply> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let mut queue = self
            .routes
            .get_mut(&(request.method, request.path.clone()))?;
        let reply = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        reply
    }
}

impl Transport for MemoryTransport {
    async fn execute(&self, request: Request) -> Result<Value> {
        let Some(reply) = self.next_reply(&request) else {
            debug!("✗ Memory {} {} -> no route", request.method, request.path);
            return Err(Error::transport(
                404,
                format!("no route for {} {}", request.method, request.path),
            ));
        };

        if let Some(gate) = &reply.gate {
            gate.notified().await;
        }
        if let Some(delay) = reply.delay {
            tokio::time::sleep(delay).await;
        }

        debug!("✓ Memory {} {}", request.method, request.path);
        reply.outcome
    }
}

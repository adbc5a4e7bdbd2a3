//! Transport abstraction and implementations.
//!
//! The store never speaks HTTP itself. It hands a [`Request`] to whatever
//! [`Transport`] it was built with and stores the JSON body that comes back.

use crate::error::Result;
use serde_json::Value;
use std::fmt;
use std::future::Future;

pub mod auth;
pub mod memory;

pub use auth::{Authenticated, TokenSource};
pub use memory::{MemoryTransport, Reply};

/// Request method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// A single transport request.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub params: Vec<(String, String)>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Request {
            method,
            path: path.into(),
            body: None,
            params: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_params(mut self, params: &[(&str, &str)]) -> Self {
        self.params = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self
    }
}

/// Trait for transport implementations.
///
/// Implementations perform one request and return the decoded response body,
/// `Value::Null` for an empty body, or `Error::Transport` carrying the status
/// code on failure.
///
/// **IMPORTANT:** All methods take `&self`; a transport is shared by every
/// fetch task a store spawns, so it must be `Send + Sync + 'static`.
///
/// **SEND:** Returned futures are `Send` so fetches can run on spawned tasks.
/// Implementors may still write `async fn execute(...)`.
pub trait Transport: Send + Sync + 'static {
    /// Execute a request.
    ///
    /// # Errors
    /// Returns `Error::Transport { status, message }` when the remote side
    /// rejects the request or cannot be reached.
    fn execute(&self, request: Request) -> impl Future<Output = Result<Value>> + Send;

    /// GET a single resource.
    fn fetch_one(&self, path: &str) -> impl Future<Output = Result<Value>> + Send {
        self.execute(Request::new(Method::Get, path))
    }

    /// GET with query parameters (collection listings).
    fn fetch_with(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> impl Future<Output = Result<Value>> + Send {
        self.execute(Request::new(Method::Get, path).with_params(params))
    }

    /// POST a body.
    fn post(&self, path: &str, body: Value) -> impl Future<Output = Result<Value>> + Send {
        self.execute(Request::new(Method::Post, path).with_body(body))
    }

    /// PUT a body.
    fn put(&self, path: &str, body: Value) -> impl Future<Output = Result<Value>> + Send {
        self.execute(Request::new(Method::Put, path).with_body(body))
    }

    /// DELETE a resource.
    fn delete(&self, path: &str) -> impl Future<Output = Result<Value>> + Send {
        self.execute(Request::new(Method::Delete, path))
    }
}

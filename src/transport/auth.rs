//! Token refresh hook.
//!
//! Authentication itself lives outside this crate. Whatever owns the session
//! implements [`TokenSource`]; [`Authenticated`] calls it before every request
//! it forwards.

use super::{Request, Transport};
use crate::error::Result;
use serde_json::Value;
use std::future::Future;

/// Something that can make sure credentials are fresh before a request.
pub trait TokenSource: Send + Sync + 'static {
    /// Refresh credentials if needed.
    ///
    /// # Errors
    /// An error aborts the request it was guarding; it is surfaced to the caller
    /// exactly like a transport failure.
    fn refresh(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Transport wrapper that refreshes credentials before each request.
#[derive(Clone)]
pub struct Authenticated<T, A> {
    inner: T,
    auth: A,
}

impl<T: Transport, A: TokenSource> Authenticated<T, A> {
    pub fn new(inner: T, auth: A) -> Self {
        Authenticated { inner, auth }
    }

    /// Wrapped transport.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn auth(&self) -> &A {
        &self.auth
    }
}

impl<T: Transport, A: TokenSource> Transport for Authenticated<T, A> {
    async fn execute(&self, request: Request) -> Result<Value> {
        self.auth.refresh().await?;
        self.inner.execute(request).await
    }
}

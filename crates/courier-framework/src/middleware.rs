//! Onion-style middleware.
//!
//! A [`Middleware`] receives the rest of the chain as [`Next`] together with
//! the event and its data. It continues by calling [`Next::run`] and may
//! return early instead to short-circuit with its own [`Outcome`].
//!
//! Chains are plain tower stacks: each middleware becomes a
//! [`MiddlewareLayer`] and [`build_chain`] folds them around a terminal
//! service so that the first registered middleware is the outermost.
//!
//! # Example
//!
//! ```rust,ignore
//! dp.outer_middleware(middleware_fn(|next: Next, event: BoxedEvent, data: Data| async move {
//!     let started = Instant::now();
//!     let outcome = next.run(event, data).await;
//!     tracing::debug!(elapsed = ?started.elapsed(), "update processed");
//!     outcome
//! }));
//! ```

use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use courier_core::{BoxError, BoxedEvent};
use futures::future::BoxFuture;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service, ServiceExt};

use crate::data::{Call, Data, Outcome};

/// A type-erased, `Clone + Send + Sync` pipeline service.
pub type BoxedCallService = BoxCloneSyncService<Call, Outcome, BoxError>;

/// A cross-cutting step around event processing.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn call(&self, next: Next, event: BoxedEvent, data: Data) -> Result<Outcome, BoxError>;
}

/// A shared middleware trait object.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The remainder of a middleware chain.
#[derive(Clone)]
pub struct Next {
    inner: BoxedCallService,
}

impl Next {
    pub(crate) fn new(inner: BoxedCallService) -> Self {
        Self { inner }
    }

    /// Runs the rest of the chain.
    pub async fn run(self, event: BoxedEvent, data: Data) -> Result<Outcome, BoxError> {
        self.inner.oneshot(Call::new(event, data)).await
    }
}

// ============================================================================
// Tower plumbing
// ============================================================================

/// Wraps a service with one middleware.
#[derive(Clone)]
pub struct MiddlewareLayer {
    middleware: BoxedMiddleware,
}

impl MiddlewareLayer {
    pub fn new(middleware: BoxedMiddleware) -> Self {
        Self { middleware }
    }
}

impl<S> Layer<S> for MiddlewareLayer {
    type Service = MiddlewareService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MiddlewareService {
            middleware: Arc::clone(&self.middleware),
            inner,
        }
    }
}

pub struct MiddlewareService<S> {
    middleware: BoxedMiddleware,
    inner: S,
}

impl<S: Clone> Clone for MiddlewareService<S> {
    fn clone(&self) -> Self {
        MiddlewareService {
            middleware: Arc::clone(&self.middleware),
            inner: self.inner.clone(),
        }
    }
}

impl<S> Service<Call> for MiddlewareService<S>
where
    S: Service<Call, Response = Outcome, Error = BoxError> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Response = Outcome;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Outcome, BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // `Next` drives the inner service with `oneshot`, which polls readiness itself.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: Call) -> Self::Future {
        let next = Next::new(BoxCloneSyncService::new(self.inner.clone()));
        let middleware = Arc::clone(&self.middleware);
        Box::pin(async move { middleware.call(next, call.event, call.data).await })
    }
}

/// Wraps `terminal` in `middlewares`, first entry outermost.
pub fn build_chain<'a, I>(middlewares: I, terminal: BoxedCallService) -> BoxedCallService
where
    I: IntoIterator<Item = &'a BoxedMiddleware>,
    I::IntoIter: DoubleEndedIterator,
{
    middlewares
        .into_iter()
        .rev()
        .fold(terminal, |inner, middleware| {
            BoxCloneSyncService::new(MiddlewareLayer::new(Arc::clone(middleware)).layer(inner))
        })
}

// ============================================================================
// Closure adapter
// ============================================================================

/// A middleware backed by a closure.
#[derive(Clone)]
pub struct FnMiddleware<F>(F);

/// Builds a middleware from an async closure taking `(Next, BoxedEvent, Data)`.
pub fn middleware_fn<F, Fut>(f: F) -> FnMiddleware<F>
where
    F: Fn(Next, BoxedEvent, Data) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Outcome, BoxError>> + Send + 'static,
{
    FnMiddleware(f)
}

#[async_trait]
impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Next, BoxedEvent, Data) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Outcome, BoxError>> + Send + 'static,
{
    async fn call(&self, next: Next, event: BoxedEvent, data: Data) -> Result<Outcome, BoxError> {
        (self.0)(next, event, data).await
    }
}

//! Registered handlers and the service that invokes them.
//!
//! [`HandlerService`] is the innermost link of every middleware chain: it
//! wraps one [`BoxedHandler`] and implements `tower::Service<Call>`.

use std::fmt;
use std::task::{Context, Poll};

use courier_core::{BoxError, UpdateType};
use futures::FutureExt;
use futures::future::BoxFuture;
use tower::Service;

use super::traits::BoxedHandler;
use crate::data::{Call, Outcome};
use crate::filter::HandlerFilter;

// ============================================================================
// HandlerEntry
// ============================================================================

/// One registration: update kind, handler filters, callback and optional
/// command description.
///
/// Entries are immutable once registered.
#[derive(Clone)]
pub struct HandlerEntry {
    update_type: UpdateType,
    filters: Vec<HandlerFilter>,
    handler: BoxedHandler,
    info: Option<String>,
    name: Option<String>,
}

impl HandlerEntry {
    pub(crate) fn new(
        update_type: UpdateType,
        filters: Vec<HandlerFilter>,
        handler: BoxedHandler,
        info: Option<String>,
        name: Option<String>,
    ) -> Self {
        Self {
            update_type,
            filters,
            handler,
            info,
            name,
        }
    }

    pub fn update_type(&self) -> UpdateType {
        self.update_type
    }

    pub fn filters(&self) -> &[HandlerFilter] {
        &self.filters
    }

    /// The human-readable command description, if one was given.
    pub fn info(&self) -> Option<&str> {
        self.info.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn service(&self) -> HandlerService {
        HandlerService::new(self.handler.clone())
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("update_type", &self.update_type)
            .field("filters", &self.filters)
            .field("info", &self.info)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// HandlerService
// ============================================================================

/// A tower [`Service`] that calls a single handler.
///
/// Any handler result becomes [`Outcome::Handled`]; a failure is boxed as a
/// [`DispatchError`](crate::DispatchError) so the dispatcher can recover it
/// after it has passed through the middleware chain.
#[derive(Clone)]
pub struct HandlerService {
    handler: BoxedHandler,
}

impl HandlerService {
    pub fn new(handler: BoxedHandler) -> Self {
        Self { handler }
    }
}

impl Service<Call> for HandlerService {
    type Response = Outcome;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Outcome, BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: Call) -> Self::Future {
        (self.handler)(call)
            .map(|result| match result {
                Ok(value) => Ok(Outcome::Handled(value)),
                Err(err) => Err(Box::new(err) as BoxError),
            })
            .boxed()
    }
}

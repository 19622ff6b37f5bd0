//! The [`Handler`] trait and its parameter-injection plumbing.
//!
//! Handlers are plain async functions. Every parameter implements
//! [`FromCall`] and is extracted from the [`Call`] before the function runs;
//! the return value implements [`IntoResponse`].
//!
//! ```rust,ignore
//! // The bare (event, data) shape
//! async fn log_all(event: BoxedEvent, data: Data) {
//!     tracing::info!(?event, keys = data.len(), "seen");
//! }
//!
//! // Typed payload, conversation context and a return value
//! async fn greet(msg: Payload<MessageCreated>, ctx: Arc<Context>) -> String {
//!     ctx.set_state(Some("greeted"));
//!     format!("hello, {}", msg.message.sender.as_ref().map_or("stranger", |u| u.name.as_str()))
//! }
//! ```

use std::any::type_name;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

use courier_core::{BoxError, BoxedClient, BoxedEvent, Event};
use futures::future::BoxFuture;
use serde_json::Value;

use crate::context::Context;
use crate::data::{Call, Data};
use crate::error::{DispatchError, ExtractError, ExtractResult};

// ============================================================================
// FromCall
// ============================================================================

/// Types that can be extracted from a [`Call`] as handler parameters.
///
/// A failed extraction aborts the dispatch with
/// [`DispatchError::Extract`]; wrap the parameter in `Option<T>` to make it
/// optional instead.
pub trait FromCall: Sized {
    fn from_call(call: &Call) -> ExtractResult<Self>;
}

impl FromCall for BoxedEvent {
    fn from_call(call: &Call) -> ExtractResult<Self> {
        Ok(call.event.clone())
    }
}

impl FromCall for Data {
    fn from_call(call: &Call) -> ExtractResult<Self> {
        Ok(call.data.clone())
    }
}

impl FromCall for Arc<Context> {
    fn from_call(call: &Call) -> ExtractResult<Self> {
        call.data.context().cloned().ok_or(ExtractError::MissingContext)
    }
}

/// Extracts the client bound during readiness.
///
/// ```rust,ignore
/// async fn ping(client: BoxedClient, event: BoxedEvent) -> ApiResult<()> {
///     let target = event.reply_target().ok_or(ApiError::MissingTarget)?;
///     client.send_message(target, "pong").await?;
///     Ok(())
/// }
/// ```
impl FromCall for BoxedClient {
    fn from_call(call: &Call) -> ExtractResult<Self> {
        call.data
            .client()
            .or_else(|| call.event.client())
            .cloned()
            .ok_or(ExtractError::ClientNotBound)
    }
}

impl<T: FromCall> FromCall for Option<T> {
    fn from_call(call: &Call) -> ExtractResult<Self> {
        Ok(T::from_call(call).ok())
    }
}

/// A typed view of the dispatched event.
///
/// Extraction fails with [`ExtractError::EventTypeMismatch`] if the event is
/// not a `T`.
#[derive(Debug, Clone)]
pub struct Payload<T>(pub T);

impl<T> Payload<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Payload<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: Event + Clone> FromCall for Payload<T> {
    fn from_call(call: &Call) -> ExtractResult<Self> {
        call.event
            .downcast_ref::<T>()
            .cloned()
            .map(Payload)
            .ok_or_else(|| ExtractError::EventTypeMismatch {
                expected: type_name::<T>(),
                got: call.event.update_type(),
            })
    }
}

// ============================================================================
// IntoResponse
// ============================================================================

/// Types that can be returned from handlers.
///
/// The value becomes the [`Outcome::Handled`](crate::Outcome::Handled)
/// payload of the dispatch. `Err` variants propagate out of dispatch as
/// [`DispatchError::Handler`].
pub trait IntoResponse: Send + 'static {
    fn into_response(self) -> Result<Value, BoxError>;
}

impl IntoResponse for () {
    fn into_response(self) -> Result<Value, BoxError> {
        Ok(Value::Null)
    }
}

impl IntoResponse for String {
    fn into_response(self) -> Result<Value, BoxError> {
        Ok(Value::String(self))
    }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Result<Value, BoxError> {
        Ok(Value::from(self))
    }
}

impl IntoResponse for Value {
    fn into_response(self) -> Result<Value, BoxError> {
        Ok(self)
    }
}

impl IntoResponse for bool {
    fn into_response(self) -> Result<Value, BoxError> {
        Ok(Value::Bool(self))
    }
}

impl<T: IntoResponse> IntoResponse for Option<T> {
    fn into_response(self) -> Result<Value, BoxError> {
        match self {
            Some(t) => t.into_response(),
            None => Ok(Value::Null),
        }
    }
}

impl<T, E> IntoResponse for Result<T, E>
where
    T: IntoResponse,
    E: Into<BoxError> + Send + 'static,
{
    fn into_response(self) -> Result<Value, BoxError> {
        match self {
            Ok(t) => t.into_response(),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// Handler Trait
// ============================================================================

/// An event handler.
///
/// Implemented for async functions taking up to eight [`FromCall`]
/// parameters and returning an [`IntoResponse`] value.
pub trait Handler<T>: Clone + Send + Sync + 'static {
    fn call(self, call: Call) -> BoxFuture<'static, Result<Value, DispatchError>>;
}

/// A type-erased handler stored in a router.
pub type BoxedHandler =
    Arc<dyn Fn(Call) -> BoxFuture<'static, Result<Value, DispatchError>> + Send + Sync>;

/// Erases a handler's concrete type.
pub fn into_handler<H, T>(handler: H) -> BoxedHandler
where
    H: Handler<T>,
    T: 'static,
{
    Arc::new(move |call| handler.clone().call(call))
}

macro_rules! impl_handler {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case, unused_variables)]
        impl<F, Fut, Res, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: FnOnce($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Res> + Send + 'static,
            Res: IntoResponse,
            $( $ty: FromCall + Send + 'static, )*
        {
            fn call(self, call: Call) -> BoxFuture<'static, Result<Value, DispatchError>> {
                Box::pin(async move {
                    $(
                        let $ty = $ty::from_call(&call)?;
                    )*

                    let res = (self)($($ty,)*).await;
                    res.into_response().map_err(DispatchError::Handler)
                })
            }
        }
    };
}

impl_handler!();
impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);

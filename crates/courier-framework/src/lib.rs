//! # Courier Framework
//!
//! The dispatch engine: routing tree, filters, middleware, conversation
//! contexts and readiness.
//!
//! - [`Dispatcher`] / [`Router`] – registration via the [`Routing`] trait and
//!   first-match dispatch in registration order
//! - [`Filter`] – three-way [`FilterResult`] checks, with [`Command`] as the
//!   filter whose names feed the client's command list
//! - [`Middleware`] – onion-style steps, outer (every dispatch) and inner
//!   (around the selected handler)
//! - [`Handler`] – async functions with [`FromCall`] parameter injection
//! - [`ContextStore`] – one [`Context`] per `(chat, user)` pair
//!
//! ```rust,ignore
//! use courier_framework::prelude::*;
//!
//! async fn start(event: BoxedEvent) -> ApiResult<()> {
//!     event.answer("Hello!").await?;
//!     Ok(())
//! }
//!
//! let mut dp = Dispatcher::new();
//! dp.message_created()
//!     .command(Command::new(["start"]))
//!     .info("Start the bot")
//!     .handler(start);
//!
//! dp.ready(client).await?;
//! dp.dispatch(event).await?;
//! ```

pub mod commands;
pub mod context;
pub mod data;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod handler;
pub mod middleware;
pub mod router;
mod startup;

pub use commands::{extract_commands, handler_commands, parse_commands_info};
pub use context::{Context, ContextKey, ContextStore, EvictionPolicy, LruPolicy, NeverEvict};
pub use data::{Call, Data, Outcome};
pub use dispatcher::{Dispatcher, OnStartedFn};
pub use error::{DispatchError, ExtractError, ExtractResult, ReadyError};
pub use filter::{
    AsyncFnFilter, BoxedFilter, Command, Filter, FilterResult, FnFilter, HandlerFilter,
    filter_async, filter_fn,
};
pub use handler::{
    BoxedHandler, FromCall, Handler, HandlerEntry, HandlerService, IntoResponse, Payload,
    into_handler,
};
pub use middleware::{
    BoxedCallService, BoxedMiddleware, FnMiddleware, Middleware, MiddlewareLayer,
    MiddlewareService, Next, build_chain, middleware_fn,
};
pub use router::{Registrar, Router, Routing, RoutingUnit};

/// Everything needed to register handlers.
pub mod prelude {
    pub use crate::{
        Command, Context, Data, DispatchError, Dispatcher, Filter, FilterResult, Middleware,
        Next, Outcome, Payload, Router, Routing, filter_async, filter_fn, middleware_fn,
    };
    pub use courier_core::{
        ApiError, ApiResult, BoxError, BoxedClient, BoxedEvent, Client, Event, MessageCallback,
        MessageCreated, UpdateType,
    };
}

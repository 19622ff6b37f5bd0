//! Handler system for Courier.
//!
//! - **Handler** ([`traits`]) – the [`Handler`] trait, implemented for async
//!   functions whose parameters are injected through [`FromCall`], similar to
//!   Axum's handler system.
//! - **Service** ([`service`]) – [`HandlerEntry`], the immutable registration
//!   record kept by a router, and [`HandlerService`], the tower service at
//!   the centre of every middleware chain.
//!
//! # Architecture
//!
//! ```text
//! Registrar::handler(f)
//!     └─ into_handler(f) ─▶ BoxedHandler ─▶ HandlerEntry { kind, filters, info }
//!
//! dispatch
//!     └─ entry.service() ─▶ HandlerService ─▶ wrapped by MiddlewareLayer(s)
//! ```

pub mod service;
pub mod traits;

pub use service::{HandlerEntry, HandlerService};
pub use traits::{BoxedHandler, FromCall, Handler, IntoResponse, Payload, into_handler};

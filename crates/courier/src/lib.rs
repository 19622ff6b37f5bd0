//! # Courier
//!
//! An async bot framework: updates are routed through a tree of routers,
//! filtered, wrapped in middleware and handed to the first matching handler.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────┐     ┌──────────────────────────────────┐
//! │ UpdateSource │────▶│ Runtime │────▶│ Dispatcher                       │
//! └──────────────┘     └─────────┘     │  own handlers                    │──▶ Client
//!                                      │  Router "admin" (filters, mws)   │
//!                                      │  Router "users" (filters, mws)   │
//!                                      └──────────────────────────────────┘
//! ```
//!
//! - **Core** (`courier::core`): events, update kinds, the client and
//!   update-source boundaries
//! - **Framework** (`courier::framework`): routers, filters, middleware,
//!   handlers, conversation contexts and readiness
//! - **Runtime** (`courier::runtime`): configuration, logging and the loop
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! async fn start(event: BoxedEvent) -> ApiResult<()> {
//!     event.answer("Hello!").await?;
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut dp = Dispatcher::new();
//!     dp.message_created()
//!         .command(Command::new(["start"]))
//!         .info("Start the bot")
//!         .handler(start);
//!
//!     let (tx, source) = ChannelSource::channel(64);
//!     Runtime::new(dp).run_webhook(client, source).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use courier_core as core;
pub use courier_framework as framework;
pub use courier_runtime as runtime;

/// Commonly used types for building bots.
///
/// ```rust,ignore
/// use courier::prelude::*;
/// ```
pub mod prelude {
    pub use courier_framework::prelude::*;

    pub use courier_framework::{ContextStore, LruPolicy};
    pub use courier_runtime::{ChannelSource, CancellationToken, CourierConfig, Runtime};
    pub use courier_core::{BotInfo, CommandsInfo, MessageTarget, Subscription, UpdateSource};
}

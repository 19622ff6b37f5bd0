//! Courier Runtime - configuration, logging and the update loop.
//!
//! This crate provides:
//! - Layered configuration (`CourierConfig`, `ConfigLoader`)
//! - Logging setup (`LoggingBuilder`, `logging::init_from_config`)
//! - The driver (`Runtime`) wiring an [`UpdateSource`](courier_core::UpdateSource)
//!   to a [`Dispatcher`](courier_framework::Dispatcher)
//! - `ChannelSource` for producers that push updates (webhook servers)
//!
//! ```ignore
//! use courier_runtime::{ChannelSource, Runtime};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut dp = Dispatcher::new();
//!     dp.include_router(handlers::router());
//!
//!     let mut runtime = Runtime::new(dp);
//!     let (tx, source) = ChannelSource::channel(64);
//!     spawn_webhook_server(tx);
//!
//!     // Runs until Ctrl+C or the server drops its sender
//!     runtime.run_webhook(client, source).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod source;

pub use config::{ConfigError, ConfigLoader, ConfigResult, CourierConfig, LoggingConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use runtime::{Runtime, RuntimeBuilder};
pub use source::ChannelSource;

pub use tokio_util::sync::CancellationToken;
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for handler code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}

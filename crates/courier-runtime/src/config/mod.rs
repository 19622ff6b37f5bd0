//! Configuration for the Courier runtime.
//!
//! Settings are layered with figment (defaults, files, `COURIER_*`
//! environment variables, single-key overrides) and checked by
//! [`validate_config`] before the runtime starts.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use schema::{
    CourierConfig, DispatcherConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, PollingConfig,
    SpanEventConfig,
};
pub use validation::validate_config;

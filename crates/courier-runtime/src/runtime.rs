//! The update loop.
//!
//! The runtime owns a configured [`Dispatcher`], makes it ready against a
//! client, then pulls batches from an [`UpdateSource`] and feeds every event
//! to the dispatcher until the source ends or shutdown is requested.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use courier_runtime::{ChannelSource, Runtime};
//!
//! let mut dp = Dispatcher::new();
//! dp.message_created().handler(echo);
//!
//! let mut runtime = Runtime::builder().config_file("courier.toml").build(dp)?;
//! let (tx, source) = ChannelSource::channel(64);
//! runtime.run_webhook(client, source).await?;
//! ```

use std::path::Path;
use std::time::Duration;

use courier_core::{BoxedClient, FetchOptions, TransportError, UpdateSource};
use courier_framework::Dispatcher;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::{ConfigLoader, CourierConfig, validate_config};
use crate::error::{ConfigResult, RuntimeResult};
use crate::logging;

/// Drives a [`Dispatcher`] from an [`UpdateSource`].
#[derive(Debug)]
pub struct Runtime {
    config: CourierConfig,
    dispatcher: Dispatcher,
}

impl Runtime {
    /// Creates a runtime from the configuration found in the default
    /// locations, falling back to defaults when it cannot be loaded.
    pub fn new(dispatcher: Dispatcher) -> Self {
        let config = ConfigLoader::new().load().unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                CourierConfig::default()
            });

        Self::from_config(&config, dispatcher)
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an already loaded configuration.
    ///
    /// Initializes logging, then applies the dispatcher section: the spawn
    /// policy is switched on when configured and the router id fills in a
    /// dispatcher that has none.
    pub fn from_config(config: &CourierConfig, mut dispatcher: Dispatcher) -> Self {
        logging::init_from_config(&config.logging);

        if config.dispatcher.use_create_task {
            dispatcher = dispatcher.with_create_task(true);
        }
        if dispatcher.id().is_none()
            && let Some(id) = &config.dispatcher.router_id
        {
            dispatcher = dispatcher.with_id(id.clone());
        }

        info!(
            log_level = %config.logging.level,
            use_create_task = dispatcher.use_create_task(),
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            dispatcher,
        }
    }

    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Runs in polling mode until the source ends or Ctrl+C / SIGTERM.
    ///
    /// Readiness checks for push subscriptions that would compete with
    /// polling.
    pub async fn run_polling<S>(&mut self, client: BoxedClient, source: S) -> RuntimeResult<()>
    where
        S: UpdateSource,
    {
        self.run_with_signals(client, source, true).await
    }

    /// Runs in webhook mode until the source ends or Ctrl+C / SIGTERM.
    pub async fn run_webhook<S>(&mut self, client: BoxedClient, source: S) -> RuntimeResult<()>
    where
        S: UpdateSource,
    {
        self.run_with_signals(client, source, false).await
    }

    async fn run_with_signals<S>(
        &mut self,
        client: BoxedClient,
        source: S,
        polling: bool,
    ) -> RuntimeResult<()>
    where
        S: UpdateSource,
    {
        let shutdown = CancellationToken::new();
        let watcher = tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                wait_for_shutdown().await;
                shutdown.cancel();
            }
        });

        let result = self.run_until(client, source, polling, shutdown).await;
        watcher.abort();
        result
    }

    /// Makes the dispatcher ready, then processes batches until `source`
    /// ends or `shutdown` is cancelled.
    ///
    /// The source is configured from the polling section first. Events of a
    /// kind not listed in `polling.types` are dropped. Each remaining event
    /// goes through [`Dispatcher::feed_update`], so dispatch failures are
    /// logged there and never stop the loop. A failed fetch is logged and
    /// retried after `polling.error_delay_ms`. An I/O failure of the source
    /// is fatal. Spawned dispatches are awaited before returning.
    pub async fn run_until<S>(
        &mut self,
        client: BoxedClient,
        mut source: S,
        polling: bool,
        shutdown: CancellationToken,
    ) -> RuntimeResult<()>
    where
        S: UpdateSource,
    {
        self.dispatcher.set_polling(polling);
        let me = self.dispatcher.ready(client).await?;
        info!(
            user_id = me.user_id,
            name = %me.name,
            mode = if polling { "polling" } else { "webhook" },
            "Courier runtime is now running"
        );

        let options = self.config.polling.fetch_options();
        source.configure(&options);

        let error_delay = self.config.polling.error_delay();
        let result = self
            .drive(&mut source, &options, error_delay, &shutdown)
            .await;
        self.dispatcher.wait_pending().await;
        result
    }

    async fn drive<S>(
        &self,
        source: &mut S,
        options: &FetchOptions,
        error_delay: Duration,
        shutdown: &CancellationToken,
    ) -> RuntimeResult<()>
    where
        S: UpdateSource,
    {
        loop {
            let batch = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping update loop");
                    break;
                }
                batch = source.next_batch() => batch,
            };

            match batch {
                Ok(Some(events)) => {
                    debug!(count = events.len(), "received update batch");
                    for event in events {
                        let update_type = event.update_type();
                        if !options.accepts(update_type) {
                            trace!(%update_type, "dropping update of unrequested kind");
                            continue;
                        }
                        self.dispatcher.feed_update(event).await;
                    }
                }
                Ok(None) | Err(TransportError::Closed) => {
                    info!("Update source closed, stopping update loop");
                    break;
                }
                Err(err @ TransportError::Io(_)) => {
                    error!(error = %err, "Update source failed");
                    return Err(err.into());
                }
                Err(err) => {
                    warn!(
                        error = %err,
                        retry_in_ms = error_delay.as_millis() as u64,
                        "Failed to fetch updates"
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            info!("Shutdown requested, stopping update loop");
                            break;
                        }
                        _ = tokio::time::sleep(error_delay) => {}
                    }
                }
            }
        }

        Ok(())
    }
}

/// Waits for Ctrl+C or, on unix, SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
                return;
            }
            Err(err) => {
                warn!(error = %err, "Failed to register SIGTERM handler");
            }
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(err) => {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Loads configuration, validates it and builds a [`Runtime`].
///
/// ```rust,ignore
/// let runtime = Runtime::builder()
///     .config_file("config/courier.toml")
///     .profile("production")
///     .build(dispatcher)?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Replaces the built-in defaults.
    pub fn defaults(mut self, config: CourierConfig) -> Self {
        self.config_loader = self.config_loader.defaults(config);
        self
    }

    /// Overrides one dotted key above files and the environment.
    pub fn set<T: serde::Serialize>(mut self, key: &str, value: T) -> Self {
        self.config_loader = self.config_loader.set(key, value);
        self
    }

    /// Loads and validates the configuration, then wraps `dispatcher`.
    pub fn build(self, dispatcher: Dispatcher) -> ConfigResult<Runtime> {
        let config = self.config_loader.load()?;
        validate_config(&config)?;
        Ok(Runtime::from_config(&config, dispatcher))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

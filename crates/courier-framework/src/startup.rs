//! Readiness: the one-time wiring that runs before the first update.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use courier_core::{BotInfo, BoxedClient};
use tracing::{debug, error, info, warn};

use crate::commands::extract_commands;
use crate::dispatcher::Dispatcher;
use crate::error::ReadyError;
use crate::router::{Routing, bind_once};

impl Dispatcher {
    /// Makes the dispatcher ready to receive updates.
    ///
    /// 1. Binds `client` to the dispatcher and to every child router.
    /// 2. On the first run only, appends each command handler's entry to the
    ///    client's command registry, routers first to last (the dispatcher
    ///    itself first), handlers in registration order.
    /// 3. In polling mode, when the client asks for it, warns about any
    ///    active push subscriptions. A failed lookup is logged and ignored.
    /// 4. Fetches and caches the bot's own identity. Failure aborts readiness.
    /// 5. On the first success only, fires the `on_started` callback.
    ///
    /// Running it again is safe: binding, command extraction and the
    /// callback do not repeat, while steps 3 and 4 refresh.
    pub async fn ready(&self, client: BoxedClient) -> Result<BotInfo, ReadyError> {
        let inner = &self.inner;

        bind_once(&inner.client, &client, inner.id.as_deref().unwrap_or("dispatcher"));
        for router in &inner.routers {
            router.bind_client(&client);
        }
        let client = match inner.client.get() {
            Some(bound) => Arc::clone(bound),
            None => client,
        };

        if !inner.commands_registered.swap(true, Ordering::SeqCst) {
            let registry = client.commands();
            let handlers = inner
                .unit
                .handlers()
                .iter()
                .chain(inner.routers.iter().flat_map(|r| r.unit().handlers()));
            for handler in handlers {
                extract_commands(handler, registry);
            }
            debug!(count = registry.len(), "command list collected");
        }

        if inner.polling && client.auto_check_subscriptions() {
            check_subscriptions(&client).await;
        }

        let me = client.get_me().await.map_err(ReadyError::Identify)?;
        info!(user_id = me.user_id, name = %me.name, routers = self.router_count(), "bot is ready");
        *inner.me.write() = Some(me.clone());

        if !inner.started.swap(true, Ordering::SeqCst) {
            if let Some(callback) = &inner.on_started {
                callback().await;
            }
        }

        Ok(me)
    }
}

/// Warns when push subscriptions are active while polling.
async fn check_subscriptions(client: &BoxedClient) {
    match client.get_subscriptions().await {
        Ok(subscriptions) if !subscriptions.is_empty() => {
            let urls = subscriptions
                .iter()
                .map(|s| s.url.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            warn!(
                urls = %urls,
                "push subscriptions are active while polling, updates may not arrive: {urls}"
            );
        }
        Ok(_) => {}
        Err(err) => {
            error!(error = %err, "failed to check push subscriptions");
        }
    }
}

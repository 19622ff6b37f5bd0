//! Echo Bot Demo
//!
//! Drives a dispatcher with an in-memory client and a channel-backed source,
//! so it runs without a platform connection.
//!
//! # What it shows
//!
//! - Command handlers whose descriptions become the client's command list
//! - A router with its own base filter and inner middleware
//! - An outer middleware timing every update
//! - Per-conversation state through `Arc<Context>`
//!
//! # Usage
//!
//! ```bash
//! cargo run --package echo-bot
//! COURIER_LOGGING__LEVEL=debug cargo run --package echo-bot
//! COURIER_LOGGING__DISPATCH_TIMING=true cargo run --package echo-bot
//! ```

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use courier::prelude::*;
use courier::core::CommandRegistry;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, info};

const AWAITING_NAME: &str = "awaiting_name";

// ============================================================================
// In-memory client
// ============================================================================

/// Prints outgoing messages instead of calling a platform API.
#[derive(Default)]
struct ConsoleClient {
    commands: CommandRegistry,
    outbox: Mutex<Vec<(MessageTarget, String)>>,
}

#[async_trait]
impl Client for ConsoleClient {
    async fn get_me(&self) -> ApiResult<BotInfo> {
        Ok(BotInfo {
            user_id: 1,
            name: "Echo".into(),
            username: Some("echo_bot".into()),
        })
    }

    async fn get_subscriptions(&self) -> ApiResult<Vec<Subscription>> {
        Ok(Vec::new())
    }

    async fn send_message(&self, target: MessageTarget, text: &str) -> ApiResult<Value> {
        info!(chat_id = ?target.chat_id, user_id = ?target.user_id, "-> {text}");
        self.outbox.lock().push((target, text.to_string()));
        Ok(json!({ "ok": true }))
    }

    async fn call_api(&self, method: &str, params: Value) -> ApiResult<Value> {
        debug!(method, %params, "API call");
        Ok(Value::Null)
    }

    fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn start(event: BoxedEvent) -> ApiResult<()> {
    event
        .answer("Hi! Send me anything and I'll echo it back. Try /help.")
        .await?;
    Ok(())
}

/// Lists the commands collected during readiness.
async fn help(event: BoxedEvent, client: BoxedClient) -> ApiResult<()> {
    let lines = client
        .commands()
        .snapshot()
        .into_iter()
        .map(|entry| {
            let names = entry
                .commands
                .iter()
                .map(|c| format!("/{c}"))
                .collect::<Vec<_>>()
                .join(", ");
            match entry.info {
                Some(info) => format!("{names} - {info}"),
                None => names,
            }
        })
        .collect::<Vec<_>>();
    event.answer(&lines.join("\n")).await?;
    Ok(())
}

async fn ask_name(event: BoxedEvent, ctx: Arc<Context>) -> ApiResult<()> {
    ctx.set_state(Some(AWAITING_NAME));
    event.answer("What's your name?").await?;
    Ok(())
}

/// `/say <text>`: the command filter puts the remainder into `args`.
async fn say(event: BoxedEvent, data: Data) -> ApiResult<()> {
    match data.get_str("args").filter(|args| !args.is_empty()) {
        Some(args) => event.answer(args).await?,
        None => event.answer("Usage: /say <text>").await?,
    };
    Ok(())
}

async fn echo(event: BoxedEvent, ctx: Arc<Context>) -> ApiResult<()> {
    let text = event.text().unwrap_or_default().to_string();

    if ctx.state().as_deref() == Some(AWAITING_NAME) {
        ctx.set_state(None);
        ctx.update_data(serde_json::Map::from_iter([("name".to_string(), json!(text))]));
        event.answer(&format!("Nice to meet you, {text}!")).await?;
        return Ok(());
    }

    let reply = match ctx.get("name").and_then(|v| v.as_str().map(str::to_owned)) {
        Some(name) => format!("{name} said: {text}"),
        None => text,
    };
    event.answer(&reply).await?;
    Ok(())
}

// ============================================================================
// Wiring
// ============================================================================

fn commands_router() -> Router {
    let mut router = Router::with_id("commands");
    router
        .filter(filter_fn(|event| {
            event.text().is_some_and(|text| text.starts_with('/'))
        }))
        .middleware(middleware_fn(|next: Next, event: BoxedEvent, data: Data| async move {
            debug!(command = ?data.get_str("command"), "running command");
            next.run(event, data).await
        }));

    router
        .message_created()
        .command(Command::new(["start"]))
        .info("Start the bot")
        .handler(start);
    router
        .message_created()
        .command(Command::new(["help"]))
        .doc("Shows this list.\n\ncommands_info: List available commands")
        .handler(help);
    router
        .message_created()
        .command(Command::new(["name", "rename"]))
        .info("Tell the bot your name")
        .handler(ask_name);
    router
        .message_created()
        .command(Command::new(["say"]))
        .info("Repeat the given text")
        .handler(say);
    router
}

fn build_dispatcher() -> Dispatcher {
    let mut dp = Dispatcher::new();
    dp.outer_middleware(middleware_fn(|next: Next, event: BoxedEvent, data: Data| async move {
        let update_type = event.update_type();
        let started = Instant::now();
        let outcome = next.run(event, data).await;
        debug!(%update_type, elapsed = ?started.elapsed(), "update processed");
        outcome
    }));
    dp.on_started(|| async {
        info!("echo bot started");
    });

    dp.include_router(commands_router());
    let mut fallback = Router::with_id("echo");
    fallback.message_created().handler(echo);
    dp.include_router(fallback);
    dp
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut runtime = Runtime::new(build_dispatcher());
    let client = Arc::new(ConsoleClient::default());

    let (tx, source) = ChannelSource::channel(16);
    let script = [
        "/start",
        "/help",
        "hello there",
        "/name",
        "Ada",
        "how are you?",
        "/say courier works",
        "/unknown",
    ];
    tokio::spawn(async move {
        for text in script {
            let event = BoxedEvent::new(MessageCreated::text(100, 7, text));
            if tx.send(event).await.is_err() {
                break;
            }
        }
        // Dropping the sender closes the source and ends the run.
    });

    runtime.run_webhook(client.clone(), source).await?;

    info!(sent = client.outbox.lock().len(), "done");
    Ok(())
}

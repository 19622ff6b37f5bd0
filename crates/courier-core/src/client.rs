//! The platform client collaborator.
//!
//! Courier never talks to the platform itself. A [`Client`] implementation
//! (an HTTP API wrapper, a test double, ...) is bound to the dispatcher during
//! readiness; the dispatcher only ever calls [`Client::get_me`] and
//! [`Client::get_subscriptions`] and fills the client's [`CommandRegistry`].
//! Handlers use the same client for their own outbound sends.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiResult;

/// The bot's own identity, as reported by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotInfo {
    pub user_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// An active push (webhook) subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub url: String,
    #[serde(default)]
    pub update_types: Vec<String>,
}

/// Where an outbound message goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageTarget {
    pub chat_id: Option<i64>,
    pub user_id: Option<i64>,
}

/// One entry of the bot's self-reported command list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandsInfo {
    /// Command names, never empty.
    pub commands: Vec<String>,
    /// Human-readable description.
    #[serde(default)]
    pub info: Option<String>,
}

impl CommandsInfo {
    pub fn new(commands: Vec<String>, info: Option<String>) -> Self {
        Self { commands, info }
    }
}

/// Append-only list of [`CommandsInfo`] owned by a client.
///
/// Order of appearance is router traversal order, then handler registration
/// order within a router.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    entries: RwLock<Vec<CommandsInfo>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn push(&self, info: CommandsInfo) {
        self.entries.write().push(info);
    }

    /// Returns a snapshot of all entries.
    pub fn snapshot(&self) -> Vec<CommandsInfo> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// The outbound side of a bot.
///
/// # Example Implementation
///
/// ```rust,ignore
/// struct HttpClient { commands: CommandRegistry, /* ... */ }
///
/// #[async_trait]
/// impl Client for HttpClient {
///     async fn get_me(&self) -> ApiResult<BotInfo> { /* GET /me */ }
///     async fn get_subscriptions(&self) -> ApiResult<Vec<Subscription>> { /* GET /subscriptions */ }
///     async fn send_message(&self, target: MessageTarget, text: &str) -> ApiResult<Value> { /* POST /messages */ }
///     async fn call_api(&self, method: &str, params: Value) -> ApiResult<Value> { /* ... */ }
///     fn commands(&self) -> &CommandRegistry { &self.commands }
///     fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> { self }
/// }
/// ```
#[async_trait]
pub trait Client: Send + Sync + 'static {
    /// Fetches the bot's own identity.
    async fn get_me(&self) -> ApiResult<BotInfo>;

    /// Lists active push subscriptions.
    async fn get_subscriptions(&self) -> ApiResult<Vec<Subscription>>;

    /// Sends a text message.
    async fn send_message(&self, target: MessageTarget, text: &str) -> ApiResult<Value>;

    /// Calls a raw platform method with JSON parameters.
    async fn call_api(&self, method: &str, params: Value) -> ApiResult<Value>;

    /// Whether readiness should look for conflicting push subscriptions when
    /// running in polling mode.
    fn auto_check_subscriptions(&self) -> bool {
        true
    }

    /// The command list this client reports to the platform.
    fn commands(&self) -> &CommandRegistry;

    /// Returns self as an `Arc<dyn Any>` for downcasting to the concrete client.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A shared client trait object.
pub type BoxedClient = Arc<dyn Client>;

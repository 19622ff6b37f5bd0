//! Event system for Courier.
//!
//! - [`UpdateType`] - the discriminant of a platform update
//! - [`Event`] - base trait implemented by every typed payload
//! - [`BoxedEvent`] - type-erased container handed to the dispatcher
//!
//! # Reply back-reference
//!
//! A `BoxedEvent` can carry the client that received it. The dispatcher binds
//! its client onto every event it dispatches, so handlers can answer without
//! threading the client through by hand:
//!
//! ```rust,ignore
//! async fn echo(event: BoxedEvent) -> ApiResult<()> {
//!     if let Some(text) = event.text() {
//!         event.answer(text).await?;
//!     }
//!     Ok(())
//! }
//! ```

use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::client::{BoxedClient, MessageTarget};
use crate::error::{ApiError, ApiResult};

// ============================================================================
// Update Type
// ============================================================================

/// The kind of platform update an event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    MessageCreated,
    MessageCallback,
    MessageEdited,
    MessageRemoved,
    MessageChatCreated,
    BotStarted,
    BotStopped,
    BotAdded,
    BotRemoved,
    UserAdded,
    UserRemoved,
    ChatTitleChanged,
    DialogCleared,
    DialogMuted,
    DialogUnmuted,
    DialogRemoved,
    /// Synthetic kind used for lifecycle notifications emitted by the runtime.
    OnStarted,
}

impl UpdateType {
    /// Every update kind, in declaration order.
    pub const ALL: [UpdateType; 17] = [
        Self::MessageCreated,
        Self::MessageCallback,
        Self::MessageEdited,
        Self::MessageRemoved,
        Self::MessageChatCreated,
        Self::BotStarted,
        Self::BotStopped,
        Self::BotAdded,
        Self::BotRemoved,
        Self::UserAdded,
        Self::UserRemoved,
        Self::ChatTitleChanged,
        Self::DialogCleared,
        Self::DialogMuted,
        Self::DialogUnmuted,
        Self::DialogRemoved,
        Self::OnStarted,
    ];

    /// Returns the wire name of this update kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageCreated => "message_created",
            Self::MessageCallback => "message_callback",
            Self::MessageEdited => "message_edited",
            Self::MessageRemoved => "message_removed",
            Self::MessageChatCreated => "message_chat_created",
            Self::BotStarted => "bot_started",
            Self::BotStopped => "bot_stopped",
            Self::BotAdded => "bot_added",
            Self::BotRemoved => "bot_removed",
            Self::UserAdded => "user_added",
            Self::UserRemoved => "user_removed",
            Self::ChatTitleChanged => "chat_title_changed",
            Self::DialogCleared => "dialog_cleared",
            Self::DialogMuted => "dialog_muted",
            Self::DialogUnmuted => "dialog_unmuted",
            Self::DialogRemoved => "dialog_removed",
            Self::OnStarted => "on_started",
        }
    }
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown update kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown update type '{0}'")]
pub struct ParseUpdateTypeError(pub String);

impl FromStr for UpdateType {
    type Err = ParseUpdateTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == lowered)
            .ok_or(ParseUpdateTypeError(s.to_string()))
    }
}

// ============================================================================
// Core Event Trait
// ============================================================================

/// The base trait for all platform updates.
///
/// Events are type-erased behind `dyn Event` and downcast with `as_any()`.
/// The identity accessors feed the dispatcher's conversation key; an event
/// that reports neither a chat nor a user gets no conversation context.
pub trait Event: Any + Send + Sync + fmt::Debug {
    /// Returns the update kind of this event.
    fn update_type(&self) -> UpdateType;

    /// The chat this event belongs to, if any.
    fn chat_id(&self) -> Option<i64> {
        None
    }

    /// The user who caused this event, if any.
    fn user_id(&self) -> Option<i64> {
        None
    }

    /// The message text carried by this event, if any.
    fn text(&self) -> Option<&str> {
        None
    }

    /// Returns a reference to self as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Returns the raw JSON this event was decoded from, if preserved.
    fn raw_json(&self) -> Option<&str> {
        None
    }
}

// ============================================================================
// Boxed Event
// ============================================================================

/// A type-erased, cheaply clonable event.
///
/// `BoxedEvent` derefs to `dyn Event`, so trait methods can be called
/// directly:
///
/// ```rust,ignore
/// let event = BoxedEvent::new(MessageCreated::text(1, 2, "/start"));
/// assert_eq!(event.update_type(), UpdateType::MessageCreated);
/// ```
#[derive(Clone)]
pub struct BoxedEvent {
    inner: Arc<dyn Event>,
    client: Option<BoxedClient>,
}

impl BoxedEvent {
    /// Creates a new `BoxedEvent` from any type implementing `Event`.
    pub fn new<E: Event>(event: E) -> Self {
        Self {
            inner: Arc::new(event),
            client: None,
        }
    }

    /// Returns the inner `Arc<dyn Event>`.
    pub fn inner(&self) -> &Arc<dyn Event> {
        &self.inner
    }

    /// Attempts to downcast to a concrete event type.
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.inner.as_any().downcast_ref()
    }

    /// Returns `true` if the event is of concrete type `E`.
    pub fn is<E: Event>(&self) -> bool {
        self.inner.as_any().is::<E>()
    }

    /// Attaches the client that can answer this event.
    pub fn with_client(mut self, client: BoxedClient) -> Self {
        self.client = Some(client);
        self
    }

    /// The client bound to this event, if any.
    pub fn client(&self) -> Option<&BoxedClient> {
        self.client.as_ref()
    }

    /// The conversation this event should be answered in.
    pub fn reply_target(&self) -> Option<MessageTarget> {
        match (self.chat_id(), self.user_id()) {
            (None, None) => None,
            (chat_id, user_id) => Some(MessageTarget { chat_id, user_id }),
        }
    }

    /// Sends `text` back into this event's conversation through the bound client.
    pub async fn answer(&self, text: &str) -> ApiResult<Value> {
        let client = self.client.as_ref().ok_or(ApiError::NotConnected)?;
        let target = self.reply_target().ok_or(ApiError::MissingTarget)?;
        client.send_message(target, text).await
    }
}

impl std::ops::Deref for BoxedEvent {
    type Target = dyn Event;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl fmt::Debug for BoxedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedEvent")
            .field("update_type", &self.update_type())
            .field("chat_id", &self.chat_id())
            .field("user_id", &self.user_id())
            .field("has_client", &self.client.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BotStarted, MessageCreated};

    #[test]
    fn test_update_type_round_trips_through_str() {
        for kind in UpdateType::ALL {
            assert_eq!(kind.as_str().parse::<UpdateType>(), Ok(kind));
        }
        assert!("nonsense".parse::<UpdateType>().is_err());
    }

    #[test]
    fn test_update_type_serde_name() {
        let json = serde_json::to_string(&UpdateType::MessageCallback).unwrap();
        assert_eq!(json, "\"message_callback\"");
    }

    #[test]
    fn test_boxed_event_downcast() {
        let event = BoxedEvent::new(MessageCreated::text(10, 20, "hi"));
        assert!(event.is::<MessageCreated>());
        assert!(!event.is::<BotStarted>());
        assert_eq!(event.downcast_ref::<MessageCreated>().unwrap().message.body.text.as_deref(), Some("hi"));
        assert_eq!(event.text(), Some("hi"));
    }

    #[tokio::test]
    async fn test_answer_without_client_is_not_connected() {
        let event = BoxedEvent::new(MessageCreated::text(10, 20, "hi"));
        let err = event.answer("pong").await.unwrap_err();
        assert!(matches!(err, ApiError::NotConnected));
    }
}

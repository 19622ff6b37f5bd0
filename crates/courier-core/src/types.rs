//! Typed payloads for the update kinds the engine works with directly.
//!
//! Decoding wire payloads into these types is the transport's job; the
//! structs derive `Deserialize` so a transport can do it with `serde_json`.
//! Kinds without a dedicated struct travel as [`RawUpdate`].

use std::any::Any;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::{Event, UpdateType};

/// A platform user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
}

impl User {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }
}

/// Where a message was posted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    #[serde(default)]
    pub chat_id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub chat_type: Option<String>,
}

/// Message content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    pub mid: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// A message as seen by the bot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub sender: Option<User>,
    pub recipient: Recipient,
    pub body: MessageBody,
    #[serde(default)]
    pub timestamp: i64,
}

/// An inline-button press.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Callback {
    pub callback_id: String,
    #[serde(default)]
    pub payload: Option<String>,
    pub user: User,
    #[serde(default)]
    pub timestamp: i64,
}

// ============================================================================
// Events
// ============================================================================

/// A new message was posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCreated {
    pub message: Message,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub user_locale: Option<String>,
}

impl MessageCreated {
    /// Builds a plain text message from `user_id` in `chat_id`.
    pub fn text(chat_id: i64, user_id: i64, text: impl Into<String>) -> Self {
        Self {
            message: Message {
                sender: Some(User::new(user_id)),
                recipient: Recipient {
                    chat_id: Some(chat_id),
                    user_id: None,
                    chat_type: None,
                },
                body: MessageBody {
                    mid: String::new(),
                    text: Some(text.into()),
                },
                timestamp: 0,
            },
            timestamp: 0,
            user_locale: None,
        }
    }
}

impl Event for MessageCreated {
    fn update_type(&self) -> UpdateType {
        UpdateType::MessageCreated
    }

    fn chat_id(&self) -> Option<i64> {
        self.message.recipient.chat_id
    }

    fn user_id(&self) -> Option<i64> {
        self.message.sender.as_ref().map(|u| u.user_id)
    }

    fn text(&self) -> Option<&str> {
        self.message.body.text.as_deref()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A user pressed an inline button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCallback {
    pub callback: Callback,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub timestamp: i64,
}

impl Event for MessageCallback {
    fn update_type(&self) -> UpdateType {
        UpdateType::MessageCallback
    }

    fn chat_id(&self) -> Option<i64> {
        self.message.as_ref().and_then(|m| m.recipient.chat_id)
    }

    fn user_id(&self) -> Option<i64> {
        Some(self.callback.user.user_id)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A user started a dialog with the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotStarted {
    pub chat_id: i64,
    pub user: User,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
}

impl Event for BotStarted {
    fn update_type(&self) -> UpdateType {
        UpdateType::BotStarted
    }

    fn chat_id(&self) -> Option<i64> {
        Some(self.chat_id)
    }

    fn user_id(&self) -> Option<i64> {
        Some(self.user.user_id)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The bot was added to a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotAdded {
    pub chat_id: i64,
    pub user: User,
    #[serde(default)]
    pub is_channel: bool,
    #[serde(default)]
    pub timestamp: i64,
}

impl Event for BotAdded {
    fn update_type(&self) -> UpdateType {
        UpdateType::BotAdded
    }

    fn chat_id(&self) -> Option<i64> {
        Some(self.chat_id)
    }

    fn user_id(&self) -> Option<i64> {
        Some(self.user.user_id)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Any update kind without a dedicated payload type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawUpdate {
    pub update_type: UpdateType,
    #[serde(default)]
    pub chat_id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub payload: Value,
}

impl RawUpdate {
    pub fn new(update_type: UpdateType) -> Self {
        Self {
            update_type,
            chat_id: None,
            user_id: None,
            payload: Value::Null,
        }
    }
}

impl Event for RawUpdate {
    fn update_type(&self) -> UpdateType {
        self.update_type
    }

    fn chat_id(&self) -> Option<i64> {
        self.chat_id
    }

    fn user_id(&self) -> Option<i64> {
        self.user_id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

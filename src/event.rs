//! Inbound conversational events
//!
//! Transport-neutral representation of what the chat platform delivers.
//! Everything downstream (filters, handlers, templates) reads events through
//! this type only.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Conversation identifier shared by the state and context stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl ChatId {
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Sender of an event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub language_code: String,
}

/// One inbound event for one conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub chat_id: ChatId,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Payload variants the engine knows how to route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// Plain chat message
    Message { message_id: i64, text: String },
    /// Inline keyboard button press
    Callback {
        callback_id: String,
        data: String,
        /// Message the keyboard was attached to
        message_id: Option<i64>,
    },
    /// Payment confirmation request, must be answered
    PreCheckout {
        query_id: String,
        invoice_payload: String,
    },
    /// Completed payment notification
    SuccessfulPayment {
        message_id: i64,
        invoice_payload: String,
    },
    /// Synthetic event for handlers invoked through the HTTP surface
    Api {
        handler_id: String,
        #[serde(default)]
        params: BTreeMap<String, String>,
    },
}

impl Event {
    pub fn message(chat_id: impl Into<ChatId>, message_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            from: None,
            kind: EventKind::Message {
                message_id,
                text: text.into(),
            },
        }
    }

    pub fn callback(
        chat_id: impl Into<ChatId>,
        callback_id: impl Into<String>,
        data: impl Into<String>,
        message_id: Option<i64>,
    ) -> Self {
        Self {
            chat_id: chat_id.into(),
            from: None,
            kind: EventKind::Callback {
                callback_id: callback_id.into(),
                data: data.into(),
                message_id,
            },
        }
    }

    #[allow(dead_code)] // Used by transports that know the sender
    pub fn with_sender(mut self, user: User) -> Self {
        self.from = Some(user);
        self
    }

    /// Message text, if this is a message
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Message { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Bot command without the leading slash and `@botname` suffix
    pub fn command(&self) -> Option<&str> {
        let text = self.text()?;
        let token = text.split_whitespace().next()?;
        let command = token.strip_prefix('/')?;
        let command = command.split('@').next().unwrap_or(command);
        if command.is_empty() {
            None
        } else {
            Some(command)
        }
    }

    pub fn callback_data(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Callback { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Id of the message an edit or delete should target
    pub fn target_message_id(&self) -> Option<i64> {
        match &self.kind {
            EventKind::Message { message_id, .. }
            | EventKind::SuccessfulPayment { message_id, .. } => Some(*message_id),
            EventKind::Callback { message_id, .. } => *message_id,
            EventKind::PreCheckout { .. } | EventKind::Api { .. } => None,
        }
    }

    /// Event-derived attributes exposed to templates
    pub fn attributes(&self) -> BTreeMap<String, String> {
        let mut attrs = BTreeMap::new();
        attrs.insert("chat.id".to_string(), self.chat_id.to_string());
        match &self.kind {
            EventKind::Message { message_id, text } => {
                attrs.insert("message.id".to_string(), message_id.to_string());
                attrs.insert("message.text".to_string(), text.clone());
            }
            EventKind::Callback { data, message_id, .. } => {
                attrs.insert("callback.data".to_string(), data.clone());
                if let Some(id) = message_id {
                    attrs.insert("message.id".to_string(), id.to_string());
                }
            }
            EventKind::PreCheckout {
                invoice_payload, ..
            }
            | EventKind::SuccessfulPayment {
                invoice_payload, ..
            } => {
                attrs.insert("payment.payload".to_string(), invoice_payload.clone());
            }
            EventKind::Api { .. } => {}
        }
        if let Some(user) = &self.from {
            attrs.insert("user.id".to_string(), user.id.to_string());
            attrs.insert("user.is_bot".to_string(), user.is_bot.to_string());
            attrs.insert("user.first_name".to_string(), user.first_name.clone());
            attrs.insert("user.last_name".to_string(), user.last_name.clone());
            attrs.insert("user.username".to_string(), user.username.clone());
            attrs.insert("user.language_code".to_string(), user.language_code.clone());
        }
        attrs
    }
}

//! Normalized message content and inbound messages.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::ids::{ActorId, RoomId};

/// Payload of a message or memory: free text plus an optional action name.
///
/// Inbound payloads may be raw strings or JSON objects; [`Content::from_value`]
/// folds both into this single shape so downstream code never branches on the
/// runtime type of the payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    /// Human-readable text.
    #[serde(default)]
    pub text: String,
    /// Action requested alongside the text, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl Content {
    /// Creates text-only content.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: None,
        }
    }

    /// Sets the action name.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Returns `true` when there is no text to embed.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Normalizes a raw JSON payload.
    ///
    /// Strings become text-only content. Objects are read from `text`
    /// (falling back to `content`) and `action`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContent`] for arrays, numbers, booleans, or
    /// objects that carry neither a text field nor an action.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(text) => Ok(Self::text(text)),
            Value::Object(map) => {
                let text = map
                    .get("text")
                    .or_else(|| map.get("content"))
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                let action = map
                    .get("action")
                    .and_then(Value::as_str)
                    .filter(|name| !name.trim().is_empty())
                    .map(str::to_owned);
                if text.is_none() && action.is_none() {
                    return Err(Error::InvalidContent {
                        reason: "object payload requires `text`, `content`, or `action`".into(),
                    });
                }
                Ok(Self {
                    text: text.unwrap_or_default(),
                    action,
                })
            }
            Value::Null => Ok(Self::default()),
            other => Err(Error::InvalidContent {
                reason: format!("unsupported payload type: {other}"),
            }),
        }
    }
}

impl From<&str> for Content {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Self::text(value)
    }
}

/// Message delivered to the runtime by the surrounding transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Actor that sent the message.
    pub sender: ActorId,
    /// Agent the message is addressed to.
    pub agent: ActorId,
    /// Conversation scope.
    pub room_id: RoomId,
    /// Normalized payload.
    pub content: Content,
}

impl Message {
    /// Creates a message from `sender` to `agent` in `room_id`.
    #[must_use]
    pub fn new(
        sender: ActorId,
        agent: ActorId,
        room_id: RoomId,
        content: impl Into<Content>,
    ) -> Self {
        Self {
            sender,
            agent,
            room_id,
            content: content.into(),
        }
    }

    /// Returns the owner set used to scope memories for this message.
    #[must_use]
    pub fn participants(&self) -> BTreeSet<ActorId> {
        BTreeSet::from([self.sender, self.agent])
    }
}

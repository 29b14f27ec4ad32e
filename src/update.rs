use serde_json::Value;

use crate::engine::{AuthorizationState, ChatId};
use crate::protocol::{int64_value, type_name};

/// Typed view of an engine update record.
///
/// Only the pieces the session reacts to are kept. Records whose shape does
/// not match fall through to [`Update::Other`] instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// Any update addressed to a chat, with the text of the chat's latest
    /// message when the record carries one.
    Chat {
        chat_id: ChatId,
        last_message_text: Option<String>,
    },
    Authorization(AuthorizationState),
    Other {
        kind: String,
    },
}

impl Update {
    pub fn from_value(value: &Value) -> Self {
        let kind = type_name(value);
        if kind == "updateAuthorizationState" {
            if let Some(state) = value
                .pointer("/authorization_state/@type")
                .and_then(Value::as_str)
            {
                return Update::Authorization(AuthorizationState::from_type_name(state));
            }
        }

        match value.get("chat_id").and_then(int64_value) {
            Some(chat_id) => Update::Chat {
                chat_id,
                last_message_text: value
                    .pointer("/last_message/content/text/text")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            None => Update::Other {
                kind: kind.to_string(),
            },
        }
    }

    pub fn chat_id(&self) -> Option<ChatId> {
        match self {
            Update::Chat { chat_id, .. } => Some(*chat_id),
            _ => None,
        }
    }
}

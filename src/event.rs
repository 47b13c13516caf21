use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::message::model::Message;
use crate::{conversation, message, user};

pub type EventStream = Pin<Box<dyn Stream<Item = Event> + Send>>;

/// Push events delivered over the per-session broadcast subscription.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    NewMessage {
        message: Message,
    },
    MessageUpdated {
        conversation_id: conversation::Id,
        id: message::Id,
        content: String,
        edited: bool,
    },
    MessageDeleted {
        conversation_id: conversation::Id,
        id: message::Id,
    },
    ReactionAdded {
        conversation_id: conversation::Id,
        message_id: message::Id,
        emoji: String,
        user_id: user::Id,
    },
    ReactionRemoved {
        conversation_id: conversation::Id,
        message_id: message::Id,
        emoji: String,
        user_id: user::Id,
    },
    TypingStarted {
        conversation_id: conversation::Id,
        user_id: user::Id,
        display_name: String,
    },
    TypingStopped {
        conversation_id: conversation::Id,
        user_id: user::Id,
    },
}

impl Event {
    pub fn conversation_id(&self) -> &conversation::Id {
        match self {
            Self::NewMessage { message } => &message.conversation_id,
            Self::MessageUpdated {
                conversation_id, ..
            }
            | Self::MessageDeleted {
                conversation_id, ..
            }
            | Self::ReactionAdded {
                conversation_id, ..
            }
            | Self::ReactionRemoved {
                conversation_id, ..
            }
            | Self::TypingStarted {
                conversation_id, ..
            }
            | Self::TypingStopped {
                conversation_id, ..
            } => conversation_id,
        }
    }
}

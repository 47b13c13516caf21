use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{content, conversation, user};

use super::Id;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Message {
    pub id: Id,
    pub conversation_id: conversation::Id,
    pub author: user::Id,
    pub content: String,
    pub kind: content::Kind,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub edited: bool,
    #[serde(default)]
    pub reactions: HashMap<String, HashSet<user::Id>>,
}

impl Message {
    pub fn new(
        conversation_id: conversation::Id,
        author: user::Id,
        content: &content::Content,
    ) -> Self {
        Self {
            id: Id::random(),
            conversation_id,
            author,
            content: content::encode(content),
            kind: content.kind(),
            created_at: Utc::now(),
            edited: false,
            reactions: HashMap::new(),
        }
    }

    /// Sort key for the conversation log. Stable across pagination and
    /// realtime merges; ties on the timestamp break on the id.
    pub fn order_key(&self) -> (DateTime<Utc>, Id) {
        (self.created_at, self.id)
    }

    pub fn decode(&self) -> content::Content {
        content::decode(Some(self.kind), &self.content)
    }

    /// Adds `user_id` to the emoji's reaction set. Returns false when the
    /// membership already existed.
    pub fn add_reaction(&mut self, emoji: &str, user_id: user::Id) -> bool {
        self.reactions
            .entry(emoji.to_string())
            .or_default()
            .insert(user_id)
    }

    pub fn remove_reaction(&mut self, emoji: &str, user_id: &user::Id) -> bool {
        let Some(users) = self.reactions.get_mut(emoji) else {
            return false;
        };

        let removed = users.remove(user_id);
        if users.is_empty() {
            self.reactions.remove(emoji);
        }
        removed
    }
}

/// Denormalized tail of a conversation, shown in the sidebar list.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct LastMessage {
    pub id: Id,
    pub author: user::Id,
    pub kind: content::Kind,
    pub preview: String,
    pub at: DateTime<Utc>,
}

impl From<&Message> for LastMessage {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            author: message.author,
            kind: message.kind,
            preview: message.decode().preview(),
            at: message.created_at,
        }
    }
}

/// One backwards page of history, oldest-first within the page.
#[derive(Clone, Debug, Default)]
pub struct Page {
    pub messages: Vec<Message>,
    pub has_more: bool,
}

/// Oldest loaded row of a conversation; the boundary for the next
/// backwards fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    pub id: Id,
}

impl From<&Message> for Cursor {
    fn from(message: &Message) -> Self {
        Self {
            created_at: message.created_at,
            id: message.id,
        }
    }
}

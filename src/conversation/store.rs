use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use tokio::sync::RwLock;

use crate::content;
use crate::integration::Backend;
use crate::message;
use crate::message::model::{LastMessage, Message};
use crate::user;

use super::model::Conversation;
use super::Id;

/// The session's conversation set: recency ordering, unread counters and
/// last-message previews. Owns the list exclusively; realtime bookkeeping
/// runs here even when a message lands outside a loaded history window.
pub struct ConversationStore {
    backend: Backend,
    me: user::Id,
    conversations: RwLock<HashMap<Id, Conversation>>,
    // message ids already counted, so re-delivered inserts are no-ops
    seen: RwLock<HashSet<message::Id>>,
}

impl ConversationStore {
    pub fn new(backend: Backend, me: user::Id) -> Self {
        Self {
            backend,
            me,
            conversations: RwLock::new(HashMap::new()),
            seen: RwLock::new(HashSet::new()),
        }
    }

    pub async fn load(&self) -> super::Result<()> {
        let fetched = self.backend.fetch_conversations().await?;

        let mut conversations = self.conversations.write().await;
        conversations.clear();
        for conversation in fetched {
            if conversation.participants.is_empty() {
                warn!("skipping conversation without participants: {}", conversation.id);
                continue;
            }
            conversations.insert(conversation.id, conversation);
        }
        Ok(())
    }
}

impl ConversationStore {
    /// Conversations ordered by most recent activity first.
    pub async fn list(&self) -> Vec<Conversation> {
        let conversations = self.conversations.read().await;
        let mut list: Vec<Conversation> = conversations.values().cloned().collect();
        list.sort_by(|a, b| {
            b.last_message_at()
                .cmp(&a.last_message_at())
                .then_with(|| a.title.cmp(&b.title))
                .then_with(|| a.id.cmp(&b.id))
        });
        list
    }

    pub async fn get(&self, id: &Id) -> Option<Conversation> {
        self.conversations.read().await.get(id).cloned()
    }

    /// Total unread badge across all conversations. Muted conversations
    /// still count; hiding them is a presentation concern.
    pub async fn total_unread(&self) -> u32 {
        self.conversations
            .read()
            .await
            .values()
            .map(|c| c.unread_count)
            .sum()
    }

    pub async fn mark_read(&self, id: &Id) -> super::Result<()> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations.get_mut(id).ok_or(super::Error::NotFound(*id))?;
        conversation.unread_count = 0;
        Ok(())
    }

    pub async fn set_muted(&self, id: &Id, muted: bool) -> super::Result<()> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations.get_mut(id).ok_or(super::Error::NotFound(*id))?;
        conversation.muted = muted;
        Ok(())
    }

    pub async fn check_participant(&self, id: &Id, user_id: &user::Id) -> super::Result<()> {
        let conversations = self.conversations.read().await;
        let conversation = conversations.get(id).ok_or(super::Error::NotFound(*id))?;

        if !conversation.has_participant(user_id) {
            return Err(super::Error::NotParticipant(*user_id));
        }
        Ok(())
    }
}

impl ConversationStore {
    /// Records an arriving message: bumps the preview and recency, counts it
    /// unread unless it is the session user's own. Runs for every insert,
    /// whether or not the message log spliced it.
    pub async fn apply_new_message(&self, message: &Message) {
        if !self.seen.write().await.insert(message.id) {
            debug!("skipping already-counted message: {}", message.id);
            return;
        }

        let mut conversations = self.conversations.write().await;
        let Some(conversation) = conversations.get_mut(&message.conversation_id) else {
            debug!(
                "skipping message for unknown conversation: {}",
                message.conversation_id
            );
            return;
        };

        let newer = conversation
            .last_message
            .as_ref()
            .is_none_or(|last| (last.at, last.id) < message.order_key());
        if newer {
            conversation.last_message = Some(LastMessage::from(message));
        }

        if message.author != self.me {
            conversation.unread_count += 1;
        }
    }

    /// Refreshes the sidebar preview when the conversation's latest message
    /// was edited or patched in place.
    pub async fn apply_update(&self, id: &Id, message_id: &message::Id, content: &str) {
        let mut conversations = self.conversations.write().await;
        let Some(conversation) = conversations.get_mut(id) else {
            return;
        };
        let Some(last) = conversation.last_message.as_mut() else {
            return;
        };

        if last.id == *message_id {
            last.preview = content::decode(Some(last.kind), content).preview();
        }
    }
}

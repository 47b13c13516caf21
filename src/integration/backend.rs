use std::sync::Arc;

use async_trait::async_trait;

use crate::conversation::model::Conversation;
use crate::event::EventStream;
use crate::message::model::{Cursor, Message, Page};
use crate::{conversation, message, user};

pub type Backend = Arc<dyn BackendClient + Send + Sync>;

/// The managed query/push service this engine synchronizes against. Paginated
/// history runs backwards from the cursor; the subscription delivers every
/// insert/update/reaction/typing event for the session's conversations.
#[async_trait]
pub trait BackendClient {
    async fn fetch_conversations(&self) -> super::Result<Vec<Conversation>>;

    async fn fetch_page(
        &self,
        conversation_id: &conversation::Id,
        before: Option<&Cursor>,
        limit: usize,
    ) -> super::Result<Page>;

    /// Persists a client-built message row. The returned row is authoritative:
    /// the server assigns the durable id and timestamp.
    async fn create_message(&self, message: &Message) -> super::Result<Message>;

    async fn update_content(&self, id: &message::Id, content: &str) -> super::Result<()>;

    async fn delete_message(&self, id: &message::Id) -> super::Result<()>;

    async fn add_reaction(
        &self,
        id: &message::Id,
        emoji: &str,
        user_id: &user::Id,
    ) -> super::Result<()>;

    async fn remove_reaction(
        &self,
        id: &message::Id,
        emoji: &str,
        user_id: &user::Id,
    ) -> super::Result<()>;

    async fn subscribe(&self) -> super::Result<EventStream>;

    async fn broadcast_typing(
        &self,
        conversation_id: &conversation::Id,
        user_id: &user::Id,
        display_name: &str,
        typing: bool,
    ) -> super::Result<()>;
}

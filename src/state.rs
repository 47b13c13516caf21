use std::sync::Arc;

use futures::StreamExt;
use log::debug;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::conversation::store::ConversationStore;
use crate::event::{Event, EventStream};
use crate::integration::{Backend, Config, Polls, Storage};
use crate::message::model::Page;
use crate::message::store::MessageStore;
use crate::presence::PresenceChannel;
use crate::send::service::SendService;
use crate::user::UserInfo;
use crate::{conversation, integration, message};

type Result<T> = std::result::Result<T, Error>;

/// Everything the engine owns for one authenticated session. Built once at
/// login, injected into consumers, torn down at logout; no ambient state.
pub struct Session {
    pub conversations: Arc<ConversationStore>,
    pub messages: Arc<MessageStore>,
    pub sends: Arc<SendService>,
    pub presence: Arc<PresenceChannel>,
    cancel: CancellationToken,
    dispatch: JoinHandle<()>,
}

impl Session {
    pub async fn init(
        me: UserInfo,
        backend: Backend,
        storage: Storage,
        polls: Polls,
        config: Config,
    ) -> Result<Self> {
        let conversations = Arc::new(ConversationStore::new(backend.clone(), me.id));
        conversations.load().await?;

        let messages = Arc::new(MessageStore::new(backend.clone(), config.page_size));
        let presence = Arc::new(PresenceChannel::new(
            backend.clone(),
            me.id,
            me.name.clone(),
            config.typing_expiry,
            config.typing_broadcast_window,
        ));
        let sends = Arc::new(SendService::new(
            backend.clone(),
            storage,
            polls,
            messages.clone(),
            conversations.clone(),
            me.id,
            config.max_upload_bytes,
        ));

        let stream = backend.subscribe().await?;
        let cancel = CancellationToken::new();
        let dispatch = tokio::spawn(dispatch_loop(
            stream,
            conversations.clone(),
            messages.clone(),
            presence.clone(),
            cancel.clone(),
            config.typing_expiry,
        ));

        Ok(Self {
            conversations,
            messages,
            sends,
            presence,
            cancel,
            dispatch,
        })
    }

    /// Loads the most recent history page and clears the unread counter.
    pub async fn open(&self, conversation_id: &conversation::Id) -> message::Result<Page> {
        let page = self.messages.load_initial(conversation_id).await?;
        if let Err(e) = self.conversations.mark_read(conversation_id).await {
            debug!("could not mark {conversation_id} read: {e}");
        }
        Ok(page)
    }

    /// Drops the conversation's loaded window; a page load still in flight is
    /// cancelled rather than applied late.
    pub async fn close_conversation(&self, conversation_id: &conversation::Id) {
        self.messages.close(conversation_id).await;
    }

    pub async fn close(&self) {
        self.cancel.cancel();
        self.presence.reset().await;
        self.dispatch.abort();
    }
}

async fn dispatch_loop(
    mut stream: EventStream,
    conversations: Arc<ConversationStore>,
    messages: Arc<MessageStore>,
    presence: Arc<PresenceChannel>,
    cancel: CancellationToken,
    sweep_every: std::time::Duration,
) {
    let mut sweep = tokio::time::interval(sweep_every);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sweep.tick() => presence.sweep().await,
            item = stream.next() => match item {
                None => {
                    debug!("event stream closed");
                    break;
                }
                Some(event) => route(event, &conversations, &messages, &presence).await,
            }
        }
    }
}

async fn route(
    event: Event,
    conversations: &ConversationStore,
    messages: &MessageStore,
    presence: &PresenceChannel,
) {
    match &event {
        Event::NewMessage { message } => {
            // the log may not splice a gap insert, but the conversation's
            // preview and unread truth are recorded either way
            messages.apply(&event).await;
            conversations.apply_new_message(message).await;
        }
        Event::MessageUpdated {
            conversation_id,
            id,
            content,
            ..
        } => {
            messages.apply(&event).await;
            conversations.apply_update(conversation_id, id, content).await;
        }
        Event::MessageDeleted { .. }
        | Event::ReactionAdded { .. }
        | Event::ReactionRemoved { .. } => {
            messages.apply(&event).await;
        }
        Event::TypingStarted { .. } | Event::TypingStopped { .. } => {
            presence.apply(&event).await;
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    _Conversation(#[from] conversation::Error),
    #[error(transparent)]
    _Integration(#[from] integration::Error),
}

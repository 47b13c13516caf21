use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use tokio::sync::RwLock;

use crate::content::{self, Content, FileMeta, PollRef};
use crate::conversation::store::ConversationStore;
use crate::event::Event;
use crate::integration::polls::{self, PollDraft, TallyStream};
use crate::integration::{Backend, Polls, Storage};
use crate::message::model::Message;
use crate::message::store::MessageStore;
use crate::{conversation, message, user};

use super::model::{FileUpload, Payload, PendingSend, SagaState, Status};

const ALLOWED_MIME_PREFIXES: [&str; 3] = ["image/", "audio/", "video/"];
const ALLOWED_MIME_TYPES: [&str; 4] = [
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
];

/// Orchestrates outgoing writes: optimistic insert, validation, upload,
/// persistence and reconciliation. Failures stay visible; nothing retries on
/// its own.
pub struct SendService {
    backend: Backend,
    storage: Storage,
    polls: Polls,
    messages: Arc<MessageStore>,
    conversations: Arc<ConversationStore>,
    me: user::Id,
    max_upload_bytes: u64,
    pending: RwLock<HashMap<message::Id, PendingSend>>,
}

impl SendService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: Backend,
        storage: Storage,
        polls: Polls,
        messages: Arc<MessageStore>,
        conversations: Arc<ConversationStore>,
        me: user::Id,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            backend,
            storage,
            polls,
            messages,
            conversations,
            me,
            max_upload_bytes,
            pending: RwLock::new(HashMap::new()),
        }
    }
}

impl SendService {
    pub async fn send_text(
        &self,
        conversation_id: &conversation::Id,
        text: &str,
    ) -> super::Result<message::Id> {
        self.conversations
            .check_participant(conversation_id, &self.me)
            .await?;

        let content = Content::Text(text.to_string());
        let message = Message::new(*conversation_id, self.me, &content);
        let temp_id = message.id;

        self.track(PendingSend::new(
            temp_id,
            *conversation_id,
            Payload::Text {
                text: text.to_string(),
            },
        ))
        .await;
        self.insert_optimistic(&message).await;

        self.persist(temp_id, message).await
    }

    /// Validates and sends each file independently. One oversized or
    /// disallowed file fails alone; the rest still go out.
    pub async fn send_attachments(
        &self,
        conversation_id: &conversation::Id,
        files: Vec<FileUpload>,
    ) -> super::Result<Vec<super::Result<message::Id>>> {
        self.conversations
            .check_participant(conversation_id, &self.me)
            .await?;

        let mut results = Vec::with_capacity(files.len());
        for file in files {
            results.push(self.send_attachment(conversation_id, file).await);
        }
        Ok(results)
    }

    async fn send_attachment(
        &self,
        conversation_id: &conversation::Id,
        file: FileUpload,
    ) -> super::Result<message::Id> {
        // rejected before any optimistic mutation
        self.validate(&file)?;

        let mime = file.resolved_mime();
        let meta = FileMeta {
            url: String::new(),
            filename: Some(file.filename.clone()),
            size: Some(file.size()),
            file_type: Some(mime.clone()),
            duration: None,
            title: None,
        };
        let message = Message::new(*conversation_id, self.me, &Content::File(meta));
        let temp_id = message.id;

        self.track(PendingSend::new(
            temp_id,
            *conversation_id,
            Payload::File { file: file.clone() },
        ))
        .await;
        self.insert_optimistic(&message).await;

        let stored = match self
            .storage
            .upload(&file.filename, file.bytes.clone(), &mime, conversation_id)
            .await
        {
            Ok(stored) => stored,
            Err(e) => return self.fail(temp_id, e.into()).await,
        };

        let meta = FileMeta {
            url: stored.url,
            filename: Some(stored.filename),
            size: Some(stored.size),
            file_type: Some(stored.mime_type),
            duration: None,
            title: None,
        };
        let mut message = message;
        message.content = content::encode(&Content::File(meta));
        self.messages
            .patch(conversation_id, &temp_id, &message.content, false)
            .await;

        self.persist(temp_id, message).await
    }

    pub async fn send_voice(
        &self,
        conversation_id: &conversation::Id,
        blob: Bytes,
    ) -> super::Result<message::Id> {
        self.conversations
            .check_participant(conversation_id, &self.me)
            .await?;

        let size = blob.len() as u64;
        if size > self.max_upload_bytes {
            return Err(super::Error::FileTooLarge {
                name: "voice message".into(),
                size,
                limit: self.max_upload_bytes,
            });
        }

        let meta = FileMeta {
            url: String::new(),
            size: Some(size),
            file_type: Some("audio/webm".into()),
            ..FileMeta::default()
        };
        let message = Message::new(*conversation_id, self.me, &Content::File(meta));
        let temp_id = message.id;

        self.track(PendingSend::new(
            temp_id,
            *conversation_id,
            Payload::Voice { blob: blob.clone() },
        ))
        .await;
        self.insert_optimistic(&message).await;

        let stored = match self.storage.upload_audio(blob, conversation_id).await {
            Ok(stored) => stored,
            Err(e) => return self.fail(temp_id, e.into()).await,
        };

        let meta = FileMeta {
            url: stored.url,
            size: Some(size),
            file_type: Some("audio/webm".into()),
            duration: Some(stored.duration),
            ..FileMeta::default()
        };
        let mut message = message;
        message.content = content::encode(&Content::File(meta));
        self.messages
            .patch(conversation_id, &temp_id, &message.content, false)
            .await;

        self.persist(temp_id, message).await
    }
}

impl SendService {
    /// Three strictly-sequential steps: the placeholder message, the poll
    /// entity referencing it, the content patch to the poll id. Interruption
    /// past step one triggers the compensating delete of the placeholder; an
    /// orphan that survives compensation is flagged, never hidden.
    pub async fn send_poll(
        &self,
        conversation_id: &conversation::Id,
        question: &str,
        options: &[String],
        allow_multiple: bool,
        expires_at: Option<DateTime<Utc>>,
    ) -> super::Result<message::Id> {
        self.conversations
            .check_participant(conversation_id, &self.me)
            .await?;
        if options.len() < 2 {
            return Err(super::Error::NotEnoughPollOptions(options.len()));
        }

        let placeholder = Content::Poll(PollRef::Placeholder(format!("Poll: {question}")));
        let message = Message::new(*conversation_id, self.me, &placeholder);
        let temp_id = message.id;

        self.track(PendingSend::new(
            temp_id,
            *conversation_id,
            Payload::Poll {
                question: question.to_string(),
                options: options.to_vec(),
                allow_multiple,
                expires_at,
            },
        ))
        .await;
        self.insert_optimistic(&message).await;

        let confirmed = match self.backend.create_message(&message).await {
            Ok(confirmed) => confirmed,
            Err(e) => return self.fail(temp_id, e.into()).await,
        };
        self.conversations.apply_new_message(&confirmed).await;
        if let Err(e) = self.messages.reconcile(&temp_id, confirmed.clone()).await {
            debug!("poll placeholder {} lost its local row: {e}", confirmed.id);
        }

        let draft = PollDraft {
            question: question.to_string(),
            options: options.to_vec(),
            allow_multiple,
            expires_at,
            message_id: confirmed.id,
        };
        self.commit_poll(temp_id, confirmed.id, *conversation_id, &draft)
            .await
    }

    async fn commit_poll(
        &self,
        temp_id: message::Id,
        placeholder: message::Id,
        conversation_id: conversation::Id,
        draft: &PollDraft,
    ) -> super::Result<message::Id> {
        let poll_id = match self.polls.create(draft).await {
            Ok(id) => id,
            Err(e) => {
                return self
                    .compensate_poll(
                        temp_id,
                        placeholder,
                        conversation_id,
                        SagaState::PlaceholderCreated,
                        e,
                    )
                    .await;
            }
        };

        let content = poll_id.to_string();
        if let Err(e) = self.backend.update_content(&placeholder, &content).await {
            return self
                .compensate_poll(
                    temp_id,
                    placeholder,
                    conversation_id,
                    SagaState::PollCreated,
                    e,
                )
                .await;
        }

        self.messages
            .patch(&conversation_id, &placeholder, &content, false)
            .await;
        self.conversations
            .apply_update(&conversation_id, &placeholder, &content)
            .await;
        self.set_status(&temp_id, Status::Confirmed).await;
        debug!("poll {poll_id} committed onto message {placeholder}");

        Ok(placeholder)
    }

    async fn compensate_poll(
        &self,
        temp_id: message::Id,
        placeholder: message::Id,
        conversation_id: conversation::Id,
        state: SagaState,
        cause: crate::integration::Error,
    ) -> super::Result<message::Id> {
        warn!("poll commit interrupted at {state:?}: {cause}");

        match self.backend.delete_message(&placeholder).await {
            Ok(()) => {
                self.messages.remove(&conversation_id, &placeholder).await;
            }
            Err(e) => {
                warn!("could not remove orphaned placeholder {placeholder}: {e}");
                let mut pending = self.pending.write().await;
                if let Some(entry) = pending.get_mut(&temp_id) {
                    entry.orphaned_placeholder = Some(placeholder);
                }
            }
        }

        self.set_status(
            &temp_id,
            Status::Failed {
                reason: cause.to_string(),
            },
        )
        .await;

        Err(super::Error::PollCommitInterrupted { state, placeholder })
    }

    pub async fn vote(&self, poll_id: &polls::Id, option: usize) -> super::Result<()> {
        self.polls.vote(poll_id, option).await.map_err(Into::into)
    }

    pub async fn subscribe_tally(&self, poll_id: &polls::Id) -> super::Result<TallyStream> {
        self.polls
            .subscribe_tally(poll_id)
            .await
            .map_err(Into::into)
    }
}

impl SendService {
    pub async fn edit(
        &self,
        conversation_id: &conversation::Id,
        id: &message::Id,
        text: &str,
    ) -> super::Result<()> {
        let message = self
            .messages
            .find(conversation_id, id)
            .await
            .ok_or(message::Error::NotFound(*id))?;
        if message.author != self.me {
            return Err(super::Error::NotAuthor);
        }

        self.backend.update_content(id, text).await?;
        self.messages.patch(conversation_id, id, text, true).await;
        self.conversations
            .apply_update(conversation_id, id, text)
            .await;
        Ok(())
    }

    pub async fn delete(
        &self,
        conversation_id: &conversation::Id,
        id: &message::Id,
    ) -> super::Result<()> {
        let message = self
            .messages
            .find(conversation_id, id)
            .await
            .ok_or(message::Error::NotFound(*id))?;
        if message.author != self.me {
            return Err(super::Error::NotAuthor);
        }

        self.backend.delete_message(id).await?;
        self.messages.remove(conversation_id, id).await;
        Ok(())
    }

    pub async fn react(
        &self,
        conversation_id: &conversation::Id,
        message_id: &message::Id,
        emoji: &str,
    ) -> super::Result<()> {
        let event = Event::ReactionAdded {
            conversation_id: *conversation_id,
            message_id: *message_id,
            emoji: emoji.to_string(),
            user_id: self.me,
        };
        self.messages.apply(&event).await;

        if let Err(e) = self.backend.add_reaction(message_id, emoji, &self.me).await {
            let revert = Event::ReactionRemoved {
                conversation_id: *conversation_id,
                message_id: *message_id,
                emoji: emoji.to_string(),
                user_id: self.me,
            };
            self.messages.apply(&revert).await;
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn unreact(
        &self,
        conversation_id: &conversation::Id,
        message_id: &message::Id,
        emoji: &str,
    ) -> super::Result<()> {
        let event = Event::ReactionRemoved {
            conversation_id: *conversation_id,
            message_id: *message_id,
            emoji: emoji.to_string(),
            user_id: self.me,
        };
        self.messages.apply(&event).await;

        self.backend
            .remove_reaction(message_id, emoji, &self.me)
            .await
            .map_err(Into::into)
    }
}

impl SendService {
    /// Re-runs a failed send under its original client id, so reconciliation
    /// cannot apply twice.
    pub async fn retry(&self, temp_id: &message::Id) -> super::Result<message::Id> {
        let entry = {
            let pending = self.pending.read().await;
            pending
                .get(temp_id)
                .cloned()
                .ok_or(super::Error::UnknownPending(*temp_id))?
        };
        if !entry.status.is_failed() {
            return Err(super::Error::NotFailed(*temp_id));
        }

        match entry.payload {
            Payload::Text { .. } | Payload::File { .. } | Payload::Voice { .. } => {
                let message = self
                    .messages
                    .find(&entry.conversation_id, temp_id)
                    .await
                    .ok_or(super::Error::NotRetryable(*temp_id))?;
                self.set_status(temp_id, Status::Sending).await;
                self.persist(*temp_id, message).await
            }
            Payload::Poll {
                question,
                options,
                allow_multiple,
                expires_at,
            } => {
                // resume from the surviving placeholder when one is flagged
                let Some(placeholder) = entry.orphaned_placeholder else {
                    return Err(super::Error::NotRetryable(*temp_id));
                };
                self.set_status(temp_id, Status::Sending).await;
                self.clear_orphan(temp_id).await;
                let draft = PollDraft {
                    question,
                    options,
                    allow_multiple,
                    expires_at,
                    message_id: placeholder,
                };
                self.commit_poll(*temp_id, placeholder, entry.conversation_id, &draft)
                    .await
            }
        }
    }

    /// Drops a pending record and its optimistic row. The explicit way to
    /// discard a failure.
    pub async fn dismiss(&self, temp_id: &message::Id) -> super::Result<()> {
        let entry = {
            let mut pending = self.pending.write().await;
            pending
                .remove(temp_id)
                .ok_or(super::Error::UnknownPending(*temp_id))?
        };

        if entry.status != Status::Confirmed {
            self.messages
                .remove(&entry.conversation_id, temp_id)
                .await;
        }
        Ok(())
    }

    pub async fn pending(&self, conversation_id: &conversation::Id) -> Vec<PendingSend> {
        let pending = self.pending.read().await;
        let mut entries: Vec<PendingSend> = pending
            .values()
            .filter(|p| p.conversation_id == *conversation_id)
            .cloned()
            .collect();
        entries.sort_by_key(|p| p.temp_id);
        entries
    }

    pub async fn pending_by_id(&self, temp_id: &message::Id) -> Option<PendingSend> {
        self.pending.read().await.get(temp_id).cloned()
    }
}

impl SendService {
    fn validate(&self, file: &FileUpload) -> super::Result<()> {
        let mime = file.resolved_mime();
        let allowed = ALLOWED_MIME_PREFIXES
            .iter()
            .any(|prefix| mime.starts_with(prefix))
            || ALLOWED_MIME_TYPES.contains(&mime.as_str());
        if !allowed {
            return Err(super::Error::UnsupportedFileType(mime));
        }

        if file.size() > self.max_upload_bytes {
            return Err(super::Error::FileTooLarge {
                name: file.filename.clone(),
                size: file.size(),
                limit: self.max_upload_bytes,
            });
        }
        Ok(())
    }

    async fn insert_optimistic(&self, message: &Message) {
        self.messages.insert_optimistic(message.clone()).await;
        // preview and recency bump immediately; own sends never count unread
        self.conversations.apply_new_message(message).await;
    }

    async fn persist(&self, temp_id: message::Id, message: Message) -> super::Result<message::Id> {
        match self.backend.create_message(&message).await {
            Ok(confirmed) => {
                let id = confirmed.id;
                self.conversations.apply_new_message(&confirmed).await;
                // a window closed mid-send drops the local row, not the send
                if let Err(e) = self.messages.reconcile(&temp_id, confirmed).await {
                    debug!("confirmed {id} without a local row to migrate: {e}");
                }
                self.set_status(&temp_id, Status::Confirmed).await;
                Ok(id)
            }
            Err(e) => self.fail(temp_id, e.into()).await,
        }
    }

    async fn fail(
        &self,
        temp_id: message::Id,
        error: super::Error,
    ) -> super::Result<message::Id> {
        warn!("send {temp_id} failed: {error}");
        self.set_status(
            &temp_id,
            Status::Failed {
                reason: error.to_string(),
            },
        )
        .await;
        Err(error)
    }

    async fn track(&self, entry: PendingSend) {
        self.pending.write().await.insert(entry.temp_id, entry);
    }

    async fn set_status(&self, temp_id: &message::Id, status: Status) {
        if let Some(entry) = self.pending.write().await.get_mut(temp_id) {
            entry.status = status;
        }
    }

    async fn clear_orphan(&self, temp_id: &message::Id) {
        if let Some(entry) = self.pending.write().await.get_mut(temp_id) {
            entry.orphaned_placeholder = None;
        }
    }
}

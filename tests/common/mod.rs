#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use conversation_sync::content::Content;
use conversation_sync::conversation::model::Conversation;
use conversation_sync::conversation::{self, Kind};
use conversation_sync::event::{Event, EventStream};
use conversation_sync::integration::backend::BackendClient;
use conversation_sync::integration::polls::{self, PollBackend, PollDraft, Tally, TallyStream};
use conversation_sync::integration::storage::{FileStorage, StoredAudio, StoredFile};
use conversation_sync::integration::{self, Backend, Polls, Storage};
use conversation_sync::message::model::{Cursor, Message, Page};
use conversation_sync::{message, user};

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn text_message(
    conversation_id: conversation::Id,
    author: user::Id,
    text: &str,
    created_at: DateTime<Utc>,
) -> Message {
    let mut message = Message::new(conversation_id, author, &Content::Text(text.into()));
    message.created_at = created_at;
    message
}

pub fn direct_conversation(me: user::Id, other: user::Id) -> Conversation {
    Conversation {
        id: conversation::Id::random(),
        kind: Kind::Direct,
        title: "direct".into(),
        icon: None,
        participants: [me, other].into_iter().collect(),
        last_message: None,
        unread_count: 0,
        muted: false,
        created_by: me,
        allow_member_invites: false,
    }
}

#[derive(Default)]
pub struct TestBackend {
    pub rows: Mutex<Vec<Message>>,
    pub conversations: Mutex<Vec<Conversation>>,
    pub created: Mutex<Vec<Message>>,
    pub typing: Mutex<Vec<(conversation::Id, user::Id, bool)>>,
    pub page_delay: Mutex<Option<Duration>>,
    fail_create: AtomicBool,
    fail_update: AtomicBool,
    fail_delete: AtomicBool,
    events_tx: Mutex<Option<mpsc::UnboundedSender<Event>>>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
}

impl TestBackend {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let backend = Self::default();
        *backend.events_tx.lock().unwrap() = Some(tx);
        *backend.events_rx.lock().unwrap() = Some(rx);
        Arc::new(backend)
    }

    pub fn seed_conversation(&self, conversation: Conversation) {
        self.conversations.lock().unwrap().push(conversation);
    }

    pub fn seed_messages(&self, messages: Vec<Message>) {
        self.rows.lock().unwrap().extend(messages);
    }

    pub fn push_event(&self, event: Event) {
        let tx = self.events_tx.lock().unwrap();
        // a closed session has dropped its receiver; pushing is then a no-op
        let _ = tx.as_ref().expect("event channel missing").send(event);
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn delay_pages(&self, delay: Duration) {
        *self.page_delay.lock().unwrap() = Some(delay);
    }

    pub fn row(&self, id: &message::Id) -> Option<Message> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == *id)
            .cloned()
    }
}

#[async_trait]
impl BackendClient for TestBackend {
    async fn fetch_conversations(&self) -> integration::Result<Vec<Conversation>> {
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn fetch_page(
        &self,
        conversation_id: &conversation::Id,
        before: Option<&Cursor>,
        limit: usize,
    ) -> integration::Result<Page> {
        let delay = *self.page_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut all: Vec<Message> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.conversation_id == *conversation_id)
            .cloned()
            .collect();
        all.sort_by_key(Message::order_key);

        let older: Vec<Message> = match before {
            Some(cursor) => all
                .into_iter()
                .filter(|m| m.order_key() < (cursor.created_at, cursor.id))
                .collect(),
            None => all,
        };

        let total = older.len();
        let take = limit.min(total);
        Ok(Page {
            messages: older[total - take..].to_vec(),
            has_more: total > take,
        })
    }

    async fn create_message(&self, message: &Message) -> integration::Result<Message> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(integration::Error::Backend("create refused".into()));
        }

        let mut confirmed = message.clone();
        confirmed.id = message::Id::from(Uuid::new_v4());
        self.rows.lock().unwrap().push(confirmed.clone());
        self.created.lock().unwrap().push(confirmed.clone());
        Ok(confirmed)
    }

    async fn update_content(&self, id: &message::Id, content: &str) -> integration::Result<()> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(integration::Error::Backend("update refused".into()));
        }

        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|m| m.id == *id)
            .ok_or_else(|| integration::Error::Backend(format!("no row: {id}")))?;
        row.content = content.to_string();
        Ok(())
    }

    async fn delete_message(&self, id: &message::Id) -> integration::Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(integration::Error::Backend("delete refused".into()));
        }
        self.rows.lock().unwrap().retain(|m| m.id != *id);
        Ok(())
    }

    async fn add_reaction(
        &self,
        id: &message::Id,
        emoji: &str,
        user_id: &user::Id,
    ) -> integration::Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|m| m.id == *id) {
            row.add_reaction(emoji, *user_id);
        }
        Ok(())
    }

    async fn remove_reaction(
        &self,
        id: &message::Id,
        emoji: &str,
        user_id: &user::Id,
    ) -> integration::Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|m| m.id == *id) {
            row.remove_reaction(emoji, user_id);
        }
        Ok(())
    }

    async fn subscribe(&self) -> integration::Result<EventStream> {
        let mut rx = self
            .events_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| integration::Error::Backend("already subscribed".into()))?;

        Ok(Box::pin(async_stream::stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        }))
    }

    async fn broadcast_typing(
        &self,
        conversation_id: &conversation::Id,
        user_id: &user::Id,
        _display_name: &str,
        typing: bool,
    ) -> integration::Result<()> {
        self.typing
            .lock()
            .unwrap()
            .push((*conversation_id, *user_id, typing));
        Ok(())
    }
}

#[derive(Default)]
pub struct TestStorage {
    pub uploads: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl TestStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl FileStorage for TestStorage {
    async fn upload(
        &self,
        filename: &str,
        bytes: Bytes,
        mime_type: &str,
        _conversation_id: &conversation::Id,
    ) -> integration::Result<StoredFile> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(integration::Error::Storage("upload refused".into()));
        }

        self.uploads.lock().unwrap().push(filename.to_string());
        Ok(StoredFile {
            url: format!("https://files.test/{filename}"),
            filename: filename.to_string(),
            size: bytes.len() as u64,
            mime_type: mime_type.to_string(),
        })
    }

    async fn upload_audio(
        &self,
        bytes: Bytes,
        _conversation_id: &conversation::Id,
    ) -> integration::Result<StoredAudio> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(integration::Error::Storage("upload refused".into()));
        }

        self.uploads.lock().unwrap().push("audio".to_string());
        let _ = bytes;
        Ok(StoredAudio {
            url: "https://files.test/voice.webm".into(),
            duration: 2.4,
        })
    }
}

#[derive(Default)]
pub struct TestPolls {
    pub created: Mutex<Vec<(polls::Id, PollDraft)>>,
    pub votes: Mutex<Vec<(polls::Id, usize)>>,
    fail_create: AtomicBool,
}

impl TestPolls {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PollBackend for TestPolls {
    async fn create(&self, draft: &PollDraft) -> integration::Result<polls::Id> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(integration::Error::Polls("create refused".into()));
        }

        let id = polls::Id::from(Uuid::new_v4());
        self.created.lock().unwrap().push((id, draft.clone()));
        Ok(id)
    }

    async fn vote(&self, poll_id: &polls::Id, option: usize) -> integration::Result<()> {
        self.votes.lock().unwrap().push((*poll_id, option));
        Ok(())
    }

    async fn subscribe_tally(&self, poll_id: &polls::Id) -> integration::Result<TallyStream> {
        let tally = Tally {
            poll_id: *poll_id,
            votes: HashMap::new(),
        };
        Ok(Box::pin(futures::stream::iter(vec![tally])))
    }
}

pub fn collaborators(
    backend: &Arc<TestBackend>,
    storage: &Arc<TestStorage>,
    polls: &Arc<TestPolls>,
) -> (Backend, Storage, Polls) {
    (backend.clone(), storage.clone(), polls.clone())
}

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use log::debug;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::conversation;
use crate::event::Event;
use crate::integration::Backend;
use crate::user;

use super::model::{Cursor, Message, Page};
use super::Id;

/// How a realtime event was absorbed into the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Patched,
    Removed,
    /// An insert below a partially-loaded window (missed event after
    /// reconnect) or for a conversation with no loaded window. Not spliced;
    /// conversation-level bookkeeping still applies.
    OutOfWindow,
    /// Duplicate or unknown id; state unchanged.
    Ignored,
}

#[derive(Default)]
struct Log {
    // ascending (created_at, id); the single source of truth for the window
    entries: Vec<Message>,
    // every id ever applied, including removed rows and optimistic ids
    known: HashSet<Id>,
    // optimistic id -> confirmed id
    aliases: HashMap<Id, Id>,
    cursor: Option<Cursor>,
    has_more: bool,
    loaded: bool,
    cancel: CancellationToken,
}

impl Log {
    fn oldest_key(&self) -> Option<(DateTime<Utc>, Id)> {
        self.entries.first().map(Message::order_key)
    }

    fn resolve(&self, id: &Id) -> Id {
        self.aliases.get(id).copied().unwrap_or(*id)
    }

    fn position(&self, id: &Id) -> Option<usize> {
        let id = self.resolve(id);
        self.entries.iter().position(|m| m.id == id)
    }

    fn insert_sorted(&mut self, message: Message) {
        let key = message.order_key();
        let at = self.entries.partition_point(|m| m.order_key() < key);
        self.known.insert(message.id);
        self.entries.insert(at, message);
    }
}

/// Per-conversation ordered message log. The sole writer of message state:
/// page fetches, realtime events and optimistic entries all funnel through
/// here, and readers always observe a fully-applied snapshot.
pub struct MessageStore {
    backend: Backend,
    page_size: usize,
    logs: RwLock<HashMap<conversation::Id, Log>>,
}

impl MessageStore {
    pub fn new(backend: Backend, page_size: usize) -> Self {
        Self {
            backend,
            page_size,
            logs: RwLock::new(HashMap::new()),
        }
    }
}

impl MessageStore {
    /// Fetches the most recent page and opens the conversation's window.
    /// Already-present rows (e.g. optimistic entries) survive the merge.
    pub async fn load_initial(&self, conversation_id: &conversation::Id) -> super::Result<Page> {
        let cancel = {
            let mut logs = self.logs.write().await;
            logs.entry(*conversation_id).or_default().cancel.clone()
        };

        let page = tokio::select! {
            _ = cancel.cancelled() => return Err(super::Error::Cancelled),
            page = self.backend.fetch_page(conversation_id, None, self.page_size) => page?,
        };

        let mut logs = self.logs.write().await;
        if cancel.is_cancelled() {
            return Err(super::Error::Cancelled);
        }
        let log = logs
            .get_mut(conversation_id)
            .ok_or(super::Error::Cancelled)?;

        for message in &page.messages {
            if !log.known.contains(&log.resolve(&message.id)) {
                log.insert_sorted(message.clone());
            }
        }

        let page_cursor = page.messages.first().map(Cursor::from);
        let page_is_older = match (log.cursor, page_cursor) {
            (Some(old), Some(new)) => (new.created_at, new.id) < (old.created_at, old.id),
            (None, _) => true,
            (_, None) => false,
        };
        if page_is_older {
            log.cursor = page_cursor;
            log.has_more = page.has_more;
        }
        log.loaded = true;

        Ok(Page {
            messages: log.entries.clone(),
            has_more: log.has_more,
        })
    }

    /// Fetches the page strictly older than the current cursor and prepends
    /// it. Known ids are never re-inserted. Returns only the fresh rows.
    pub async fn load_more(&self, conversation_id: &conversation::Id) -> super::Result<Page> {
        let (cancel, cursor, has_more) = {
            let logs = self.logs.read().await;
            let log = logs
                .get(conversation_id)
                .filter(|l| l.loaded)
                .ok_or(super::Error::NotLoaded(*conversation_id))?;
            (log.cancel.clone(), log.cursor, log.has_more)
        };

        if !has_more {
            return Ok(Page::default());
        }

        let page = tokio::select! {
            _ = cancel.cancelled() => return Err(super::Error::Cancelled),
            page = self.backend.fetch_page(conversation_id, cursor.as_ref(), self.page_size) => page?,
        };

        let mut logs = self.logs.write().await;
        if cancel.is_cancelled() {
            return Err(super::Error::Cancelled);
        }
        let log = logs
            .get_mut(conversation_id)
            .ok_or(super::Error::Cancelled)?;

        let mut fresh = Vec::with_capacity(page.messages.len());
        for message in page.messages {
            if log.known.contains(&log.resolve(&message.id)) {
                continue;
            }
            log.insert_sorted(message.clone());
            fresh.push(message);
        }

        log.cursor = log.entries.first().map(Cursor::from).or(log.cursor);
        log.has_more = page.has_more;

        Ok(Page {
            messages: fresh,
            has_more: page.has_more,
        })
    }

    /// Drops the conversation's window and cancels any page load in flight,
    /// so a stale page can never be applied after the fact.
    pub async fn close(&self, conversation_id: &conversation::Id) {
        let mut logs = self.logs.write().await;
        if let Some(log) = logs.remove(conversation_id) {
            log.cancel.cancel();
        }
    }
}

impl MessageStore {
    pub async fn apply(&self, event: &Event) -> Applied {
        match event {
            Event::NewMessage { message } => self.apply_insert(message).await,
            Event::MessageUpdated {
                conversation_id,
                id,
                content,
                edited,
            } => self.patch(conversation_id, id, content, *edited).await,
            Event::MessageDeleted {
                conversation_id,
                id,
            } => {
                if self.remove(conversation_id, id).await {
                    Applied::Removed
                } else {
                    Applied::Ignored
                }
            }
            Event::ReactionAdded {
                conversation_id,
                message_id,
                emoji,
                user_id,
            } => {
                self.react(conversation_id, message_id, emoji, *user_id, true)
                    .await
            }
            Event::ReactionRemoved {
                conversation_id,
                message_id,
                emoji,
                user_id,
            } => {
                self.react(conversation_id, message_id, emoji, *user_id, false)
                    .await
            }
            // presence is not a log concern
            Event::TypingStarted { .. } | Event::TypingStopped { .. } => Applied::Ignored,
        }
    }

    async fn apply_insert(&self, message: &Message) -> Applied {
        let mut logs = self.logs.write().await;
        let Some(log) = logs.get_mut(&message.conversation_id) else {
            return Applied::OutOfWindow;
        };
        if !log.loaded {
            return Applied::OutOfWindow;
        }

        if log.known.contains(&log.resolve(&message.id)) {
            debug!("skipping duplicate insert: {}", message.id);
            return Applied::Ignored;
        }

        if log.has_more
            && let Some(oldest) = log.oldest_key()
            && message.order_key() < oldest
        {
            return Applied::OutOfWindow;
        }

        log.insert_sorted(message.clone());
        Applied::Inserted
    }

    pub async fn patch(
        &self,
        conversation_id: &conversation::Id,
        id: &Id,
        content: &str,
        edited: bool,
    ) -> Applied {
        let mut logs = self.logs.write().await;
        let Some(log) = logs.get_mut(conversation_id) else {
            return Applied::Ignored;
        };
        let Some(at) = log.position(id) else {
            debug!("skipping update for unknown message: {id}");
            return Applied::Ignored;
        };

        let entry = &mut log.entries[at];
        entry.content = content.to_string();
        entry.edited = entry.edited || edited;
        Applied::Patched
    }

    pub async fn remove(&self, conversation_id: &conversation::Id, id: &Id) -> bool {
        let mut logs = self.logs.write().await;
        let Some(log) = logs.get_mut(conversation_id) else {
            return false;
        };
        let Some(at) = log.position(id) else {
            debug!("skipping delete for unknown message: {id}");
            return false;
        };

        // the id stays known so a re-delivered insert cannot resurrect the row
        log.entries.remove(at);
        true
    }

    async fn react(
        &self,
        conversation_id: &conversation::Id,
        id: &Id,
        emoji: &str,
        user_id: user::Id,
        added: bool,
    ) -> Applied {
        let mut logs = self.logs.write().await;
        let Some(log) = logs.get_mut(conversation_id) else {
            return Applied::Ignored;
        };
        let Some(at) = log.position(id) else {
            debug!("skipping reaction for unknown message: {id}");
            return Applied::Ignored;
        };

        let entry = &mut log.entries[at];
        let changed = if added {
            entry.add_reaction(emoji, user_id)
        } else {
            entry.remove_reaction(emoji, &user_id)
        };

        if changed { Applied::Patched } else { Applied::Ignored }
    }
}

impl MessageStore {
    /// Places a locally-built entry into the log before the server has seen
    /// it. The entry is visible immediately and keyed by its client id until
    /// [`reconcile`](Self::reconcile) migrates it.
    pub async fn insert_optimistic(&self, message: Message) {
        let mut logs = self.logs.write().await;
        let log = logs.entry(message.conversation_id).or_default();
        if log.known.contains(&log.resolve(&message.id)) {
            debug!("skipping duplicate optimistic insert: {}", message.id);
            return;
        }
        log.insert_sorted(message);
    }

    /// Migrates an optimistic entry to its server-confirmed row. The client
    /// id is aliased to the durable id so consumer references and late
    /// realtime deliveries keep resolving; ordering is preserved.
    pub async fn reconcile(&self, temp_id: &Id, confirmed: Message) -> super::Result<()> {
        let mut logs = self.logs.write().await;
        let log = logs
            .get_mut(&confirmed.conversation_id)
            .ok_or(super::Error::NotFound(*temp_id))?;
        let at = log
            .position(temp_id)
            .ok_or(super::Error::NotFound(*temp_id))?;

        log.aliases.insert(*temp_id, confirmed.id);

        if log.known.contains(&confirmed.id) {
            // the realtime insert won the race; drop the optimistic row
            log.entries.remove(at);
            return Ok(());
        }
        log.known.insert(confirmed.id);

        let key = confirmed.order_key();
        let fits = (at == 0 || log.entries[at - 1].order_key() < key)
            && (at + 1 >= log.entries.len() || key < log.entries[at + 1].order_key());
        if fits {
            log.entries[at] = confirmed;
        } else {
            log.entries.remove(at);
            log.insert_sorted(confirmed);
        }
        Ok(())
    }
}

impl MessageStore {
    pub async fn snapshot(&self, conversation_id: &conversation::Id) -> Vec<Message> {
        let logs = self.logs.read().await;
        logs.get(conversation_id)
            .map(|log| log.entries.clone())
            .unwrap_or_default()
    }

    pub async fn find(&self, conversation_id: &conversation::Id, id: &Id) -> Option<Message> {
        let logs = self.logs.read().await;
        let log = logs.get(conversation_id)?;
        log.position(id).map(|at| log.entries[at].clone())
    }

    pub async fn has_more(&self, conversation_id: &conversation::Id) -> bool {
        let logs = self.logs.read().await;
        logs.get(conversation_id).is_some_and(|log| log.has_more)
    }
}

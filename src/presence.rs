use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use crate::event::Event;
use crate::integration::Backend;
use crate::{conversation, user};

/// A remote participant currently typing in a conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypingUser {
    pub user_id: user::Id,
    pub display_name: String,
}

struct TypistEntry {
    display_name: String,
    expires_at: Instant,
}

struct Outgoing {
    last_broadcast: Option<Instant>,
    deadline: Arc<RwLock<Instant>>,
    watchdog: Option<JoinHandle<()>>,
}

struct Inner {
    backend: Backend,
    me: user::Id,
    my_name: String,
    expiry: Duration,
    broadcast_window: Duration,
    typists: RwLock<HashMap<conversation::Id, HashMap<user::Id, TypistEntry>>>,
    outgoing: Mutex<HashMap<conversation::Id, Outgoing>>,
}

/// Ephemeral typing state, one instance per session. Outgoing keystroke
/// bursts coalesce into at most one broadcast per window and stop on their
/// own once input goes idle; incoming signals live until their local TTL
/// runs out, with no server acknowledgment involved. Nothing here is
/// persisted; a reconnect starts from scratch.
pub struct PresenceChannel {
    inner: Arc<Inner>,
}

impl PresenceChannel {
    pub fn new(
        backend: Backend,
        me: user::Id,
        my_name: impl Into<String>,
        expiry: Duration,
        broadcast_window: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                me,
                my_name: my_name.into(),
                expiry,
                broadcast_window,
                typists: RwLock::new(HashMap::new()),
                outgoing: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl PresenceChannel {
    /// Call on every keystroke; the channel decides when a broadcast is
    /// actually due. Failures are logged and swallowed: typing signals are
    /// never worth a user-facing error.
    pub async fn start_typing(&self, conversation_id: &conversation::Id) {
        let now = Instant::now();
        let mut outgoing = self.inner.outgoing.lock().await;
        let state = outgoing.entry(*conversation_id).or_insert_with(|| Outgoing {
            last_broadcast: None,
            deadline: Arc::new(RwLock::new(now)),
            watchdog: None,
        });

        *state.deadline.write().await = now + self.inner.broadcast_window;

        let due = state
            .last_broadcast
            .is_none_or(|at| now.duration_since(at) >= self.inner.broadcast_window);
        if due {
            state.last_broadcast = Some(now);
            let inner = self.inner.clone();
            let id = *conversation_id;
            tokio::spawn(async move {
                inner.broadcast(&id, true).await;
            });
        }

        if state.watchdog.as_ref().is_none_or(JoinHandle::is_finished) {
            state.watchdog = Some(tokio::spawn(Inner::watchdog(
                self.inner.clone(),
                *conversation_id,
                state.deadline.clone(),
            )));
        }
    }

    /// Explicit stop, e.g. when the composer is cleared or the message went
    /// out. The idle watchdog covers the case where the caller never bothers.
    pub async fn stop_typing(&self, conversation_id: &conversation::Id) {
        {
            let mut outgoing = self.inner.outgoing.lock().await;
            if let Some(state) = outgoing.get_mut(conversation_id) {
                state.last_broadcast = None;
                if let Some(watchdog) = state.watchdog.take() {
                    watchdog.abort();
                }
            }
        }
        self.inner.broadcast(conversation_id, false).await;
    }
}

impl PresenceChannel {
    pub async fn apply(&self, event: &Event) {
        match event {
            Event::TypingStarted {
                conversation_id,
                user_id,
                display_name,
            } => {
                if *user_id == self.inner.me {
                    return;
                }
                let mut typists = self.inner.typists.write().await;
                typists.entry(*conversation_id).or_default().insert(
                    *user_id,
                    TypistEntry {
                        display_name: display_name.clone(),
                        expires_at: Instant::now() + self.inner.expiry,
                    },
                );
            }
            Event::TypingStopped {
                conversation_id,
                user_id,
            } => {
                let mut typists = self.inner.typists.write().await;
                if let Some(room) = typists.get_mut(conversation_id) {
                    room.remove(user_id);
                    if room.is_empty() {
                        typists.remove(conversation_id);
                    }
                }
            }
            _ => {}
        }
    }

    /// The set of remote users typing right now; entries past their TTL are
    /// dropped on the way out.
    pub async fn typists(&self, conversation_id: &conversation::Id) -> Vec<TypingUser> {
        let now = Instant::now();
        let mut typists = self.inner.typists.write().await;
        let Some(room) = typists.get_mut(conversation_id) else {
            return Vec::new();
        };
        room.retain(|_, entry| entry.expires_at > now);

        let mut active: Vec<TypingUser> = room
            .iter()
            .map(|(user_id, entry)| TypingUser {
                user_id: *user_id,
                display_name: entry.display_name.clone(),
            })
            .collect();
        active.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        active
    }

    /// Periodic expiry pass over every conversation.
    pub async fn sweep(&self) {
        let now = Instant::now();
        let mut typists = self.inner.typists.write().await;
        for room in typists.values_mut() {
            room.retain(|_, entry| entry.expires_at > now);
        }
        typists.retain(|_, room| !room.is_empty());
    }

    /// Drops all local state. Run on reconnect; the stream rebuilds it.
    pub async fn reset(&self) {
        self.inner.typists.write().await.clear();
        let mut outgoing = self.inner.outgoing.lock().await;
        for state in outgoing.values_mut() {
            if let Some(watchdog) = state.watchdog.take() {
                watchdog.abort();
            }
        }
        outgoing.clear();
    }
}

impl Inner {
    async fn broadcast(&self, conversation_id: &conversation::Id, typing: bool) {
        if let Err(e) = self
            .backend
            .broadcast_typing(conversation_id, &self.me, &self.my_name, typing)
            .await
        {
            warn!("typing broadcast failed for {conversation_id}: {e}");
        }
    }

    // Sleeps until the idle deadline stops moving, then signals stop.
    async fn watchdog(
        inner: Arc<Inner>,
        conversation_id: conversation::Id,
        deadline: Arc<RwLock<Instant>>,
    ) {
        loop {
            let due = *deadline.read().await;
            if Instant::now() >= due {
                break;
            }
            sleep_until(due).await;
        }

        {
            let mut outgoing = inner.outgoing.lock().await;
            if let Some(state) = outgoing.get_mut(&conversation_id) {
                state.last_broadcast = None;
            }
        }
        inner.broadcast(&conversation_id, false).await;
    }
}

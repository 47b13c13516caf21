use std::collections::HashMap;
use std::fmt::Display;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message;

pub type Polls = Arc<dyn PollBackend + Send + Sync>;

pub type TallyStream = Pin<Box<dyn Stream<Item = Tally> + Send>>;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, Hash, PartialEq, Eq)]
pub struct Id(Uuid);

impl Id {
    pub const fn get(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for Id {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PollDraft {
    pub question: String,
    pub options: Vec<String>,
    pub allow_multiple: bool,
    pub expires_at: Option<DateTime<Utc>>,
    /// The message row this poll hangs off; set once the placeholder exists.
    pub message_id: message::Id,
}

/// Live vote counts keyed by option index.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Tally {
    pub poll_id: Id,
    pub votes: HashMap<usize, u32>,
}

#[async_trait]
pub trait PollBackend {
    async fn create(&self, draft: &PollDraft) -> super::Result<Id>;

    async fn vote(&self, poll_id: &Id, option: usize) -> super::Result<()>;

    async fn subscribe_tally(&self, poll_id: &Id) -> super::Result<TallyStream>;
}

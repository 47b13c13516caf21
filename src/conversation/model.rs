use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::model::LastMessage;
use crate::user;

use super::{Id, Kind};

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Conversation {
    pub id: Id,
    pub kind: Kind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub participants: HashSet<user::Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub muted: bool,
    pub created_by: user::Id,
    #[serde(default)]
    pub allow_member_invites: bool,
}

impl Conversation {
    pub fn last_message_at(&self) -> Option<DateTime<Utc>> {
        self.last_message.as_ref().map(|m| m.at)
    }

    pub fn has_participant(&self, user_id: &user::Id) -> bool {
        self.participants.contains(user_id)
    }
}

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::{conversation, message};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Sending,
    Failed { reason: String },
    Confirmed,
}

impl Status {
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Progress of the three-step poll commit: placeholder message, poll entity,
/// content patch. Interruption past the first step requires compensation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SagaState {
    PlaceholderCreated,
    PollCreated,
    Committed,
    Failed,
}

#[derive(Clone, Debug)]
pub struct FileUpload {
    pub filename: String,
    pub bytes: Bytes,
    pub mime_type: Option<String>,
}

impl FileUpload {
    pub fn new(filename: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            filename: filename.into(),
            bytes,
            mime_type: None,
        }
    }

    /// Declared mime type, or one guessed from the filename extension.
    pub fn resolved_mime(&self) -> String {
        match &self.mime_type {
            Some(mime) => mime.clone(),
            None => mime_guess::from_path(&self.filename)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Clone, Debug)]
pub enum Payload {
    Text {
        text: String,
    },
    File {
        file: FileUpload,
    },
    Voice {
        blob: Bytes,
    },
    Poll {
        question: String,
        options: Vec<String>,
        allow_multiple: bool,
        expires_at: Option<DateTime<Utc>>,
    },
}

/// A send that has not finished its lifecycle. Kept until reconciled or
/// explicitly dismissed; a failure never deletes it behind the caller's back.
#[derive(Clone, Debug)]
pub struct PendingSend {
    pub temp_id: message::Id,
    pub conversation_id: conversation::Id,
    pub payload: Payload,
    pub status: Status,
    /// A placeholder row left behind by an interrupted poll commit that the
    /// compensating delete could not remove either.
    pub orphaned_placeholder: Option<message::Id>,
}

impl PendingSend {
    pub fn new(
        temp_id: message::Id,
        conversation_id: conversation::Id,
        payload: Payload,
    ) -> Self {
        Self {
            temp_id,
            conversation_id,
            payload,
            status: Status::Sending,
            orphaned_placeholder: None,
        }
    }
}

use self::model::SagaState;

use crate::{conversation, integration, message};

pub mod model;
pub mod service;

type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),
    #[error("file too large: {name} is {size} bytes, limit is {limit}")]
    FileTooLarge {
        name: String,
        size: u64,
        limit: u64,
    },
    #[error("not enough poll options: {0}")]
    NotEnoughPollOptions(usize),
    #[error("not the message author")]
    NotAuthor,
    #[error("no pending send: {0}")]
    UnknownPending(message::Id),
    #[error("pending send is not in a failed state: {0}")]
    NotFailed(message::Id),
    #[error("nothing left to retry for: {0}")]
    NotRetryable(message::Id),
    #[error("poll commit interrupted at {state:?}; placeholder message: {placeholder}")]
    PollCommitInterrupted {
        state: SagaState,
        placeholder: message::Id,
    },

    #[error(transparent)]
    _Conversation(#[from] conversation::Error),
    #[error(transparent)]
    _Message(#[from] message::Error),
    #[error(transparent)]
    _Integration(#[from] integration::Error),
}

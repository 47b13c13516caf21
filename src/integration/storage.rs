use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::conversation;

pub type Storage = Arc<dyn FileStorage + Send + Sync>;

#[derive(Clone, Debug, PartialEq)]
pub struct StoredFile {
    pub url: String,
    pub filename: String,
    pub size: u64,
    pub mime_type: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredAudio {
    pub url: String,
    pub duration: f64,
}

#[async_trait]
pub trait FileStorage {
    async fn upload(
        &self,
        filename: &str,
        bytes: Bytes,
        mime_type: &str,
        conversation_id: &conversation::Id,
    ) -> super::Result<StoredFile>;

    async fn upload_audio(
        &self,
        bytes: Bytes,
        conversation_id: &conversation::Id,
    ) -> super::Result<StoredAudio>;
}

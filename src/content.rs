use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

const PREVIEW_MAX_CHARS: usize = 80;

// Domains whose links are rendered as inline GIFs even on legacy rows that
// carry no kind tag.
const GIF_PROVIDER_DOMAINS: [&str; 4] = [
    "media.giphy.com",
    "giphy.com",
    "media.tenor.com",
    "tenor.com",
];

#[derive(Clone, Copy, Debug, Deserialize, Serialize, Hash, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Text,
    File,
    Gif,
    Poll,
}

impl Kind {
    pub const fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::File => "file",
            Self::Gif => "gif",
            Self::Poll => "poll",
        }
    }
}

/// Wire shape of a file/gif content payload. `content` is always a string on
/// the wire; for these kinds it holds this object serialized as JSON.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, alias = "type", skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl FileMeta {
    pub fn attachment(&self) -> Attachment {
        let file_type = self.file_type.as_deref().unwrap_or_default();
        if file_type.starts_with("audio/") {
            return Attachment::Voice;
        }
        if file_type.starts_with("image/") {
            return Attachment::Photo;
        }
        if file_type.contains("pdf")
            || file_type.contains("msword")
            || file_type.contains("officedocument")
        {
            return Attachment::Document;
        }
        Attachment::Other
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attachment {
    Photo,
    Voice,
    Document,
    Other,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GifMeta {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PollRef {
    /// Human-readable stand-in used between optimistic insert and commit.
    Placeholder(String),
    Committed(Uuid),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Content {
    Text(String),
    File(FileMeta),
    Gif(GifMeta),
    Poll(PollRef),
}

impl Content {
    pub const fn kind(&self) -> Kind {
        match self {
            Self::Text(_) => Kind::Text,
            Self::File(_) => Kind::File,
            Self::Gif(_) => Kind::Gif,
            Self::Poll(_) => Kind::Poll,
        }
    }

    pub fn preview(&self) -> String {
        match self {
            Self::Text(text) => truncate(text),
            Self::File(meta) => match meta.attachment() {
                Attachment::Photo => "Photo".into(),
                Attachment::Voice => "Voice message".into(),
                Attachment::Document | Attachment::Other => {
                    meta.filename.clone().unwrap_or_else(|| "File".into())
                }
            },
            Self::Gif(_) => "GIF".into(),
            Self::Poll(_) => "Poll".into(),
        }
    }
}

/// Serializes a typed payload into the opaque wire string. Text passes
/// through verbatim; file/gif become a JSON object; a poll is its id once
/// committed, a readable placeholder before that.
pub fn encode(content: &Content) -> String {
    match content {
        Content::Text(text) => text.clone(),
        Content::File(meta) => {
            serde_json::to_string(meta).unwrap_or_else(|_| meta.url.clone())
        }
        Content::Gif(meta) => {
            serde_json::to_string(meta).unwrap_or_else(|_| meta.url.clone())
        }
        Content::Poll(PollRef::Placeholder(text)) => text.clone(),
        Content::Poll(PollRef::Committed(id)) => id.to_string(),
    }
}

/// Interprets the opaque wire string. Dispatch precedence: the explicit kind
/// tag when the row carries one, then the GIF-provider domain sniff, then a
/// structured JSON parse classified by its `type` field, then plain text.
/// Malformed input never fails; it lands on the text case.
pub fn decode(kind: Option<Kind>, raw: &str) -> Content {
    match kind {
        Some(Kind::Text) => Content::Text(raw.to_string()),
        Some(Kind::File) => decode_file(raw),
        Some(Kind::Gif) => Content::Gif(decode_gif(raw)),
        Some(Kind::Poll) => Content::Poll(decode_poll(raw)),
        None => decode_untagged(raw),
    }
}

fn decode_untagged(raw: &str) -> Content {
    if is_gif_provider_link(raw) {
        return Content::Gif(decode_gif(raw));
    }

    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(raw) {
        let has_url = object.get("url").and_then(Value::as_str).is_some();
        let typed = object
            .get("type")
            .and_then(Value::as_str)
            .map(|t| {
                t.starts_with("audio/")
                    || t.starts_with("image/")
                    || t.contains("pdf")
                    || t.contains("msword")
                    || t.contains("officedocument")
            })
            .unwrap_or(false);

        if typed || has_url {
            if let Ok(meta) = serde_json::from_value::<FileMeta>(Value::Object(object)) {
                return Content::File(meta);
            }
        }
    }

    Content::Text(raw.to_string())
}

fn decode_file(raw: &str) -> Content {
    match serde_json::from_str::<FileMeta>(raw) {
        Ok(meta) => Content::File(meta),
        Err(_) => Content::Text(raw.to_string()),
    }
}

fn decode_gif(raw: &str) -> GifMeta {
    if let Ok(meta) = serde_json::from_str::<GifMeta>(raw) {
        return meta;
    }
    GifMeta {
        url: raw.trim().to_string(),
        title: None,
    }
}

fn decode_poll(raw: &str) -> PollRef {
    match Uuid::parse_str(raw.trim()) {
        Ok(id) => PollRef::Committed(id),
        Err(_) => PollRef::Placeholder(raw.to_string()),
    }
}

fn is_gif_provider_link(raw: &str) -> bool {
    let host = url::Url::parse(raw.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned));

    match host {
        Some(host) => GIF_PROVIDER_DOMAINS
            .iter()
            .any(|domain| host == *domain || host.ends_with(&format!(".{domain}"))),
        // Legacy rows may bury the link in surrounding text.
        None => GIF_PROVIDER_DOMAINS
            .iter()
            .any(|domain| raw.contains(domain)),
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= PREVIEW_MAX_CHARS {
        return text.to_string();
    }
    text.chars().take(PREVIEW_MAX_CHARS).collect()
}

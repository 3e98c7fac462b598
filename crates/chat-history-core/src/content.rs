use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message payload kind keyed by the stored `contentType` tag.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Image,
    File,
    Link,
    Sticker,
    Object,
    Other(String),
}

impl ContentKind {
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "" | "text" | "plain" => Self::Text,
            "image" => Self::Image,
            "file" => Self::File,
            "url" | "link" => Self::Link,
            "emoticon" | "emotion" | "emoji" | "sticker" => Self::Sticker,
            "object" => Self::Object,
            _ => Self::Other(tag.to_string()),
        }
    }

    /// Whether the raw payload is itself a serialized object.
    #[must_use]
    pub fn is_structured(&self) -> bool {
        !matches!(self, Self::Text)
    }

    #[must_use]
    pub fn carries_image(&self) -> bool {
        matches!(self, Self::Image)
    }

    #[must_use]
    pub fn decode(&self, raw: &str) -> DecodedContent {
        if self.is_structured() {
            DecodedContent::structured(raw)
        } else {
            DecodedContent::verbatim(raw)
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DecodedContent {
    pub content: String,
    pub content_json: Option<Value>,
    /// Set when a structured payload failed to parse and fell back to raw text.
    pub parse_missed: bool,
}

impl DecodedContent {
    fn verbatim(raw: &str) -> Self {
        Self { content: raw.to_string(), content_json: None, parse_missed: false }
    }

    fn structured(raw: &str) -> Self {
        let trimmed = raw.trim();
        let parsed = if trimmed.starts_with('{') || trimmed.starts_with('[') {
            serde_json::from_str::<Value>(trimmed).ok()
        } else {
            None
        };

        Self { content: raw.to_string(), parse_missed: parsed.is_none(), content_json: parsed }
    }
}

/// Decode a message payload by its content type tag.
#[must_use]
pub fn decode_content(content_type: &str, raw: &str) -> DecodedContent {
    ContentKind::parse(content_type).decode(raw)
}

/// File, link, and emoji details lifted out of an object payload.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct AttachmentInfo {
    pub name: Option<String>,
    pub size: Option<u64>,
    pub mime_type: Option<String>,
    pub url: Option<String>,
    pub emoji: Option<String>,
}

impl AttachmentInfo {
    #[must_use]
    pub fn from_content_json(content_json: &Value) -> Option<Self> {
        let object = content_json.as_object()?;
        let text = |field: &str| object.get(field).and_then(Value::as_str).map(str::to_string);

        let mime_type = text("type");
        let emoji = if mime_type.as_deref() == Some("emoji") { text("content") } else { None };
        let size = object.get("size").and_then(|size| match size {
            Value::String(raw) => raw.trim().parse::<u64>().ok(),
            other => other.as_u64(),
        });

        let info = Self { name: text("name"), size, mime_type, url: text("url"), emoji };
        if info == Self::default() {
            None
        } else {
            Some(info)
        }
    }
}

//! Flat one-row-per-message projection for CSV-style writers.

use std::borrow::Cow;

use serde_json::Value;

use crate::pipeline::ResolvedMessage;

pub const TABULAR_COLUMNS: [&str; 13] = [
    "chat_id",
    "chat_name",
    "chat_type",
    "sender_id",
    "sender_account",
    "sender_realname",
    "timestamp_ms",
    "timestamp_iso",
    "content_type",
    "content",
    "content_json",
    "image_path",
    "image_thumb_path",
];

/// Replace line breaks with two-character escapes so a field never spans rows.
///
/// Backslashes are escaped as well, which makes [`unescape_field`] an exact inverse.
#[must_use]
pub fn escape_field(value: &str) -> Cow<'_, str> {
    if !value.contains(['\\', '\n', '\r']) {
        return Cow::Borrowed(value);
    }

    let mut escaped = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

#[must_use]
pub fn unescape_field(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Escaped cells for one message, aligned with [`TABULAR_COLUMNS`].
#[must_use]
pub fn tabular_row(message: &ResolvedMessage) -> Vec<String> {
    fn text(value: Option<&str>) -> String {
        value.map(|value| escape_field(value).into_owned()).unwrap_or_default()
    }
    fn number<T: ToString>(value: Option<T>) -> String {
        value.map(|value| value.to_string()).unwrap_or_default()
    }

    vec![
        text(message.message.chat_gid.as_deref()),
        text(message.chat_name.as_deref()),
        text(message.chat_type.as_deref()),
        number(message.message.sender_id),
        text(message.sender_account.as_deref()),
        text(message.sender_realname.as_deref()),
        number(message.message.timestamp_ms),
        text(message.timestamp_iso.as_deref()),
        text(Some(message.message.content_type.as_str())),
        text(Some(message.content.as_str())),
        text(message.content_json.as_ref().map(Value::to_string).as_deref()),
        text(message.image_path.as_deref()),
        text(message.image_thumb_path.as_deref()),
    ]
}

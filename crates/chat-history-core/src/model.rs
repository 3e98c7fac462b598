use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RecordDecodeError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum StoreName {
    Member,
    Chat,
    ChatMessage,
}

impl StoreName {
    pub const ALL: [Self; 3] = [Self::Member, Self::Chat, Self::ChatMessage];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Member => "Member",
            Self::Chat => "Chat",
            Self::ChatMessage => "ChatMessage",
        }
    }

    /// Derive the logical key grouping every stored version of one record.
    #[must_use]
    pub fn logical_key(self, value: &Value) -> Option<String> {
        match self {
            Self::Member => value.get("id").and_then(as_member_id).map(|id| id.to_string()),
            Self::Chat => value
                .get("gid")
                .and_then(Value::as_str)
                .filter(|gid| !gid.is_empty())
                .map(str::to_string),
            Self::ChatMessage => ["unionId", "id", "gid"]
                .iter()
                .filter_map(|field| value.get(*field))
                .find_map(key_text),
        }
    }

    /// Version-ordering signal carried by the record itself, used when the
    /// reader supplies none.
    #[must_use]
    pub fn fallback_marker(self, value: &Value) -> Option<UpdateMarker> {
        let fields: &[&str] = match self {
            Self::Member => &[],
            Self::Chat => &["editedDate", "lastActiveTime", "lastAccessTime", "createdDate"],
            Self::ChatMessage => &["date"],
        };
        fields.iter().find_map(|field| value.get(*field).and_then(as_integer)).map(UpdateMarker)
    }
}

impl Display for StoreName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamp or sequence number ordering the versions of one logical key.
///
/// A missing marker is represented as `None` and ranks below every present one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct UpdateMarker(pub i64);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct MemberId(pub i64);

impl MemberId {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        value.trim().parse::<i64>().ok().map(Self)
    }
}

impl Display for MemberId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One stored version as handed over by a store reader, before key derivation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredVersion {
    #[serde(default)]
    pub key: Option<String>,
    pub value: Value,
    #[serde(default)]
    pub update_marker: Option<i64>,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RawRecord {
    pub store: StoreName,
    pub logical_key: String,
    pub value: Value,
    pub update_marker: Option<UpdateMarker>,
    pub deleted: bool,
    pub original_store_index: usize,
}

impl RawRecord {
    /// Build a raw record from a stored version read at `position`.
    ///
    /// # Errors
    /// Returns [`RecordDecodeError`] when the value is not an object or no
    /// logical key can be derived for the store.
    pub fn from_stored(
        store: StoreName,
        position: usize,
        stored: StoredVersion,
    ) -> Result<Self, RecordDecodeError> {
        if !stored.value.is_object() {
            return Err(RecordDecodeError::new(store, position, "value is not an object"));
        }

        let logical_key = match stored.key.filter(|key| !key.trim().is_empty()) {
            Some(key) => key,
            None => store.logical_key(&stored.value).ok_or_else(|| {
                RecordDecodeError::new(store, position, "no logical key could be derived")
            })?,
        };

        if store == StoreName::Member && MemberId::parse(&logical_key).is_none() {
            return Err(RecordDecodeError::new(
                store,
                position,
                format!("member key `{logical_key}` is not an integer id"),
            ));
        }

        let update_marker = stored
            .update_marker
            .map(UpdateMarker)
            .or_else(|| store.fallback_marker(&stored.value));
        let deleted = stored.deleted
            || stored.value.get("deleted").and_then(Value::as_bool).unwrap_or(false);

        Ok(Self {
            store,
            logical_key,
            value: stored.value,
            update_marker,
            deleted,
            original_store_index: position,
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Member {
    pub id: MemberId,
    pub account: Option<String>,
    pub realname: Option<String>,
    pub deleted: bool,
    pub update_marker: Option<UpdateMarker>,
}

impl Member {
    #[must_use]
    pub fn from_raw(raw: &RawRecord) -> Option<Self> {
        Some(Self {
            id: MemberId::parse(&raw.logical_key)?,
            account: string_field(&raw.value, "account"),
            realname: string_field(&raw.value, "realname"),
            deleted: raw.deleted,
            update_marker: raw.update_marker,
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Chat {
    pub gid: String,
    pub id: Option<i64>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub chat_type: Option<String>,
    pub members: BTreeSet<MemberId>,
    pub admins: BTreeSet<MemberId>,
    pub created_date: Option<i64>,
    pub edited_date: Option<i64>,
    pub last_active_time: Option<i64>,
    pub last_access_time: Option<i64>,
    pub the_other_member_id: Option<MemberId>,
    pub update_marker: Option<UpdateMarker>,
}

impl Chat {
    #[must_use]
    pub fn from_raw(raw: &RawRecord) -> Self {
        let value = &raw.value;
        Self {
            gid: raw.logical_key.clone(),
            id: value.get("id").and_then(as_integer),
            name: string_field(value, "name"),
            chat_type: string_field(value, "type"),
            members: member_set(value.get("members")),
            admins: member_set(value.get("admins")),
            created_date: value.get("createdDate").and_then(as_integer),
            edited_date: value.get("editedDate").and_then(as_integer),
            last_active_time: value.get("lastActiveTime").and_then(as_integer),
            last_access_time: value.get("lastAccessTime").and_then(as_integer),
            the_other_member_id: value.get("theOtherMemberID").and_then(as_member_id),
            update_marker: raw.update_marker,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    #[serde(rename = "message_key")]
    pub key: String,
    #[serde(rename = "chat_id")]
    pub chat_gid: Option<String>,
    #[serde(rename = "message_id")]
    pub id: Option<i64>,
    #[serde(rename = "message_gid")]
    pub gid: Option<String>,
    #[serde(rename = "message_index")]
    pub index: Option<i64>,
    pub union_id: Option<String>,
    pub sender_id: Option<MemberId>,
    pub timestamp_ms: Option<i64>,
    pub content_type: String,
    #[serde(skip)]
    pub raw_content: String,
    #[serde(rename = "data_json")]
    pub data: Option<Value>,
    pub deleted: bool,
    pub update_marker: Option<UpdateMarker>,
    pub original_store_index: usize,
}

impl ChatMessage {
    #[must_use]
    pub fn from_raw(raw: &RawRecord) -> Self {
        let value = &raw.value;
        let raw_content = match value.get("content") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
        };

        Self {
            key: raw.logical_key.clone(),
            chat_gid: string_field(value, "cgid"),
            id: value.get("id").and_then(as_integer),
            gid: string_field(value, "gid"),
            index: value.get("index").and_then(as_integer),
            union_id: value.get("unionId").and_then(key_text),
            sender_id: value.get("user").and_then(as_member_id),
            timestamp_ms: value.get("date").and_then(as_integer),
            content_type: string_field(value, "contentType").unwrap_or_default(),
            raw_content,
            data: value.get("data").filter(|data| is_present(data)).cloned(),
            deleted: raw.deleted,
            update_marker: raw.update_marker,
            original_store_index: raw.original_store_index,
        }
    }
}

/// Render a value with object keys sorted recursively so equal content
/// always yields equal text regardless of field order.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(object) => {
            let mut entries = object.iter().collect::<Vec<_>>();
            entries.sort_by(|lhs, rhs| lhs.0.cmp(rhs.0));
            out.push('{');
            for (index, (key, child)) in entries.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(child, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Read an integral number, truncating float timestamps.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn as_integer(value: &Value) -> Option<i64> {
    if let Some(number) = value.as_i64() {
        return Some(number);
    }
    if let Some(number) = value.as_u64() {
        return i64::try_from(number).ok();
    }
    value
        .as_f64()
        .filter(|number| number.is_finite() && number.abs() < 9.0e18)
        .map(|number| number.trunc() as i64)
}

pub(crate) fn as_member_id(value: &Value) -> Option<MemberId> {
    match value {
        Value::String(text) => MemberId::parse(text),
        other => as_integer(other).map(MemberId),
    }
}

fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    match value.get(field)? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn member_set(value: Option<&Value>) -> BTreeSet<MemberId> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(as_member_id).collect(),
        Some(Value::Object(object)) => {
            object.keys().filter_map(|key| MemberId::parse(key)).collect()
        }
        Some(Value::String(text)) => text.split(',').filter_map(MemberId::parse).collect(),
        _ => BTreeSet::new(),
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(object) => !object.is_empty(),
        Value::Number(_) => true,
    }
}

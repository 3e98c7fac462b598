//! Per-account reconciliation: read, resolve, decode, link, probe assets, order.
//!
//! A run either yields a complete [`ExportAggregate`] or fails with an
//! [`ExportError`] before anything is built. Every store is read up front so a
//! structural failure in a later store cannot leave a half-built result behind.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::assets::AssetResolver;
use crate::config::{ExportConfig, ResolutionMode};
use crate::content::{AttachmentInfo, ContentKind};
use crate::error::{ExportError, RecordDecodeError};
use crate::link::link_message;
use crate::model::{Chat, ChatMessage, Member, MemberId, RawRecord, StoreName};
use crate::resolve::{resolve_store, SelectionPolicy};

/// Supplies the stored versions of one account's logical stores.
pub trait RecordSource {
    fn account(&self) -> &str;

    /// Read every stored version of `store` in storage order.
    ///
    /// # Errors
    /// Returns [`ExportError`] when the store cannot be read at all. Versions that
    /// cannot be interpreted are returned as inner errors and skipped by the caller.
    fn read_store(
        &self,
        store: StoreName,
    ) -> Result<Vec<Result<RawRecord, RecordDecodeError>>, ExportError>;
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResolvedMessage {
    #[serde(flatten)]
    pub message: ChatMessage,
    pub timestamp_iso: Option<String>,
    pub content: String,
    pub content_json: Option<Value>,
    pub chat_name: Option<String>,
    pub chat_type: Option<String>,
    pub chat_members: Option<Vec<MemberId>>,
    pub sender_account: Option<String>,
    pub sender_realname: Option<String>,
    pub attachment: Option<AttachmentInfo>,
    pub image_path: Option<String>,
    pub image_thumb_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct ExportDiagnostics {
    pub raw_versions: BTreeMap<StoreName, usize>,
    pub skipped_records: BTreeMap<StoreName, usize>,
    pub resolved_members: usize,
    pub resolved_chats: usize,
    pub deleted_messages_dropped: usize,
    pub unresolved_chats: usize,
    pub unresolved_senders: usize,
    pub content_parse_misses: usize,
    pub asset_lookups: usize,
    pub asset_misses: usize,
}

/// Everything handed to the writer for one account.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExportAggregate {
    pub account: String,
    pub message_count: usize,
    pub messages: Vec<ResolvedMessage>,
    pub members: BTreeMap<MemberId, Member>,
    pub chats: BTreeMap<String, Chat>,
    pub diagnostics: ExportDiagnostics,
}

/// Decoded versions of all three stores for one account.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub members: Vec<RawRecord>,
    pub chats: Vec<RawRecord>,
    pub messages: Vec<RawRecord>,
    pub skipped: BTreeMap<StoreName, usize>,
}

impl StoreSnapshot {
    /// Read all three stores from `source`, skipping undecodable versions.
    ///
    /// # Errors
    /// Propagates the first structural failure reported by the source.
    pub fn read(source: &dyn RecordSource) -> Result<Self, ExportError> {
        let mut snapshot = Self::default();
        for store in StoreName::ALL {
            tracing::info!(account = source.account(), store = %store, "loading store");
            let mut records = Vec::new();
            let mut skipped = 0_usize;
            for entry in source.read_store(store)? {
                match entry {
                    Ok(record) => records.push(record),
                    Err(err) => {
                        skipped += 1;
                        tracing::warn!(account = source.account(), error = %err, "skipping record");
                    }
                }
            }
            snapshot.skipped.insert(store, skipped);
            match store {
                StoreName::Member => snapshot.members = records,
                StoreName::Chat => snapshot.chats = records,
                StoreName::ChatMessage => snapshot.messages = records,
            }
        }
        Ok(snapshot)
    }

    fn records(&self, store: StoreName) -> &[RawRecord] {
        match store {
            StoreName::Member => &self.members,
            StoreName::Chat => &self.chats,
            StoreName::ChatMessage => &self.messages,
        }
    }
}

/// Run the whole pipeline for the account behind `source`.
///
/// # Errors
/// Returns [`ExportError`] when any store is structurally unreadable; no
/// aggregate is produced in that case.
pub fn export_account(
    source: &dyn RecordSource,
    assets: &AssetResolver,
    config: &ExportConfig,
) -> Result<ExportAggregate, ExportError> {
    let snapshot = StoreSnapshot::read(source)?;
    Ok(build_aggregate(source.account(), &snapshot, assets, config))
}

/// Build the aggregate from already decoded versions.
#[must_use]
pub fn build_aggregate(
    account: &str,
    snapshot: &StoreSnapshot,
    assets: &AssetResolver,
    config: &ExportConfig,
) -> ExportAggregate {
    let mut diagnostics = ExportDiagnostics {
        raw_versions: StoreName::ALL
            .into_iter()
            .map(|store| (store, snapshot.records(store).len()))
            .collect(),
        skipped_records: snapshot.skipped.clone(),
        ..ExportDiagnostics::default()
    };

    let members = canonical_members(&snapshot.members);
    let chats = canonical_chats(&snapshot.chats);
    diagnostics.resolved_members = members.len();
    diagnostics.resolved_chats = chats.len();

    let candidates = snapshot
        .messages
        .iter()
        .filter(|record| config.include_deleted || !record.deleted);
    if !config.include_deleted {
        diagnostics.deleted_messages_dropped =
            snapshot.messages.iter().filter(|record| record.deleted).count();
    }
    let selected =
        resolve_store(candidates, SelectionPolicy::for_store(StoreName::ChatMessage), config.mode);
    tracing::info!(account, selected = selected.len(), "messages selected");

    let mut messages = selected
        .into_iter()
        .map(|raw| {
            let message = ChatMessage::from_raw(raw);
            resolve_message(message, &chats, &members, assets, config, &mut diagnostics)
        })
        .collect::<Vec<_>>();
    order_messages(&mut messages);

    ExportAggregate {
        account: account.to_string(),
        message_count: messages.len(),
        messages,
        members,
        chats,
        diagnostics,
    }
}

/// Sort by `(timestamp_ms, original_store_index)`; a missing timestamp sorts first.
pub fn order_messages(messages: &mut [ResolvedMessage]) {
    messages.sort_by(|lhs, rhs| {
        lhs.message
            .timestamp_ms
            .cmp(&rhs.message.timestamp_ms)
            .then_with(|| lhs.message.original_store_index.cmp(&rhs.message.original_store_index))
    });
}

fn canonical_members(records: &[RawRecord]) -> BTreeMap<MemberId, Member> {
    resolve_store(
        records,
        SelectionPolicy::for_store(StoreName::Member),
        ResolutionMode::Deduplicate,
    )
    .into_iter()
    .filter_map(Member::from_raw)
    .map(|member| (member.id, member))
    .collect()
}

fn canonical_chats(records: &[RawRecord]) -> BTreeMap<String, Chat> {
    resolve_store(records, SelectionPolicy::for_store(StoreName::Chat), ResolutionMode::Deduplicate)
        .into_iter()
        .map(Chat::from_raw)
        .map(|chat| (chat.gid.clone(), chat))
        .collect()
}

fn resolve_message(
    message: ChatMessage,
    chats: &BTreeMap<String, Chat>,
    members: &BTreeMap<MemberId, Member>,
    assets: &AssetResolver,
    config: &ExportConfig,
    diagnostics: &mut ExportDiagnostics,
) -> ResolvedMessage {
    let kind = ContentKind::parse(&message.content_type);
    let decoded = kind.decode(&message.raw_content);
    if decoded.parse_missed {
        diagnostics.content_parse_misses += 1;
        tracing::debug!(
            key = %message.key,
            content_type = %message.content_type,
            "content kept raw"
        );
    }

    let association = link_message(&message, chats, members);
    if !association.chat_found {
        diagnostics.unresolved_chats += 1;
    }
    if !association.sender_found {
        diagnostics.unresolved_senders += 1;
    }

    let attachment = decoded.content_json.as_ref().and_then(AttachmentInfo::from_content_json);

    let mut image_path = None;
    let mut image_thumb_path = None;
    let image_payload = decoded
        .content_json
        .as_ref()
        .and_then(Value::as_object)
        .filter(|_| kind.carries_image());
    if let Some(payload) = image_payload {
        let identifier = payload
            .get("gid")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| message.gid.clone());
        if let Some(identifier) = identifier {
            diagnostics.asset_lookups += 1;
            let found = assets.resolve(&identifier, payload.get("type").and_then(Value::as_str));
            if found.is_empty() {
                diagnostics.asset_misses += 1;
                tracing::debug!(
                    identifier = %identifier,
                    dir = %assets.images_dir().display(),
                    "no image asset"
                );
            }
            image_path = found.image_path;
            image_thumb_path = found.image_thumb_path;
        }
    }

    ResolvedMessage {
        timestamp_iso: message.timestamp_ms.and_then(|ms| config.timezone.render(ms)),
        content: decoded.content,
        content_json: decoded.content_json,
        chat_name: association.chat_name,
        chat_type: association.chat_type,
        chat_members: association.chat_members,
        sender_account: association.sender_account,
        sender_realname: association.sender_realname,
        attachment,
        image_path,
        image_thumb_path,
        message,
    }
}

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{Chat, ChatMessage, Member, MemberId};

/// Denormalized sender and conversation fields for one message.
///
/// Fields stay empty when the corresponding lookup misses.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct Association {
    pub chat_name: Option<String>,
    pub chat_type: Option<String>,
    pub chat_members: Option<Vec<MemberId>>,
    pub sender_account: Option<String>,
    pub sender_realname: Option<String>,
    #[serde(skip)]
    pub chat_found: bool,
    #[serde(skip)]
    pub sender_found: bool,
}

#[must_use]
pub fn link_message(
    message: &ChatMessage,
    chats: &BTreeMap<String, Chat>,
    members: &BTreeMap<MemberId, Member>,
) -> Association {
    let chat = message.chat_gid.as_ref().and_then(|gid| chats.get(gid));
    let sender = message.sender_id.and_then(|id| members.get(&id));

    Association {
        chat_name: chat.and_then(|chat| chat.name.clone()),
        chat_type: chat.and_then(|chat| chat.chat_type.clone()),
        chat_members: chat.map(|chat| chat.members.iter().copied().collect()),
        sender_account: sender.and_then(|member| member.account.clone()),
        sender_realname: sender.and_then(|member| member.realname.clone()),
        chat_found: chat.is_some(),
        sender_found: sender.is_some(),
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type ChatId = i64;
pub type MessageId = i64;
/// Unix seconds, UTC.
pub type Timestamp = i64;

/// Failure modes of entity-store operations. Callers treat these as
/// per-operation no-ops, never as fatal: realtime events routinely
/// reference entities the cache has already evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("unknown chat {0}")]
    UnknownChat(ChatId),
    #[error("unknown user {0}")]
    UnknownUser(UserId),
    #[error("unknown message {1} in chat {0}")]
    UnknownMessage(ChatId, MessageId),
    #[error("duplicate message {1} in chat {0}")]
    DuplicateMessage(ChatId, MessageId),
    #[error("duplicate chat {0}")]
    DuplicateChat(ChatId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    /// `None` means currently online.
    pub last_online: Option<Timestamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    #[serde(rename = "type")]
    pub kind: ChatKind,
    pub title: String,
    /// Set semantics: `append_member` dedups.
    pub members: Vec<UserId>,
    /// Maintained incrementally, in lock-step with every operation that
    /// changes read status or message existence. Never recomputed by
    /// scanning history, which may only be partially paginated in.
    pub unread_count: u32,
}

/// Chat as delivered by the fetch service and `add_chat` hydration:
/// no unread counter yet, and a private chat's title still has to be
/// derived from the other member's username.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub id: ChatId,
    #[serde(rename = "type")]
    pub kind: ChatKind,
    #[serde(default)]
    pub title: String,
    pub members: Vec<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat: ChatId,
    pub from_user: UserId,
    pub text: String,
    #[serde(default)]
    pub is_service: bool,
    #[serde(default)]
    pub reply_to: Option<MessageId>,
    pub created_at: Timestamp,
    #[serde(default)]
    pub edited_at: Option<Timestamp>,
    /// Ordered append-only set of users who acknowledged viewing.
    #[serde(default)]
    pub seen_by: Vec<UserId>,
}

impl Message {
    pub fn seen_by_user(&self, user_id: UserId) -> bool {
        self.seen_by.contains(&user_id)
    }
}

/// Root aggregate: the locally-durable mirror of one user's chats,
/// messages and peer users. Per-chat message vectors are kept oldest
/// first, non-decreasing by `created_at`, with no duplicate ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCache {
    pub current_user: UserId,
    chats: BTreeMap<ChatId, Chat>,
    users: BTreeMap<UserId, User>,
    messages: BTreeMap<ChatId, Vec<Message>>,
}

impl SessionCache {
    pub fn empty(current_user: UserId) -> Self {
        Self {
            current_user,
            chats: BTreeMap::new(),
            users: BTreeMap::new(),
            messages: BTreeMap::new(),
        }
    }

    // ---- lookups ----

    pub fn user(&self, user_id: UserId) -> Option<&User> {
        self.users.get(&user_id)
    }

    pub fn user_exists(&self, user_id: UserId) -> bool {
        self.users.contains_key(&user_id)
    }

    pub fn chat(&self, chat_id: ChatId) -> Option<&Chat> {
        self.chats.get(&chat_id)
    }

    pub fn chats(&self) -> impl Iterator<Item = &Chat> {
        self.chats.values()
    }

    pub fn message(&self, chat_id: ChatId, message_id: MessageId) -> Option<&Message> {
        self.messages
            .get(&chat_id)?
            .iter()
            .find(|m| m.id == message_id)
    }

    /// The live per-chat sequence, oldest first. Empty for unknown chats.
    pub fn chat_messages(&self, chat_id: ChatId) -> &[Message] {
        self.messages.get(&chat_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn last_message(&self, chat_id: ChatId) -> Option<&Message> {
        self.messages.get(&chat_id)?.last()
    }

    /// The existing private chat shared with `user_id`, if any.
    pub fn private_chat_with(&self, user_id: UserId) -> Option<ChatId> {
        if user_id == self.current_user {
            return None;
        }
        self.chats
            .values()
            .find(|c| {
                c.kind == ChatKind::Private
                    && c.members.contains(&self.current_user)
                    && c.members.contains(&user_id)
            })
            .map(|c| c.id)
    }

    // ---- entity mutation ----

    pub fn append_user(&mut self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn user_mut(&mut self, user_id: UserId) -> Option<&mut User> {
        self.users.get_mut(&user_id)
    }

    /// Adds a chat and initializes its (empty) message sequence.
    pub fn append_chat(&mut self, chat: Chat) -> Result<(), StoreError> {
        if self.chats.contains_key(&chat.id) {
            return Err(StoreError::DuplicateChat(chat.id));
        }
        self.messages.insert(chat.id, Vec::new());
        self.chats.insert(chat.id, chat);
        Ok(())
    }

    pub fn chat_mut(&mut self, chat_id: ChatId) -> Option<&mut Chat> {
        self.chats.get_mut(&chat_id)
    }

    /// Cascade-delete: removes the chat and its whole message history.
    pub fn remove_chat(&mut self, chat_id: ChatId) -> Result<(), StoreError> {
        if self.chats.remove(&chat_id).is_none() {
            return Err(StoreError::UnknownChat(chat_id));
        }
        self.messages.remove(&chat_id);
        Ok(())
    }

    pub fn append_member(&mut self, chat_id: ChatId, user_id: UserId) -> Result<(), StoreError> {
        if !self.users.contains_key(&user_id) {
            return Err(StoreError::UnknownUser(user_id));
        }
        let chat = self
            .chats
            .get_mut(&chat_id)
            .ok_or(StoreError::UnknownChat(chat_id))?;
        if !chat.members.contains(&user_id) {
            chat.members.push(user_id);
        }
        Ok(())
    }

    pub fn remove_member(&mut self, chat_id: ChatId, user_id: UserId) -> Result<(), StoreError> {
        let chat = self
            .chats
            .get_mut(&chat_id)
            .ok_or(StoreError::UnknownChat(chat_id))?;
        let before = chat.members.len();
        chat.members.retain(|id| *id != user_id);
        if chat.members.len() == before {
            return Err(StoreError::UnknownUser(user_id));
        }
        Ok(())
    }

    // ---- message mutation ----

    /// Head insertion: pagination merges older pages in front of the
    /// cached window (callers feed a page newest-first so the final
    /// order stays oldest-first).
    pub fn insert_message(&mut self, message: Message) -> Result<(), StoreError> {
        let chat_id = message.chat;
        if self.message(chat_id, message.id).is_some() {
            return Err(StoreError::DuplicateMessage(chat_id, message.id));
        }
        let seq = self
            .messages
            .get_mut(&chat_id)
            .ok_or(StoreError::UnknownChat(chat_id))?;
        seq.insert(0, message);
        Ok(())
    }

    /// Tail append: realtime semantics, a newly created message.
    pub fn append_message(&mut self, message: Message) -> Result<(), StoreError> {
        let chat_id = message.chat;
        if self.message(chat_id, message.id).is_some() {
            return Err(StoreError::DuplicateMessage(chat_id, message.id));
        }
        let seq = self
            .messages
            .get_mut(&chat_id)
            .ok_or(StoreError::UnknownChat(chat_id))?;
        seq.push(message);
        Ok(())
    }

    pub fn message_mut(&mut self, chat_id: ChatId, message_id: MessageId) -> Option<&mut Message> {
        self.messages
            .get_mut(&chat_id)?
            .iter_mut()
            .find(|m| m.id == message_id)
    }

    pub fn remove_message(
        &mut self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), StoreError> {
        let seq = self
            .messages
            .get_mut(&chat_id)
            .ok_or(StoreError::UnknownChat(chat_id))?;
        let idx = seq
            .iter()
            .position(|m| m.id == message_id)
            .ok_or(StoreError::UnknownMessage(chat_id, message_id))?;
        seq.remove(idx);
        Ok(())
    }

    // ---- counters ----

    pub fn increment_unread(&mut self, chat_id: ChatId) -> Option<u32> {
        let chat = self.chats.get_mut(&chat_id)?;
        chat.unread_count += 1;
        Some(chat.unread_count)
    }

    /// Floored decrement: the counter never goes negative even when
    /// delete/view events race ahead of the cache.
    pub fn decrement_unread(&mut self, chat_id: ChatId) -> Option<u32> {
        let chat = self.chats.get_mut(&chat_id)?;
        chat.unread_count = chat.unread_count.max(1) - 1;
        Some(chat.unread_count)
    }

    // ---- derived ordering ----

    /// Chat ids by descending `created_at` of each chat's last message.
    /// Chats without any message sort last; ties break by ascending
    /// chat id so the ordering is deterministic.
    pub fn chat_ordering(&self) -> Vec<ChatId> {
        let mut ids: Vec<ChatId> = self.chats.keys().copied().collect();
        ids.sort_by_key(|id| {
            let last = self.last_message(*id).map(|m| m.created_at);
            (
                last.is_none(),
                std::cmp::Reverse(last.unwrap_or(i64::MIN)),
                *id,
            )
        });
        ids
    }

    /// A chat's members ascending by `last_online`, with `None`
    /// (currently online) treated as the minimum; ties by user id.
    pub fn user_ordering(&self, chat_id: ChatId) -> Vec<UserId> {
        let Some(chat) = self.chats.get(&chat_id) else {
            return Vec::new();
        };
        let mut members = chat.members.clone();
        members.sort_by_key(|id| {
            let last = self.users.get(id).and_then(|u| u.last_online);
            (last.unwrap_or(i64::MIN), *id)
        });
        members
    }

    pub fn online_members(&self, chat_id: ChatId) -> usize {
        let Some(chat) = self.chats.get(&chat_id) else {
            return 0;
        };
        chat.members
            .iter()
            .filter(|id| matches!(self.users.get(id), Some(u) if u.last_online.is_none()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: UserId, name: &str, last_online: Option<Timestamp>) -> User {
        User {
            id,
            username: name.to_string(),
            last_online,
        }
    }

    fn chat(id: ChatId, kind: ChatKind, members: &[UserId]) -> Chat {
        Chat {
            id,
            kind,
            title: format!("chat {id}"),
            members: members.to_vec(),
            unread_count: 0,
        }
    }

    fn message(id: MessageId, chat: ChatId, from: UserId, created_at: Timestamp) -> Message {
        Message {
            id,
            chat,
            from_user: from,
            text: format!("msg {id}"),
            is_service: false,
            reply_to: None,
            created_at,
            edited_at: None,
            seen_by: vec![],
        }
    }

    fn cache_with_chat() -> SessionCache {
        let mut cache = SessionCache::empty(1);
        cache.append_user(user(1, "me", None));
        cache.append_user(user(2, "peer", Some(100)));
        cache
            .append_chat(chat(10, ChatKind::Private, &[1, 2]))
            .unwrap();
        cache
    }

    #[test]
    fn append_chat_rejects_duplicates_and_initializes_history() {
        let mut cache = cache_with_chat();
        assert!(cache.chat_messages(10).is_empty());
        assert_eq!(
            cache.append_chat(chat(10, ChatKind::Group, &[1])),
            Err(StoreError::DuplicateChat(10))
        );
    }

    #[test]
    fn message_append_and_insert_keep_chronological_order() {
        let mut cache = cache_with_chat();
        cache.append_message(message(3, 10, 2, 300)).unwrap();
        cache.append_message(message(4, 10, 2, 400)).unwrap();
        // Pagination prepends an older page, newest-first.
        cache.insert_message(message(2, 10, 2, 200)).unwrap();
        cache.insert_message(message(1, 10, 2, 100)).unwrap();

        let ids: Vec<MessageId> = cache.chat_messages(10).iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        let stamps: Vec<Timestamp> = cache
            .chat_messages(10)
            .iter()
            .map(|m| m.created_at)
            .collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn message_ops_reject_duplicates_and_unknown_chats() {
        let mut cache = cache_with_chat();
        cache.append_message(message(1, 10, 2, 100)).unwrap();
        assert_eq!(
            cache.append_message(message(1, 10, 2, 100)),
            Err(StoreError::DuplicateMessage(10, 1))
        );
        assert_eq!(
            cache.insert_message(message(1, 10, 2, 100)),
            Err(StoreError::DuplicateMessage(10, 1))
        );
        assert_eq!(
            cache.append_message(message(5, 99, 2, 100)),
            Err(StoreError::UnknownChat(99))
        );
        assert_eq!(
            cache.remove_message(10, 42),
            Err(StoreError::UnknownMessage(10, 42))
        );
    }

    #[test]
    fn remove_chat_cascades_and_is_idempotent_failure() {
        let mut cache = cache_with_chat();
        cache.append_message(message(1, 10, 2, 100)).unwrap();
        cache.remove_chat(10).unwrap();
        assert!(cache.chat(10).is_none());
        assert!(cache.chat_messages(10).is_empty());
        assert_eq!(cache.remove_chat(10), Err(StoreError::UnknownChat(10)));
    }

    #[test]
    fn membership_is_set_like_and_guards_unknown_entities() {
        let mut cache = cache_with_chat();
        cache.append_user(user(3, "third", None));
        cache.append_member(10, 3).unwrap();
        cache.append_member(10, 3).unwrap();
        assert_eq!(cache.chat(10).unwrap().members, vec![1, 2, 3]);

        assert_eq!(cache.append_member(10, 99), Err(StoreError::UnknownUser(99)));
        assert_eq!(cache.append_member(99, 3), Err(StoreError::UnknownChat(99)));

        cache.remove_member(10, 3).unwrap();
        assert_eq!(cache.remove_member(10, 3), Err(StoreError::UnknownUser(3)));
    }

    #[test]
    fn unread_counter_floors_at_zero() {
        let mut cache = cache_with_chat();
        assert_eq!(cache.decrement_unread(10), Some(0));
        assert_eq!(cache.increment_unread(10), Some(1));
        assert_eq!(cache.decrement_unread(10), Some(0));
        assert_eq!(cache.decrement_unread(10), Some(0));
        assert_eq!(cache.increment_unread(99), None);
    }

    #[test]
    fn chat_ordering_sorts_by_last_message_with_deterministic_ties() {
        let mut cache = SessionCache::empty(1);
        cache.append_user(user(1, "me", None));
        for id in [10, 11, 12, 13] {
            cache.append_chat(chat(id, ChatKind::Group, &[1])).unwrap();
        }
        cache.append_message(message(1, 11, 1, 500)).unwrap();
        cache.append_message(message(2, 12, 1, 900)).unwrap();
        // Same timestamp as chat 11's last message: tie broken by chat id.
        cache.append_message(message(3, 13, 1, 500)).unwrap();

        assert_eq!(cache.chat_ordering(), vec![12, 11, 13, 10]);
    }

    #[test]
    fn empty_chats_order_by_id_at_the_end() {
        let mut cache = SessionCache::empty(1);
        cache.append_user(user(1, "me", None));
        for id in [7, 3, 5] {
            cache.append_chat(chat(id, ChatKind::Group, &[1])).unwrap();
        }
        assert_eq!(cache.chat_ordering(), vec![3, 5, 7]);
    }

    #[test]
    fn user_ordering_puts_online_members_first() {
        let mut cache = SessionCache::empty(1);
        cache.append_user(user(1, "me", Some(300)));
        cache.append_user(user(2, "online", None));
        cache.append_user(user(3, "older", Some(100)));
        cache.append_user(user(4, "also-online", None));
        cache
            .append_chat(chat(10, ChatKind::Group, &[1, 2, 3, 4]))
            .unwrap();

        assert_eq!(cache.user_ordering(10), vec![2, 4, 3, 1]);
        assert_eq!(cache.online_members(10), 2);
        assert!(cache.user_ordering(99).is_empty());
    }

    #[test]
    fn private_chat_lookup_skips_self_and_group_chats() {
        let mut cache = cache_with_chat();
        cache.append_user(user(3, "third", None));
        cache
            .append_chat(chat(11, ChatKind::Group, &[1, 2, 3]))
            .unwrap();

        assert_eq!(cache.private_chat_with(2), Some(10));
        assert_eq!(cache.private_chat_with(3), None);
        assert_eq!(cache.private_chat_with(1), None);
    }
}

use async_trait::async_trait;

use crate::state::{ChatId, ChatPayload, Message, User, UserId};

/// Paginated history / lookup API, the engine's read-side collaborator.
/// Implementations map failures to empty results; nothing here may panic
/// or return an error that would crash the engine.
#[async_trait]
pub trait FetchService: Send + Sync + 'static {
    /// One page of a chat's history, newest-first. Empty on failure and
    /// when the history is exhausted.
    async fn chat_messages(&self, chat_id: ChatId, page: u32) -> Vec<Message>;

    async fn user(&self, user_id: UserId) -> Option<User>;

    async fn chat(&self, chat_id: ChatId) -> Option<ChatPayload>;

    /// Messages in `chat_id` not yet read by `user_id`.
    async fn unread_count(&self, chat_id: ChatId, user_id: UserId) -> u32;

    async fn user_chats(&self, user_id: UserId) -> Vec<ChatPayload>;
}

/// Outbound half of the realtime channel. The transport implements this;
/// the engine never waits for a reply (server echoes come back as inbound
/// events).
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: &'static str, payload: serde_json::Value);
}

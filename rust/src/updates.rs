use crate::actions::AppAction;
use crate::events::ServerEvent;
use crate::state::{ChatId, ChatPayload, Message, MessageId, Timestamp, User, UserId};

/// Change notifications for the renderer, one per reconciled mutation,
/// delivered in reconciliation order. `rev` is a monotonic revision so a
/// renderer can drop stale redraws after pulling a full snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum AppUpdate {
    /// The cache was emptied or replaced (login, restore, logout).
    SessionReset {
        rev: u64,
        current_user: Option<UserId>,
    },
    ChatAdded { rev: u64, chat_id: ChatId },
    ChatRemoved {
        rev: u64,
        chat_id: ChatId,
        /// The removed chat was the open one; the renderer must clear focus.
        was_active: bool,
    },
    ChatsReordered { rev: u64, ordering: Vec<ChatId> },
    UnreadChanged {
        rev: u64,
        chat_id: ChatId,
        unread: u32,
    },
    MessageInserted {
        rev: u64,
        chat_id: ChatId,
        message_id: MessageId,
    },
    /// Older history was merged in front of the cached window.
    HistoryExtended {
        rev: u64,
        chat_id: ChatId,
        inserted: usize,
        exhausted: bool,
    },
    MessageUpdated {
        rev: u64,
        chat_id: ChatId,
        message_id: MessageId,
    },
    MessageRemoved {
        rev: u64,
        chat_id: ChatId,
        message_id: MessageId,
    },
    MembersChanged { rev: u64, chat_id: ChatId },
    PresenceChanged {
        rev: u64,
        user_id: UserId,
        last_online: Option<Timestamp>,
    },
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::SessionReset { rev, .. } => *rev,
            AppUpdate::ChatAdded { rev, .. } => *rev,
            AppUpdate::ChatRemoved { rev, .. } => *rev,
            AppUpdate::ChatsReordered { rev, .. } => *rev,
            AppUpdate::UnreadChanged { rev, .. } => *rev,
            AppUpdate::MessageInserted { rev, .. } => *rev,
            AppUpdate::HistoryExtended { rev, .. } => *rev,
            AppUpdate::MessageUpdated { rev, .. } => *rev,
            AppUpdate::MessageRemoved { rev, .. } => *rev,
            AppUpdate::MembersChanged { rev, .. } => *rev,
            AppUpdate::PresenceChanged { rev, .. } => *rev,
        }
    }
}

/// Everything the actor loop consumes: UI actions, decoded realtime
/// events, and results of out-of-band fetches.
#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Server(ServerEvent),
    Internal(InternalEvent),
}

/// Fetch results are stamped with the session generation they were issued
/// under. The generation bumps on every login, restore and logout, so a
/// result that outlives its session is recognized and dropped instead of
/// landing in the next user's cache.
#[derive(Debug)]
pub enum InternalEvent {
    /// Out-of-band hydration result for one chat (initial load and
    /// `add_chat` share this path).
    ChatHydrated {
        session: u64,
        chat: ChatPayload,
        unread: u32,
        /// First history page, newest-first as fetched.
        messages: Vec<Message>,
        /// Member records resolved ahead of the chat itself.
        users: Vec<User>,
    },
    /// Page fetched by the pagination controller, newest-first. An empty
    /// page means the history is exhausted.
    OlderMessages {
        session: u64,
        chat_id: ChatId,
        messages: Vec<Message>,
    },
}

impl InternalEvent {
    pub fn session(&self) -> u64 {
        match self {
            InternalEvent::ChatHydrated { session, .. } => *session,
            InternalEvent::OlderMessages { session, .. } => *session,
        }
    }
}

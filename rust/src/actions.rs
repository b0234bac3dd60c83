use crate::state::{ChatId, MessageId, UserId};

/// Everything the UI layer may ask the engine to do. Dispatched onto the
/// actor channel and handled one at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    // Session
    Login { user_id: UserId },
    /// Rehydrate from the persisted snapshot instead of refetching.
    RestoreSession { user_id: UserId },
    Logout,

    // Focus
    OpenChat { chat_id: ChatId },
    CloseChat,

    // Reads
    MarkMessageViewed {
        chat_id: ChatId,
        message_id: MessageId,
    },

    // Outgoing messages
    SendMessage { chat_id: ChatId, text: String },
    SendReply {
        chat_id: ChatId,
        text: String,
        reply_to: MessageId,
    },
    SendServiceMessage { chat_id: ChatId, text: String },
    EditMessage {
        message_id: MessageId,
        text: String,
    },
    DeleteMessage { message_id: MessageId },

    // Chat management
    CreateGroup { title: String },
    CreatePrivate { user_id: UserId },
    JoinChat {
        chat_id: ChatId,
        user_id: Option<UserId>,
    },
    LeaveChat { chat_id: ChatId },

    // History
    LoadOlderMessages { chat_id: ChatId },

    // Presence
    SetOnline,
    SetOffline,
}

impl AppAction {
    /// Log-safe action tag (no message bodies).
    pub fn tag(&self) -> &'static str {
        match self {
            AppAction::Login { .. } => "Login",
            AppAction::RestoreSession { .. } => "RestoreSession",
            AppAction::Logout => "Logout",
            AppAction::OpenChat { .. } => "OpenChat",
            AppAction::CloseChat => "CloseChat",
            AppAction::MarkMessageViewed { .. } => "MarkMessageViewed",
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::SendReply { .. } => "SendReply",
            AppAction::SendServiceMessage { .. } => "SendServiceMessage",
            AppAction::EditMessage { .. } => "EditMessage",
            AppAction::DeleteMessage { .. } => "DeleteMessage",
            AppAction::CreateGroup { .. } => "CreateGroup",
            AppAction::CreatePrivate { .. } => "CreatePrivate",
            AppAction::JoinChat { .. } => "JoinChat",
            AppAction::LeaveChat { .. } => "LeaveChat",
            AppAction::LoadOlderMessages { .. } => "LoadOlderMessages",
            AppAction::SetOnline => "SetOnline",
            AppAction::SetOffline => "SetOffline",
        }
    }
}

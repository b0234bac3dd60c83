use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::{ChatId, Message, MessageId, Timestamp, User, UserId};

/// Inbound realtime events, after payload decoding. Delivery is
/// at-least-once and unordered across event kinds; every transition in
/// the reconciler must therefore tolerate references to entities the
/// cache no longer holds.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Message(Message),
    EditMessage {
        chat_id: ChatId,
        message_id: MessageId,
        text: String,
        edited_at: Timestamp,
    },
    DeleteMessage {
        chat_id: ChatId,
        message_id: MessageId,
    },
    /// Read receipt: `user_id` acknowledged viewing the message.
    UpdateView {
        chat_id: ChatId,
        message_id: MessageId,
        user_id: UserId,
    },
    /// Announces a chat this user was added to; membership, unread count
    /// and the first history page are fetched out-of-band.
    AddChat {
        chat_id: ChatId,
    },
    RemoveChat {
        chat_id: ChatId,
    },
    AddMember {
        chat_id: ChatId,
        user: User,
    },
    RemoveMember {
        chat_id: ChatId,
        user_id: UserId,
    },
    UpdateUserStatus {
        user_id: UserId,
        last_online: Option<Timestamp>,
    },
}

fn decode<T: DeserializeOwned>(name: &str, payload: Value) -> Option<T> {
    match serde_json::from_value(payload) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(event = name, error = %e, "malformed server event payload");
            None
        }
    }
}

impl ServerEvent {
    /// Maps a named transport event to a typed variant. Unknown names and
    /// malformed payloads yield `None`; they are logged and skipped, never
    /// an error that would halt processing of later events.
    pub fn parse(name: &str, payload: Value) -> Option<Self> {
        let event = match name {
            "message" => Self::Message(decode(name, payload)?),
            "edit_message" => {
                #[derive(Deserialize)]
                struct P {
                    chat_id: ChatId,
                    message_id: MessageId,
                    text: String,
                    edited_at: Timestamp,
                }
                let p: P = decode(name, payload)?;
                Self::EditMessage {
                    chat_id: p.chat_id,
                    message_id: p.message_id,
                    text: p.text,
                    edited_at: p.edited_at,
                }
            }
            "delete_message" => {
                #[derive(Deserialize)]
                struct P {
                    chat_id: ChatId,
                    message_id: MessageId,
                }
                let p: P = decode(name, payload)?;
                Self::DeleteMessage {
                    chat_id: p.chat_id,
                    message_id: p.message_id,
                }
            }
            "update_view" => {
                #[derive(Deserialize)]
                struct P {
                    chat_id: ChatId,
                    message_id: MessageId,
                    user_id: UserId,
                }
                let p: P = decode(name, payload)?;
                Self::UpdateView {
                    chat_id: p.chat_id,
                    message_id: p.message_id,
                    user_id: p.user_id,
                }
            }
            "add_chat" => {
                #[derive(Deserialize)]
                struct P {
                    chat_id: ChatId,
                }
                let p: P = decode(name, payload)?;
                Self::AddChat { chat_id: p.chat_id }
            }
            "remove_chat" => {
                #[derive(Deserialize)]
                struct P {
                    chat_id: ChatId,
                }
                let p: P = decode(name, payload)?;
                Self::RemoveChat { chat_id: p.chat_id }
            }
            "add_member" => {
                #[derive(Deserialize)]
                struct P {
                    chat_id: ChatId,
                    user: User,
                }
                let p: P = decode(name, payload)?;
                Self::AddMember {
                    chat_id: p.chat_id,
                    user: p.user,
                }
            }
            "remove_member" => {
                #[derive(Deserialize)]
                struct P {
                    chat_id: ChatId,
                    user_id: UserId,
                }
                let p: P = decode(name, payload)?;
                Self::RemoveMember {
                    chat_id: p.chat_id,
                    user_id: p.user_id,
                }
            }
            "update_user_status" => {
                #[derive(Deserialize)]
                struct P {
                    user_id: UserId,
                    last_online: Option<Timestamp>,
                }
                let p: P = decode(name, payload)?;
                Self::UpdateUserStatus {
                    user_id: p.user_id,
                    last_online: p.last_online,
                }
            }
            other => {
                tracing::debug!(event = other, "ignoring unknown server event");
                return None;
            }
        };
        Some(event)
    }
}

/// Outbound emissions for local actions. One tagged enum instead of a
/// subtype-per-kind hierarchy; `serialize_outgoing` is the single place
/// that knows the wire names and payload shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingEvent {
    Post { chat_id: ChatId, text: String },
    Reply {
        chat_id: ChatId,
        text: String,
        reply_to: MessageId,
    },
    Service { chat_id: ChatId, text: String },
    Edit {
        message_id: MessageId,
        text: String,
    },
    Delete { message_id: MessageId },
    /// Local read acknowledgement for a message the user observed.
    View { message_id: MessageId },
    JoinChat {
        chat_id: ChatId,
        /// Present when inviting another user rather than joining oneself.
        user_id: Option<UserId>,
    },
    LeaveChat { chat_id: ChatId },
    CreateGroup { title: String },
    CreatePrivate { user_id: UserId },
    Online,
    Offline,
}

fn utc_stamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

pub fn serialize_outgoing(event: &OutgoingEvent) -> (&'static str, Value) {
    match event {
        OutgoingEvent::Post { chat_id, text } => (
            "message",
            json!({ "chat_id": chat_id, "text": text, "created_at": utc_stamp() }),
        ),
        OutgoingEvent::Reply {
            chat_id,
            text,
            reply_to,
        } => (
            "message",
            json!({
                "chat_id": chat_id,
                "text": text,
                "reply_to": reply_to,
                "created_at": utc_stamp(),
            }),
        ),
        OutgoingEvent::Service { chat_id, text } => (
            "message",
            json!({
                "chat_id": chat_id,
                "text": text,
                "is_service": true,
                "created_at": utc_stamp(),
            }),
        ),
        OutgoingEvent::Edit { message_id, text } => (
            "edit_message",
            json!({ "message_id": message_id, "text": text, "edited_at": utc_stamp() }),
        ),
        OutgoingEvent::Delete { message_id } => {
            ("delete_message", json!({ "message_id": message_id }))
        }
        OutgoingEvent::View { message_id } => ("add_view", json!({ "message_id": message_id })),
        OutgoingEvent::JoinChat { chat_id, user_id } => {
            let mut payload = json!({ "chat_id": chat_id });
            if let Some(user_id) = user_id {
                payload["user_id"] = json!(user_id);
            }
            ("join_chat", payload)
        }
        OutgoingEvent::LeaveChat { chat_id } => ("leave_chat", json!({ "chat_id": chat_id })),
        OutgoingEvent::CreateGroup { title } => ("create_group", json!({ "title": title })),
        OutgoingEvent::CreatePrivate { user_id } => {
            ("create_private", json!({ "user_id": user_id }))
        }
        OutgoingEvent::Online => ("is_online", json!({})),
        OutgoingEvent::Offline => ("is_offline", json!({})),
    }
}

// Realtime event reconciliation: one atomic transition per event.
//
// Delivery is at-least-once and unordered across event kinds, so every
// transition treats a missing chat/message/user as a silent no-op. No
// handler may fail in a way that halts processing of later events.

use crate::events::{OutgoingEvent, ServerEvent};
use crate::state::{ChatId, Message, MessageId, Timestamp, User, UserId};
use crate::updates::AppUpdate;

use super::AppCore;

impl AppCore {
    pub(super) fn apply_server_event(&mut self, event: ServerEvent) {
        if self.cache.is_none() {
            tracing::debug!("server event before login dropped");
            return;
        }
        match event {
            ServerEvent::Message(message) => self.on_message(message),
            ServerEvent::EditMessage {
                chat_id,
                message_id,
                text,
                edited_at,
            } => self.on_edit_message(chat_id, message_id, text, edited_at),
            ServerEvent::DeleteMessage {
                chat_id,
                message_id,
            } => self.on_delete_message(chat_id, message_id),
            ServerEvent::UpdateView {
                chat_id,
                message_id,
                user_id,
            } => self.on_update_view(chat_id, message_id, user_id),
            ServerEvent::AddChat { chat_id } => self.on_add_chat(chat_id),
            ServerEvent::RemoveChat { chat_id } => self.on_remove_chat(chat_id),
            ServerEvent::AddMember { chat_id, user } => self.on_add_member(chat_id, user),
            ServerEvent::RemoveMember { chat_id, user_id } => {
                self.on_remove_member(chat_id, user_id);
            }
            ServerEvent::UpdateUserStatus {
                user_id,
                last_online,
            } => self.on_update_user_status(user_id, last_online),
        }
    }

    fn on_message(&mut self, message: Message) {
        let chat_id = message.chat;
        let message_id = message.id;
        // Messages for the open chat are read-eligible immediately and do
        // not count as unread.
        let active = self.active_chat == Some(chat_id);
        let Some(cache) = self.cache.as_mut() else { return };
        if let Err(e) = cache.append_message(message) {
            tracing::debug!(chat_id, message_id, error = %e, "message event dropped");
            return;
        }
        let unread = if active {
            None
        } else {
            cache.increment_unread(chat_id)
        };
        self.persist_and_commit();
        self.push_update(|rev| AppUpdate::MessageInserted {
            rev,
            chat_id,
            message_id,
        });
        if let Some(unread) = unread {
            self.push_update(|rev| AppUpdate::UnreadChanged {
                rev,
                chat_id,
                unread,
            });
        }
        self.push_reordered();
    }

    fn on_edit_message(
        &mut self,
        chat_id: ChatId,
        message_id: MessageId,
        text: String,
        edited_at: Timestamp,
    ) {
        let Some(cache) = self.cache.as_mut() else { return };
        let Some(message) = cache.message_mut(chat_id, message_id) else {
            tracing::debug!(chat_id, message_id, "edit for unknown message dropped");
            return;
        };
        message.text = text;
        message.edited_at = Some(edited_at);
        self.persist_and_commit();
        self.push_update(|rev| AppUpdate::MessageUpdated {
            rev,
            chat_id,
            message_id,
        });
    }

    fn on_delete_message(&mut self, chat_id: ChatId, message_id: MessageId) {
        let Some(cache) = self.cache.as_mut() else { return };
        let current_user = cache.current_user;
        let Some(message) = cache.message(chat_id, message_id) else {
            tracing::debug!(chat_id, message_id, "delete for unknown message dropped");
            return;
        };
        // A message the user never read leaves the unread counter with it.
        let unread = if !message.seen_by_user(current_user) {
            cache.decrement_unread(chat_id)
        } else {
            None
        };
        let _ = cache.remove_message(chat_id, message_id);
        self.persist_and_commit();
        self.push_update(|rev| AppUpdate::MessageRemoved {
            rev,
            chat_id,
            message_id,
        });
        if let Some(unread) = unread {
            self.push_update(|rev| AppUpdate::UnreadChanged {
                rev,
                chat_id,
                unread,
            });
        }
        self.push_reordered();
    }

    fn on_update_view(&mut self, chat_id: ChatId, message_id: MessageId, user_id: UserId) {
        let Some(cache) = self.cache.as_mut() else { return };
        let Some(message) = cache.message_mut(chat_id, message_id) else {
            tracing::debug!(chat_id, message_id, "view receipt for unknown message dropped");
            return;
        };
        // Receipts can be redelivered; seen_by is a set.
        if message.seen_by_user(user_id) {
            return;
        }
        message.seen_by.push(user_id);
        self.persist_and_commit();
        self.push_update(|rev| AppUpdate::MessageUpdated {
            rev,
            chat_id,
            message_id,
        });
    }

    fn on_add_chat(&mut self, chat_id: ChatId) {
        let already_cached = self
            .cache
            .as_ref()
            .is_some_and(|c| c.chat(chat_id).is_some());
        if already_cached {
            tracing::debug!(chat_id, "add_chat for cached chat dropped");
            return;
        }
        // Membership, unread count and the first page come out-of-band;
        // the chat lands in the cache once ChatHydrated arrives.
        self.spawn_chat_hydration(chat_id);
    }

    fn on_remove_chat(&mut self, chat_id: ChatId) {
        let Some(cache) = self.cache.as_mut() else { return };
        if cache.remove_chat(chat_id).is_err() {
            tracing::debug!(chat_id, "remove_chat for unknown chat dropped");
            return;
        }
        let was_active = self.active_chat == Some(chat_id);
        if was_active {
            self.active_chat = None;
        }
        self.paging_in_flight.remove(&chat_id);
        self.history_exhausted.remove(&chat_id);
        self.persist_and_commit();
        self.push_update(|rev| AppUpdate::ChatRemoved {
            rev,
            chat_id,
            was_active,
        });
        self.push_reordered();
    }

    fn on_add_member(&mut self, chat_id: ChatId, user: User) {
        let Some(cache) = self.cache.as_mut() else { return };
        let user_id = user.id;
        if !cache.user_exists(user_id) {
            cache.append_user(user);
        }
        if let Err(e) = cache.append_member(chat_id, user_id) {
            tracing::debug!(chat_id, user_id, error = %e, "add_member dropped");
            return;
        }
        self.persist_and_commit();
        self.push_update(|rev| AppUpdate::MembersChanged { rev, chat_id });
    }

    fn on_remove_member(&mut self, chat_id: ChatId, user_id: UserId) {
        let Some(cache) = self.cache.as_mut() else { return };
        if let Err(e) = cache.remove_member(chat_id, user_id) {
            tracing::debug!(chat_id, user_id, error = %e, "remove_member dropped");
            return;
        }
        self.persist_and_commit();
        self.push_update(|rev| AppUpdate::MembersChanged { rev, chat_id });
    }

    fn on_update_user_status(&mut self, user_id: UserId, last_online: Option<Timestamp>) {
        let Some(cache) = self.cache.as_mut() else { return };
        let Some(user) = cache.user_mut(user_id) else {
            tracing::debug!(user_id, "presence for unknown user dropped");
            return;
        };
        user.last_online = last_online;
        self.persist_and_commit();
        self.push_update(|rev| AppUpdate::PresenceChanged {
            rev,
            user_id,
            last_online,
        });
    }

    /// Local read acknowledgement (`add_view`): the user observed a
    /// message in the open chat. Idempotent; replays neither re-emit nor
    /// double-decrement.
    pub(super) fn mark_message_viewed(&mut self, chat_id: ChatId, message_id: MessageId) {
        let Some(cache) = self.cache.as_mut() else { return };
        let current_user = cache.current_user;
        let Some(message) = cache.message_mut(chat_id, message_id) else {
            tracing::debug!(chat_id, message_id, "view for unknown message dropped");
            return;
        };
        if message.seen_by_user(current_user) {
            return;
        }
        message.seen_by.push(current_user);
        let unread = cache.decrement_unread(chat_id);
        self.emit_outgoing(OutgoingEvent::View { message_id });
        self.persist_and_commit();
        self.push_update(|rev| AppUpdate::MessageUpdated {
            rev,
            chat_id,
            message_id,
        });
        if let Some(unread) = unread {
            self.push_update(|rev| AppUpdate::UnreadChanged {
                rev,
                chat_id,
                unread,
            });
        }
    }
}

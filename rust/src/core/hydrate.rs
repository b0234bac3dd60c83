// Session bootstrap and out-of-band chat hydration.
//
// The actor never awaits: fetches run on the runtime and come back through
// the core channel as `InternalEvent::ChatHydrated`, so hydration results
// interleave with realtime events at message granularity.

use std::sync::Arc;

use crate::api::FetchService;
use crate::state::{Chat, ChatId, ChatKind, ChatPayload, Message, SessionCache, User, UserId};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

use super::{persist, AppCore};

impl AppCore {
    /// Login / restore entry point. A restore replays the persisted
    /// snapshot; when none exists (or it is for another user) it degrades
    /// to a fresh initial load.
    pub(super) fn start_session(&mut self, user_id: UserId, restore: bool) {
        // New generation: anything still in flight for the previous
        // session is stale from here on.
        self.session += 1;
        self.active_chat = None;
        self.paging_in_flight.clear();
        self.history_exhausted.clear();

        if restore {
            if let Some(cache) = persist::load(&self.data_dir, user_id) {
                tracing::info!(user_id, chats = cache.chats().count(), "session restored");
                self.cache = Some(cache);
                self.commit_snapshot();
                self.push_update(|rev| AppUpdate::SessionReset {
                    rev,
                    current_user: Some(user_id),
                });
                self.push_reordered();
                return;
            }
            tracing::info!(user_id, "no snapshot to restore, loading fresh");
        }

        self.cache = Some(SessionCache::empty(user_id));
        self.commit_snapshot();
        self.push_update(|rev| AppUpdate::SessionReset {
            rev,
            current_user: Some(user_id),
        });
        self.spawn_initial_load(user_id);
    }

    fn spawn_initial_load(&self, user_id: UserId) {
        let session = self.session;
        let api = self.api.clone();
        let sender = self.core_sender.clone();
        self.runtime.spawn(async move {
            let chats = api.user_chats(user_id).await;
            tracing::debug!(user_id, count = chats.len(), "initial chat list fetched");
            for chat in chats {
                let event = hydrate_chat(api.clone(), session, user_id, chat).await;
                let _ = sender.send(CoreMsg::Internal(event));
            }
        });
    }

    /// Hydrates a single chat announced by `add_chat`, whose event carries
    /// only the id.
    pub(super) fn spawn_chat_hydration(&self, chat_id: ChatId) {
        let Some(cache) = self.cache.as_ref() else { return };
        let user_id = cache.current_user;
        let session = self.session;
        let api = self.api.clone();
        let sender = self.core_sender.clone();
        self.runtime.spawn(async move {
            let Some(chat) = api.chat(chat_id).await else {
                tracing::warn!(chat_id, "announced chat could not be fetched");
                return;
            };
            let event = hydrate_chat(api, session, user_id, chat).await;
            let _ = sender.send(CoreMsg::Internal(event));
        });
    }

    pub(super) fn on_chat_hydrated(
        &mut self,
        chat: ChatPayload,
        unread: u32,
        messages: Vec<Message>,
        users: Vec<User>,
    ) {
        let Some(cache) = self.cache.as_mut() else { return };
        if cache.chat(chat.id).is_some() {
            tracing::debug!(chat_id = chat.id, "hydration for cached chat dropped");
            return;
        }
        let chat_id = chat.id;
        let current_user = cache.current_user;

        for user in users {
            if !cache.user_exists(user.id) {
                cache.append_user(user);
            }
        }

        // A private chat is titled after the peer; groups keep the title
        // the server gave them.
        let title = match chat.kind {
            ChatKind::Private => chat
                .members
                .iter()
                .find(|id| **id != current_user)
                .and_then(|id| cache.user(*id))
                .map(|u| u.username.clone())
                .unwrap_or(chat.title),
            ChatKind::Group => chat.title,
        };

        if let Err(e) = cache.append_chat(Chat {
            id: chat_id,
            kind: chat.kind,
            title,
            members: chat.members,
            unread_count: unread,
        }) {
            tracing::debug!(chat_id, error = %e, "hydrated chat dropped");
            return;
        }

        // The page arrives newest-first; append in reverse to keep the
        // sequence oldest-first.
        for message in messages.into_iter().rev() {
            let message_id = message.id;
            if let Err(e) = cache.append_message(message) {
                tracing::debug!(chat_id, message_id, error = %e, "hydrated message dropped");
            }
        }

        self.persist_and_commit();
        self.push_update(|rev| AppUpdate::ChatAdded { rev, chat_id });
        self.push_reordered();
    }
}

/// Resolves everything one chat needs before it can enter the cache: the
/// unread counter, the first history page, and user records for members
/// and message authors alike (authors may have already left the chat).
async fn hydrate_chat(
    api: Arc<dyn FetchService>,
    session: u64,
    user_id: UserId,
    chat: ChatPayload,
) -> InternalEvent {
    let unread = api.unread_count(chat.id, user_id).await;
    let messages = api.chat_messages(chat.id, 1).await;

    let mut wanted: Vec<UserId> = chat.members.clone();
    for message in &messages {
        if !wanted.contains(&message.from_user) {
            wanted.push(message.from_user);
        }
    }
    let mut users = Vec::with_capacity(wanted.len());
    for id in wanted {
        match api.user(id).await {
            Some(user) => users.push(user),
            None => tracing::warn!(user_id = id, chat_id = chat.id, "member lookup failed"),
        }
    }

    InternalEvent::ChatHydrated {
        session,
        chat,
        unread,
        messages,
        users,
    }
}

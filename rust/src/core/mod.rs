mod config;
mod hydrate;
mod paging;
mod persist;
mod reconcile;

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use flume::Sender;

use crate::actions::AppAction;
use crate::api::{EventSink, FetchService};
use crate::events::{serialize_outgoing, OutgoingEvent};
use crate::state::{ChatId, SessionCache};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

/// The engine's single-threaded actor: owns the session cache and applies
/// one message at a time, to completion, before the next is processed.
/// Realtime events, pagination responses and local actions all arrive
/// through the same channel, so no interleaving can observe a partially
/// applied transition.
pub struct AppCore {
    cache: Option<SessionCache>,
    rev: u64,
    /// Session generation; bumped on login, restore and logout. Fetch
    /// results carry the generation they were issued under and stale ones
    /// are dropped on arrival.
    session: u64,
    active_chat: Option<ChatId>,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<Option<SessionCache>>>,

    data_dir: String,
    config: config::AppConfig,
    runtime: tokio::runtime::Runtime,

    api: Arc<dyn FetchService>,
    sink: Arc<dyn EventSink>,

    // Pagination bookkeeping: at most one in-flight page per chat, and no
    // refetch once the server has returned an empty page.
    paging_in_flight: HashSet<ChatId>,
    history_exhausted: HashSet<ChatId>,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<Option<SessionCache>>>,
        api: Arc<dyn FetchService>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let config = config::load_app_config(&data_dir);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("tokio runtime");

        let this = Self {
            cache: None,
            rev: 0,
            session: 0,
            active_chat: None,
            update_sender,
            core_sender,
            shared_state,
            data_dir,
            config,
            runtime,
            api,
            sink,
            paging_in_flight: HashSet::new(),
            history_exhausted: HashSet::new(),
        };
        this.commit_snapshot();
        this
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => {
                tracing::debug!(action = action.tag(), "handling action");
                self.handle_action(action);
            }
            CoreMsg::Server(event) => self.apply_server_event(event),
            CoreMsg::Internal(event) => self.handle_internal(event),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::Login { user_id } => self.start_session(user_id, false),
            AppAction::RestoreSession { user_id } => self.start_session(user_id, true),
            AppAction::Logout => self.end_session(),

            AppAction::OpenChat { chat_id } => self.open_chat(chat_id),
            AppAction::CloseChat => self.active_chat = None,

            AppAction::MarkMessageViewed {
                chat_id,
                message_id,
            } => self.mark_message_viewed(chat_id, message_id),

            AppAction::SendMessage { chat_id, text } => {
                self.emit_outgoing(OutgoingEvent::Post { chat_id, text });
            }
            AppAction::SendReply {
                chat_id,
                text,
                reply_to,
            } => {
                self.emit_outgoing(OutgoingEvent::Reply {
                    chat_id,
                    text,
                    reply_to,
                });
            }
            AppAction::SendServiceMessage { chat_id, text } => {
                self.emit_outgoing(OutgoingEvent::Service { chat_id, text });
            }
            AppAction::EditMessage { message_id, text } => {
                self.emit_outgoing(OutgoingEvent::Edit { message_id, text });
            }
            AppAction::DeleteMessage { message_id } => {
                self.emit_outgoing(OutgoingEvent::Delete { message_id });
            }

            AppAction::CreateGroup { title } => {
                self.emit_outgoing(OutgoingEvent::CreateGroup { title });
            }
            AppAction::CreatePrivate { user_id } => self.create_private(user_id),
            AppAction::JoinChat { chat_id, user_id } => {
                self.emit_outgoing(OutgoingEvent::JoinChat { chat_id, user_id });
            }
            AppAction::LeaveChat { chat_id } => {
                self.emit_outgoing(OutgoingEvent::LeaveChat { chat_id });
            }

            AppAction::LoadOlderMessages { chat_id } => self.load_older_messages(chat_id),

            AppAction::SetOnline => self.emit_outgoing(OutgoingEvent::Online),
            AppAction::SetOffline => self.emit_outgoing(OutgoingEvent::Offline),
        }
    }

    fn handle_internal(&mut self, event: InternalEvent) {
        // A fetch spawned before a logout or user switch may complete
        // after it; its result belongs to a dead session and must not
        // touch the current cache.
        if event.session() != self.session {
            tracing::debug!(
                fetched_for = event.session(),
                current = self.session,
                "stale fetch result dropped"
            );
            return;
        }
        match event {
            InternalEvent::ChatHydrated {
                chat,
                unread,
                messages,
                users,
                ..
            } => self.on_chat_hydrated(chat, unread, messages, users),
            InternalEvent::OlderMessages {
                chat_id, messages, ..
            } => {
                self.on_older_messages(chat_id, messages);
            }
        }
    }

    fn open_chat(&mut self, chat_id: ChatId) {
        let exists = self
            .cache
            .as_ref()
            .is_some_and(|c| c.chat(chat_id).is_some());
        if exists {
            self.active_chat = Some(chat_id);
        } else {
            tracing::debug!(chat_id, "open_chat for unknown chat ignored");
        }
    }

    /// One private chat per peer: re-requesting an existing one is dropped
    /// locally instead of asking the server to create a duplicate.
    fn create_private(&mut self, user_id: crate::state::UserId) {
        if let Some(cache) = self.cache.as_ref() {
            if let Some(existing) = cache.private_chat_with(user_id) {
                tracing::debug!(user_id, chat_id = existing, "private chat already exists");
                return;
            }
        }
        self.emit_outgoing(OutgoingEvent::CreatePrivate { user_id });
    }

    fn end_session(&mut self) {
        // The snapshot was persisted after the last mutation; just drop the
        // in-memory cache. Bumping the generation invalidates every fetch
        // still in flight for this session.
        self.session += 1;
        self.cache = None;
        self.active_chat = None;
        self.paging_in_flight.clear();
        self.history_exhausted.clear();
        self.commit_snapshot();
        self.push_update(|rev| AppUpdate::SessionReset {
            rev,
            current_user: None,
        });
    }

    fn emit_outgoing(&self, event: OutgoingEvent) {
        let (name, payload) = serialize_outgoing(&event);
        self.sink.emit(name, payload);
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.rev
    }

    fn commit_snapshot(&self) {
        match self.shared_state.write() {
            Ok(mut g) => *g = self.cache.clone(),
            Err(poison) => *poison.into_inner() = self.cache.clone(),
        }
    }

    /// Durability contract: every mutation is written out before control
    /// returns to the actor loop.
    fn persist_and_commit(&mut self) {
        if let Some(cache) = &self.cache {
            persist::save(&self.data_dir, cache);
        }
        self.commit_snapshot();
    }

    fn push_update(&mut self, make: impl FnOnce(u64) -> AppUpdate) {
        let rev = self.next_rev();
        let _ = self.update_sender.send(make(rev));
    }

    fn push_reordered(&mut self) {
        let Some(cache) = &self.cache else { return };
        let ordering = cache.chat_ordering();
        self.push_update(|rev| AppUpdate::ChatsReordered { rev, ordering });
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex, RwLock};

    use async_trait::async_trait;
    use flume::Receiver;

    use super::AppCore;
    use crate::api::{EventSink, FetchService};
    use crate::state::{
        ChatId, ChatKind, ChatPayload, Message, MessageId, Timestamp, User, UserId,
    };
    use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

    pub struct NullApi;

    #[async_trait]
    impl FetchService for NullApi {
        async fn chat_messages(&self, _chat_id: ChatId, _page: u32) -> Vec<Message> {
            vec![]
        }
        async fn user(&self, _user_id: UserId) -> Option<User> {
            None
        }
        async fn chat(&self, _chat_id: ChatId) -> Option<ChatPayload> {
            None
        }
        async fn unread_count(&self, _chat_id: ChatId, _user_id: UserId) -> u32 {
            0
        }
        async fn user_chats(&self, _user_id: UserId) -> Vec<ChatPayload> {
            vec![]
        }
    }

    #[derive(Default)]
    pub struct RecordingSink {
        pub events: Mutex<Vec<(String, serde_json::Value)>>,
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: &'static str, payload: serde_json::Value) {
            self.events.lock().unwrap().push((event.to_string(), payload));
        }
    }

    pub fn test_core(
        data_dir: &std::path::Path,
        api: Arc<dyn FetchService>,
        sink: Arc<dyn EventSink>,
    ) -> (AppCore, Receiver<AppUpdate>, Receiver<CoreMsg>) {
        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded();
        let shared = Arc::new(RwLock::new(None));
        let core = AppCore::new(
            update_tx,
            core_tx,
            data_dir.to_string_lossy().into_owned(),
            shared,
            api,
            sink,
        );
        (core, update_rx, core_rx)
    }

    pub fn message(id: MessageId, chat: ChatId, from: UserId, created_at: Timestamp) -> Message {
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

    /// Logs user 1 in and hydrates one chat, the way the initial load and
    /// `add_chat` flows would.
    pub fn seed_chat(
        core: &mut AppCore,
        chat_id: ChatId,
        kind: ChatKind,
        members: &[UserId],
        unread: u32,
        messages: Vec<Message>,
    ) {
        if core.cache.is_none() {
            core.handle_message(CoreMsg::Action(crate::actions::AppAction::Login {
                user_id: 1,
            }));
        }
        let users = members
            .iter()
            .map(|id| User {
                id: *id,
                username: format!("user{id}"),
                last_online: None,
            })
            .collect();
        core.handle_message(CoreMsg::Internal(InternalEvent::ChatHydrated {
            session: core.session,
            chat: ChatPayload {
                id: chat_id,
                kind,
                title: format!("chat {chat_id}"),
                members: members.to_vec(),
            },
            unread,
            messages,
            users,
        }));
    }

    pub fn cache_of(core: &AppCore) -> &crate::state::SessionCache {
        core.cache.as_ref().expect("logged in")
    }

    pub fn set_active(core: &mut AppCore, chat_id: ChatId) {
        core.active_chat = Some(chat_id);
    }
}

pub mod actions;
pub mod api;
mod core;
pub mod events;
mod logging;
pub mod state;
pub mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use flume::{Receiver, Sender};

pub use crate::actions::AppAction;
pub use crate::api::{EventSink, FetchService};
pub use crate::core::AppCore;
pub use crate::events::{serialize_outgoing, OutgoingEvent, ServerEvent};
pub use crate::state::{
    Chat, ChatId, ChatKind, ChatPayload, Message, MessageId, SessionCache, StoreError, Timestamp,
    User, UserId,
};
pub use crate::updates::AppUpdate;

use crate::updates::CoreMsg;

/// Implemented by the UI layer; called once per [`AppUpdate`] on a
/// dedicated listener thread, in reconciliation order.
pub trait Renderer: Send + Sync + 'static {
    fn apply_update(&self, update: AppUpdate);
}

/// Handle to the engine. Owns the actor thread; all methods are cheap
/// channel sends or snapshot reads, safe to call from any thread.
pub struct ChatApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<Option<SessionCache>>>,
}

impl ChatApp {
    /// Spawns the engine. `data_dir` holds config and per-user snapshots;
    /// `api` and `sink` are the transport's two halves.
    pub fn new(data_dir: String, api: Arc<dyn FetchService>, sink: Arc<dyn EventSink>) -> Arc<Self> {
        logging::init_logging();
        tracing::info!(%data_dir, "starting chat engine");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(None));

        let actor_tx = core_tx.clone();
        let actor_state = shared_state.clone();
        std::thread::spawn(move || {
            let mut core = AppCore::new(update_tx, actor_tx, data_dir, actor_state, api, sink);
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
            tracing::debug!("core channel closed, actor exiting");
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
        })
    }

    /// Snapshot of the cache as of the last completed transition. `None`
    /// before login and after logout.
    pub fn state(&self) -> Option<SessionCache> {
        match self.shared_state.read() {
            Ok(guard) => guard.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    /// Feeds one decoded realtime event into the reconciler.
    pub fn ingest(&self, event: ServerEvent) {
        let _ = self.core_tx.send(CoreMsg::Server(event));
    }

    /// Feeds a raw wire event; unknown names and malformed payloads are
    /// logged and dropped.
    pub fn ingest_raw(&self, name: &str, payload: serde_json::Value) {
        if let Some(event) = ServerEvent::parse(name, payload) {
            self.ingest(event);
        }
    }

    /// Starts the single update-forwarding thread. Subsequent calls are
    /// no-ops; the first renderer keeps the stream.
    pub fn listen_for_updates(&self, renderer: Box<dyn Renderer>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("update listener already attached");
            return;
        }
        let update_rx = self.update_rx.clone();
        std::thread::spawn(move || {
            while let Ok(update) = update_rx.recv() {
                renderer.apply_update(update);
            }
            tracing::debug!("update channel closed, listener exiting");
        });
    }
}

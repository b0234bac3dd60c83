// Backward pagination: fetches the next older page behind the cached
// window and merges it in front, deduplicating against realtime arrivals.

use crate::state::{ChatId, Message, StoreError};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

use super::AppCore;

impl AppCore {
    pub(super) fn load_older_messages(&mut self, chat_id: ChatId) {
        let Some(cache) = self.cache.as_ref() else { return };
        if cache.chat(chat_id).is_none() {
            tracing::debug!(chat_id, "pagination for unknown chat ignored");
            return;
        }
        if self.history_exhausted.contains(&chat_id) {
            tracing::debug!(chat_id, "history exhausted, not refetching");
            return;
        }
        // Coalesce repeated scroll triggers into the one in-flight fetch.
        if !self.paging_in_flight.insert(chat_id) {
            tracing::debug!(chat_id, "page fetch already in flight");
            return;
        }

        // The server pages newest-first at a fixed size, so the page behind
        // the cached window is derived from how much is already cached.
        let cached = cache.chat_messages(chat_id).len();
        let page = (cached.div_ceil(self.config.page_size) + 1) as u32;

        let session = self.session;
        let api = self.api.clone();
        let sender = self.core_sender.clone();
        self.runtime.spawn(async move {
            let messages = api.chat_messages(chat_id, page).await;
            let _ = sender.send(CoreMsg::Internal(InternalEvent::OlderMessages {
                session,
                chat_id,
                messages,
            }));
        });
    }

    pub(super) fn on_older_messages(&mut self, chat_id: ChatId, messages: Vec<Message>) {
        self.paging_in_flight.remove(&chat_id);
        let Some(cache) = self.cache.as_mut() else { return };
        if cache.chat(chat_id).is_none() {
            // Chat evicted while the fetch was in flight.
            tracing::debug!(chat_id, "page for evicted chat dropped");
            return;
        }

        if messages.is_empty() {
            self.history_exhausted.insert(chat_id);
            self.push_update(|rev| AppUpdate::HistoryExtended {
                rev,
                chat_id,
                inserted: 0,
                exhausted: true,
            });
            return;
        }

        // Newest-first page, head insertion: each message lands in front of
        // the previous one, leaving the sequence oldest-first. Overlap with
        // already-cached messages is expected and skipped.
        let mut inserted = 0usize;
        for message in messages {
            let message_id = message.id;
            match cache.insert_message(message) {
                Ok(()) => inserted += 1,
                Err(StoreError::DuplicateMessage(..)) => {}
                Err(e) => {
                    tracing::debug!(chat_id, message_id, error = %e, "paged message dropped");
                }
            }
        }

        self.persist_and_commit();
        self.push_update(|rev| AppUpdate::HistoryExtended {
            rev,
            chat_id,
            inserted,
            exhausted: false,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::test_support::{cache_of, message, seed_chat, test_core, NullApi, RecordingSink};
    use crate::actions::AppAction;
    use crate::state::{ChatKind, MessageId, Timestamp};
    use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

    #[test]
    fn older_page_merges_in_front_and_skips_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let (mut core, updates, _rx) = test_core(dir.path(), Arc::new(NullApi), sink);
        seed_chat(
            &mut core,
            10,
            ChatKind::Group,
            &[1, 2],
            0,
            vec![message(6, 10, 2, 600), message(5, 10, 2, 500)],
        );
        while updates.try_recv().is_ok() {}

        // Page overlaps at message 5.
        core.handle_message(CoreMsg::Internal(InternalEvent::OlderMessages {
            session: core.session,
            chat_id: 10,
            messages: vec![
                message(5, 10, 2, 500),
                message(4, 10, 2, 400),
                message(3, 10, 2, 300),
            ],
        }));

        let ids: Vec<MessageId> = cache_of(&core).chat_messages(10).iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3, 4, 5, 6]);
        let stamps: Vec<Timestamp> = cache_of(&core)
            .chat_messages(10)
            .iter()
            .map(|m| m.created_at)
            .collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));

        let seen: Vec<AppUpdate> = updates.try_iter().collect();
        assert!(seen.iter().any(|u| matches!(
            u,
            AppUpdate::HistoryExtended {
                chat_id: 10,
                inserted: 2,
                exhausted: false,
                ..
            }
        )));
    }

    #[test]
    fn empty_page_marks_history_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let (mut core, updates, _rx) = test_core(dir.path(), Arc::new(NullApi), sink);
        seed_chat(&mut core, 10, ChatKind::Group, &[1], 0, vec![message(1, 10, 1, 100)]);
        while updates.try_recv().is_ok() {}

        core.handle_message(CoreMsg::Internal(InternalEvent::OlderMessages {
            session: core.session,
            chat_id: 10,
            messages: vec![],
        }));
        let seen: Vec<AppUpdate> = updates.try_iter().collect();
        assert!(seen.iter().any(|u| matches!(
            u,
            AppUpdate::HistoryExtended {
                chat_id: 10,
                inserted: 0,
                exhausted: true,
                ..
            }
        )));

        // Further scroll triggers never hit the fetch service again.
        core.handle_message(CoreMsg::Action(AppAction::LoadOlderMessages { chat_id: 10 }));
        assert_eq!(cache_of(&core).chat_messages(10).len(), 1);
    }

    #[test]
    fn repeated_scroll_triggers_coalesce_into_one_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let (mut core, _updates, internals) = test_core(dir.path(), Arc::new(NullApi), sink);
        seed_chat(&mut core, 10, ChatKind::Group, &[1], 0, vec![]);

        core.handle_message(CoreMsg::Action(AppAction::LoadOlderMessages { chat_id: 10 }));
        core.handle_message(CoreMsg::Action(AppAction::LoadOlderMessages { chat_id: 10 }));

        // Exactly one fetch result comes back for the two triggers.
        let first = internals
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("page fetch result");
        assert!(matches!(
            first,
            CoreMsg::Internal(InternalEvent::OlderMessages { chat_id: 10, .. })
        ));
        assert!(internals
            .recv_timeout(std::time::Duration::from_millis(200))
            .is_err());
    }

    #[test]
    fn page_for_evicted_chat_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let (mut core, _updates, _rx) = test_core(dir.path(), Arc::new(NullApi), sink);
        seed_chat(&mut core, 10, ChatKind::Group, &[1], 0, vec![]);

        core.handle_message(CoreMsg::Server(crate::events::ServerEvent::RemoveChat {
            chat_id: 10,
        }));
        core.handle_message(CoreMsg::Internal(InternalEvent::OlderMessages {
            session: core.session,
            chat_id: 10,
            messages: vec![message(1, 10, 1, 100)],
        }));
        assert!(cache_of(&core).chat(10).is_none());
        assert!(cache_of(&core).chat_messages(10).is_empty());
    }
}

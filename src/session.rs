//! In-memory session store.
//!
//! Owns one [`ConversationState`] per session. Turns for the same session
//! run one at a time behind that session's async mutex; different
//! sessions never block each other beyond the brief map lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::agent::{Progress, Supervisor, TurnOutput};
use crate::core::ConversationState;

type Slot = Arc<AsyncMutex<ConversationState>>;

/// Session-keyed conversation states driven by one [`Supervisor`].
#[derive(Debug)]
pub struct SessionStore {
    supervisor: Supervisor,
    sessions: Mutex<HashMap<String, Slot>>,
}

impl SessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(supervisor: Supervisor) -> Self {
        Self {
            supervisor,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, session_id: &str) -> Slot {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(sessions.entry(session_id.to_string()).or_insert_with(|| {
            debug!(session = session_id, "session created");
            Arc::new(AsyncMutex::new(ConversationState::new(session_id)))
        }))
    }

    /// Runs one turn for `session_id`, creating the session on first use.
    ///
    /// The new state is committed only when the turn completes.
    pub async fn run_turn(&self, session_id: &str, message: &str, progress: &Progress) -> TurnOutput {
        let slot = self.slot(session_id);
        let mut state = slot.lock().await;
        let outcome = self.supervisor.run_turn(message, &state, progress).await;
        *state = outcome.state;
        outcome.output
    }

    /// Destroys a session. Returns whether it existed.
    pub fn reset(&self, session_id: &str) -> bool {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
            .is_some();
        debug!(session = session_id, removed, "session reset");
        removed
    }

    /// A copy of the session's current state, if it exists.
    pub async fn snapshot(&self, session_id: &str) -> Option<ConversationState> {
        let slot = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()?;
        let state = slot.lock().await;
        Some(state.clone())
    }

    /// Installs `state` under its own session id, replacing any existing one.
    pub fn restore(&self, state: ConversationState) {
        let id = state.session_id.clone();
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(AsyncMutex::new(state)));
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if no session exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ClassificationCache;
    use crate::agent::testing::{Reply, ScriptedProvider, services};
    use crate::core::Speaker;
    use crate::retrieval::InMemoryCatalog;
    use serde_json::json;

    fn store() -> Arc<SessionStore> {
        let provider = Arc::new(
            ScriptedProvider::new()
                .on("classifier", Reply::json(&json!({"is_general_conversation": true})))
                .on(
                    "extractor",
                    Reply::json(&json!({"has_new_filters": false, "filters": {}})),
                )
                .on("general", Reply::Text("Hi there!".into())),
        );
        let supervisor = Supervisor::new(
            services(provider, Arc::new(InMemoryCatalog::default())),
            Arc::new(ClassificationCache::new(8)),
        );
        Arc::new(SessionStore::new(supervisor))
    }

    fn settled(id: &str) -> ConversationState {
        let mut state = ConversationState::new(id);
        state.interview_complete = true;
        state
    }

    #[tokio::test]
    async fn test_turns_commit_per_session() {
        let store = store();
        store.restore(settled("a"));
        store.restore(settled("b"));

        store.run_turn("a", "hello", &Progress::default()).await;
        store.run_turn("a", "hello again", &Progress::default()).await;
        store.run_turn("b", "hey", &Progress::default()).await;

        let a = store.snapshot("a").await.unwrap_or_default();
        let b = store.snapshot("b").await.unwrap_or_default();
        assert_eq!(a.messages.len(), 4);
        assert_eq!(b.messages.len(), 2);
        assert_eq!(a.messages[0].role, Speaker::User);
    }

    #[tokio::test]
    async fn test_same_session_turns_serialize() {
        let store = store();
        store.restore(settled("s"));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store.run_turn("s", &format!("msg {i}"), &Progress::default()).await
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.is_ok());
        }

        let state = store.snapshot("s").await.unwrap_or_default();
        assert_eq!(state.messages.len(), 8);
        for pair in state.messages.chunks(2) {
            assert_eq!(pair[0].role, Speaker::User);
            assert_eq!(pair[1].role, Speaker::Assistant);
        }
    }

    #[tokio::test]
    async fn test_reset_destroys_state() {
        let store = store();
        store.run_turn("s", "", &Progress::default()).await;
        assert_eq!(store.len(), 1);
        assert!(store.reset("s"));
        assert!(store.snapshot("s").await.is_none());
        assert!(!store.reset("s"));
        assert!(store.is_empty());
    }
}

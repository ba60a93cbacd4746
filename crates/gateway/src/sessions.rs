//! Chat session registry.
//!
//! Sessions are keyed by id and each sits behind its own lock, so turns in
//! one session are serialized while different sessions proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use labprompt_core::session::{ChatSession, SessionId};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

pub type SessionHandle = Arc<Mutex<ChatSession>>;

/// Bounded map of live chat sessions. The oldest session is evicted when
/// a new one would exceed the capacity, and each session keeps at most
/// `max_history` turns (0 = unlimited).
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    max_sessions: usize,
    max_history: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize, max_history: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
            max_history,
        }
    }

    /// Start a session and return its id.
    pub async fn create(&self, system_instruction: Option<String>) -> SessionId {
        let session = ChatSession::new(system_instruction).with_max_history(self.max_history);
        let id = session.id.clone();
        let created_at = session.created_at;

        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            // Creation times live behind the per-session locks; sessions that
            // are busy mid-turn are never chosen for eviction.
            let oldest = sessions
                .iter()
                .filter_map(|(id, handle)| handle.try_lock().ok().map(|s| (id.clone(), s.created_at)))
                .min_by_key(|(_, created)| *created)
                .map(|(id, _)| id);
            if let Some(oldest) = oldest {
                debug!(session = %oldest, "Evicting oldest chat session");
                sessions.remove(&oldest);
            }
        }
        sessions.insert(id.clone(), Arc::new(Mutex::new(session)));
        debug!(session = %id, created_at = %created_at, "Chat session started");
        id
    }

    pub async fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    /// End a session. Returns whether it existed.
    pub async fn remove(&self, id: &SessionId) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

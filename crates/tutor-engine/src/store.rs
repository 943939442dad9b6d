use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use tutor_core::ids::LearnerKey;

use crate::error::EngineError;
use crate::session::LearnerSession;

/// In-memory map of learner key to session state.
///
/// Each entry has its own lock. Callers hold it only for synchronous work;
/// it must never be held across an await. At most one turn per key should
/// be in flight: two concurrent turns for the same learner interleave in
/// whatever order their locks are taken.
#[derive(Clone, Default)]
pub struct MemoryStore {
    sessions: Arc<DashMap<LearnerKey, Arc<Mutex<LearnerSession>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the session for `key`.
    pub fn insert(&self, key: LearnerKey, session: LearnerSession) {
        let _ = self.sessions.insert(key, Arc::new(Mutex::new(session)));
    }

    pub fn evict(&self, key: &LearnerKey) -> bool {
        self.sessions.remove(key).is_some()
    }

    pub fn contains(&self, key: &LearnerKey) -> bool {
        self.sessions.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Run `f` with exclusive access to the learner's session.
    pub fn with_session<T>(
        &self,
        key: &LearnerKey,
        f: impl FnOnce(&mut LearnerSession) -> T,
    ) -> Result<T, EngineError> {
        // Clone the Arc so the map shard is released before locking the entry.
        let entry = self
            .sessions
            .get(key)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| EngineError::SessionNotFound(key.clone()))?;
        let mut session = entry.lock();
        Ok(f(&mut session))
    }
}

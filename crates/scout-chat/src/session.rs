//! In-memory session storage.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::error::ChatError;
use crate::types::Session;

/// Sessions keyed by id. Sessions are never evicted; `remove` is the only
/// deletion path.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Session>>, ChatError> {
        self.sessions
            .lock()
            .map_err(|e| ChatError::SessionStore(e.to_string()))
    }

    /// Snapshot of the session, creating an empty one on first use.
    pub fn load_or_create(&self, session_id: &str) -> Result<Session, ChatError> {
        let mut sessions = self.lock()?;
        let session = sessions.entry(session_id.to_string()).or_insert_with(|| {
            debug!(session_id, "Session created");
            Session::new(session_id)
        });
        Ok(session.clone())
    }

    pub fn get(&self, session_id: &str) -> Result<Option<Session>, ChatError> {
        Ok(self.lock()?.get(session_id).cloned())
    }

    pub fn save(&self, session: Session) -> Result<(), ChatError> {
        self.lock()?.insert(session.session_id.clone(), session);
        Ok(())
    }

    /// Returns whether a session was removed.
    pub fn remove(&self, session_id: &str) -> Result<bool, ChatError> {
        Ok(self.lock()?.remove(session_id).is_some())
    }

    pub fn ids(&self) -> Result<Vec<String>, ChatError> {
        let mut ids: Vec<String> = self.lock()?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionState;

    #[test]
    fn test_load_or_create_then_save() {
        let store = SessionStore::new();
        let mut session = store.load_or_create("s1").unwrap();
        assert_eq!(session.state, SessionState::Init);

        session.state = SessionState::WaitingConfirm;
        session.target_entity = Some("EGFR".into());
        store.save(session).unwrap();

        let loaded = store.load_or_create("s1").unwrap();
        assert_eq!(loaded.state, SessionState::WaitingConfirm);
        assert_eq!(loaded.target_entity.as_deref(), Some("EGFR"));
    }

    #[test]
    fn test_sessions_are_independent() {
        let store = SessionStore::new();
        let mut a = store.load_or_create("a").unwrap();
        a.state = SessionState::Analyzing;
        store.save(a).unwrap();
        assert_eq!(store.load_or_create("b").unwrap().state, SessionState::Init);
        assert_eq!(store.ids().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_remove() {
        let store = SessionStore::new();
        store.load_or_create("s1").unwrap();
        assert!(store.remove("s1").unwrap());
        assert!(!store.remove("s1").unwrap());
        assert!(store.get("s1").unwrap().is_none());
    }
}

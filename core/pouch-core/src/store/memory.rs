use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{Precondition, SessionPatch, SessionStore, StoreError};
use crate::types::{NewSession, Session, SessionId};

/// In-process store. Every operation holds one lock, which makes the
/// check-and-apply in `update` atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a row verbatim. Intended for seeding fixtures.
    pub fn insert(&self, session: Session) -> Result<(), StoreError> {
        self.lock()?.insert(session.id.clone(), session);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<SessionId, Session>>, StoreError> {
        self.sessions
            .lock()
            .map_err(|_| StoreError::Read("memory store lock poisoned".to_string()))
    }
}

impl SessionStore for MemoryStore {
    fn create(&self, new: NewSession) -> Result<Session, StoreError> {
        let session = new.into_session(SessionId::generate());
        self.lock()?.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    fn get(&self, id: &SessionId) -> Result<Session, StoreError> {
        self.lock()?
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn update(
        &self,
        id: &SessionId,
        patch: &SessionPatch,
        condition: &Precondition,
    ) -> Result<(), StoreError> {
        let mut sessions = self.lock()?;
        let current = sessions
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        condition.check(current)?;

        let mut next = current.clone();
        patch.apply(&mut next)?;
        sessions.insert(id.clone(), next);
        Ok(())
    }

    fn list_active(&self, owner: &str) -> Result<Vec<Session>, StoreError> {
        let mut active: Vec<Session> = self
            .lock()?
            .values()
            .filter(|session| session.owner == owner && !session.is_terminal())
            .cloned()
            .collect();
        active.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn new_session(owner: &str, minute: u32) -> NewSession {
        NewSession {
            owner: owner.to_string(),
            target_minutes: 10,
            start_time: Utc.with_ymd_and_hms(2026, 1, 30, 9, minute, 0).unwrap(),
        }
    }

    #[test]
    fn list_active_filters_owner_and_terminal_rows() {
        let store = MemoryStore::new();
        let first = store.create(new_session("alice", 0)).expect("create");
        let second = store.create(new_session("alice", 5)).expect("create");
        store.create(new_session("bob", 1)).expect("create");

        store
            .update(
                &first.id,
                &SessionPatch::terminate(first.start_time),
                &Precondition::none().while_active(),
            )
            .expect("terminate first");

        let active = store.list_active("alice").expect("list");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);
    }

    #[test]
    fn failed_condition_leaves_row_untouched() {
        let store = MemoryStore::new();
        let session = store.create(new_session("alice", 0)).expect("create");

        let err = store
            .update(
                &session.id,
                &SessionPatch::pause(session.start_time),
                &Precondition::none().while_paused_at(session.start_time),
            )
            .unwrap_err();

        assert_eq!(err, StoreError::ConditionFailed(session.id.clone()));
        assert_eq!(store.get(&session.id).expect("get"), session);
    }

    #[test]
    fn missing_rows_are_not_found() {
        let store = MemoryStore::new();
        let id = SessionId::from("missing");
        assert_eq!(store.get(&id), Err(StoreError::NotFound(id.clone())));
        assert_eq!(
            store.update(&id, &SessionPatch::default(), &Precondition::none()),
            Err(StoreError::NotFound(id))
        );
    }
}

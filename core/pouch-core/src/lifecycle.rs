//! Session lifecycle state machine.
//!
//! ```text
//! Idle ──start──▶ Active ──pause──▶ Paused
//!                   ▲  ◀──resume───   │
//!                   │                 │
//!                   └──stop/complete──┴──▶ Terminal
//! ```
//!
//! Every transition is one conditional store write. The controller is the
//! only writer of lifecycle fields; the reconciler commits completion through
//! [`SessionController::complete`].

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::error::{PouchError, Result};
use crate::store::{Precondition, SessionPatch, SessionStore, StoreError};
use crate::types::{NewSession, Session, SessionId};

/// Result of a user stop. Stopping twice is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped(Session),
    AlreadyTerminal,
}

/// Result of the conditional completion write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionWrite {
    /// This caller's write closed the session.
    Applied,
    /// The row was already terminal at write time; nothing was written.
    AlreadyTerminal,
}

pub struct SessionController<S> {
    store: S,
    owner: String,
}

impl<S: SessionStore> SessionController<S> {
    pub fn new(store: S, owner: impl Into<String>) -> Self {
        Self {
            store,
            owner: owner.into(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reads the persisted row, rejecting sessions owned by someone else.
    pub fn load(&self, id: &SessionId) -> Result<Session> {
        let session = self.store.get(id).map_err(PouchError::from_read)?;
        if session.owner != self.owner {
            return Err(PouchError::PermissionDenied {
                id: id.clone(),
                owner: self.owner.clone(),
            });
        }
        Ok(session)
    }

    pub fn active_sessions(&self) -> Result<Vec<Session>> {
        self.store
            .list_active(&self.owner)
            .map_err(PouchError::from_read)
    }

    /// The owner's running or paused session, if any.
    pub fn current(&self) -> Result<Option<Session>> {
        Ok(self.active_sessions()?.into_iter().next())
    }

    pub fn start(&self, target_minutes: u32, now: DateTime<Utc>) -> Result<Session> {
        if target_minutes == 0 {
            return Err(PouchError::InvalidTarget);
        }

        let existing = self
            .store
            .list_active(&self.owner)
            .map_err(|err| PouchError::CreateFailed(err.to_string()))?;
        if let Some(active) = existing.first() {
            return Err(PouchError::CreateFailed(format!(
                "{} already has an active session ({})",
                self.owner, active.id
            )));
        }

        let session = self
            .store
            .create(NewSession {
                owner: self.owner.clone(),
                target_minutes,
                start_time: now,
            })
            .map_err(|err| PouchError::CreateFailed(err.to_string()))?;

        info!(
            session_id = %session.id,
            owner = %self.owner,
            target_minutes,
            "Session started"
        );
        Ok(session)
    }

    pub fn pause(&self, id: &SessionId, now: DateTime<Utc>) -> Result<Session> {
        let mut session = self.load(id)?;
        if session.is_terminal() || session.paused_at.is_some() {
            return Err(PouchError::NotActive(id.clone()));
        }

        let patch = SessionPatch::pause(now);
        let condition = self.owned().while_active().while_running();
        match self.store.update(id, &patch, &condition) {
            Ok(()) => {}
            Err(StoreError::ConditionFailed(_)) => return Err(PouchError::NotActive(id.clone())),
            Err(err) => return Err(PouchError::from_write(err)),
        }

        session.paused_at = Some(now);
        info!(session_id = %id, owner = %self.owner, "Session paused");
        Ok(session)
    }

    /// Closes the open pause interval and folds it into the running total.
    ///
    /// The write is conditioned on `paused_at` still holding the value read
    /// here, so a duplicate resume cannot add the same interval twice.
    pub fn resume(&self, id: &SessionId, now: DateTime<Utc>) -> Result<Session> {
        let mut session = self.load(id)?;
        let paused_at = match session.paused_at {
            Some(paused_at) if !session.is_terminal() => paused_at,
            _ => return Err(PouchError::NotPaused(id.clone())),
        };

        let closed = now.signed_duration_since(paused_at).max(Duration::zero());
        let total = session.total_pause_duration + closed;

        let patch = SessionPatch::resume(total);
        let condition = self.owned().while_active().while_paused_at(paused_at);
        match self.store.update(id, &patch, &condition) {
            Ok(()) => {}
            Err(StoreError::ConditionFailed(_)) => return Err(PouchError::NotPaused(id.clone())),
            Err(err) => return Err(PouchError::from_write(err)),
        }

        session.paused_at = None;
        session.total_pause_duration = total;
        info!(
            session_id = %id,
            owner = %self.owner,
            pause_ms = closed.num_milliseconds(),
            total_pause_ms = total.num_milliseconds(),
            "Session resumed"
        );
        Ok(session)
    }

    /// User stop. Any open pause interval is discarded.
    pub fn stop(&self, id: &SessionId, now: DateTime<Utc>) -> Result<StopOutcome> {
        let mut session = self.load(id)?;
        if session.is_terminal() {
            debug!(session_id = %id, "Stop ignored; session already terminal");
            return Ok(StopOutcome::AlreadyTerminal);
        }

        match self.terminate(id, now)? {
            CompletionWrite::Applied => {
                session.is_active = false;
                session.paused_at = None;
                session.end_time = Some(now);
                info!(session_id = %id, owner = %self.owner, "Session stopped");
                Ok(StopOutcome::Stopped(session))
            }
            CompletionWrite::AlreadyTerminal => {
                debug!(session_id = %id, "Stop lost race; session already terminal");
                Ok(StopOutcome::AlreadyTerminal)
            }
        }
    }

    /// Completion commit. Same terminal fields as [`Self::stop`], written
    /// only if the row is still active when the write lands.
    pub fn complete(&self, id: &SessionId, now: DateTime<Utc>) -> Result<CompletionWrite> {
        let outcome = self.terminate(id, now)?;
        if outcome == CompletionWrite::Applied {
            info!(session_id = %id, owner = %self.owner, "Session completed");
        }
        Ok(outcome)
    }

    fn terminate(&self, id: &SessionId, now: DateTime<Utc>) -> Result<CompletionWrite> {
        let patch = SessionPatch::terminate(now);
        let condition = self.owned().while_active();
        match self.store.update(id, &patch, &condition) {
            Ok(()) => Ok(CompletionWrite::Applied),
            Err(StoreError::ConditionFailed(_)) => Ok(CompletionWrite::AlreadyTerminal),
            Err(err) => Err(PouchError::from_write(err)),
        }
    }

    fn owned(&self) -> Precondition {
        Precondition::none().owned_by(self.owner.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 30, 9, 0, 0).unwrap()
    }

    fn mins(value: i64) -> Duration {
        Duration::minutes(value)
    }

    fn controller() -> SessionController<MemoryStore> {
        SessionController::new(MemoryStore::new(), "alice")
    }

    #[test]
    fn start_creates_active_row() {
        let controller = controller();
        let session = controller.start(10, t0()).expect("start");

        assert!(session.is_active);
        assert_eq!(session.start_time, t0());
        assert_eq!(session.total_pause_duration, Duration::zero());
        assert_eq!(controller.current().expect("current"), Some(session));
    }

    #[test]
    fn start_refuses_second_active_session() {
        let controller = controller();
        controller.start(10, t0()).expect("start");

        let err = controller.start(10, t0() + mins(1)).unwrap_err();
        assert!(matches!(err, PouchError::CreateFailed(_)));
    }

    #[test]
    fn start_rejects_zero_target() {
        let err = controller().start(0, t0()).unwrap_err();
        assert!(matches!(err, PouchError::InvalidTarget));
    }

    #[test]
    fn pause_resume_accumulates_closed_interval() {
        let controller = controller();
        let session = controller.start(10, t0()).expect("start");

        controller.pause(&session.id, t0() + mins(2)).expect("pause");
        let resumed = controller.resume(&session.id, t0() + mins(5)).expect("resume");

        assert_eq!(resumed.paused_at, None);
        assert_eq!(resumed.total_pause_duration, mins(3));
        assert_eq!(controller.load(&session.id).expect("load"), resumed);
    }

    #[test]
    fn double_pause_does_not_move_pause_start() {
        let controller = controller();
        let session = controller.start(10, t0()).expect("start");
        controller.pause(&session.id, t0() + mins(2)).expect("pause");

        let err = controller.pause(&session.id, t0() + mins(4)).unwrap_err();
        assert!(matches!(err, PouchError::NotActive(_)));
        assert!(err.is_precondition_failure());

        let resumed = controller.resume(&session.id, t0() + mins(5)).expect("resume");
        assert_eq!(resumed.total_pause_duration, mins(3));
    }

    #[test]
    fn resume_without_pause_fails_and_keeps_total() {
        let controller = controller();
        let session = controller.start(10, t0()).expect("start");
        controller.pause(&session.id, t0() + mins(1)).expect("pause");
        controller.resume(&session.id, t0() + mins(2)).expect("resume");

        let err = controller.resume(&session.id, t0() + mins(3)).unwrap_err();
        assert!(matches!(err, PouchError::NotPaused(_)));

        let stored = controller.load(&session.id).expect("load");
        assert_eq!(stored.total_pause_duration, mins(1));
    }

    #[test]
    fn stop_while_paused_discards_open_interval() {
        let controller = controller();
        let session = controller.start(10, t0()).expect("start");
        controller.pause(&session.id, t0() + mins(1)).expect("pause");
        controller.resume(&session.id, t0() + mins(2)).expect("resume");
        controller.pause(&session.id, t0() + mins(4)).expect("pause again");

        let outcome = controller.stop(&session.id, t0() + mins(6)).expect("stop");
        let StopOutcome::Stopped(stopped) = outcome else {
            panic!("expected stop to apply");
        };

        assert_eq!(stopped.total_pause_duration, mins(1));
        assert_eq!(stopped.paused_at, None);
        assert_eq!(stopped.end_time, Some(t0() + mins(6)));
        assert_eq!(controller.load(&session.id).expect("load"), stopped);
    }

    #[test]
    fn second_stop_is_a_no_op() {
        let controller = controller();
        let session = controller.start(10, t0()).expect("start");
        controller.stop(&session.id, t0() + mins(3)).expect("stop");

        let again = controller.stop(&session.id, t0() + mins(4)).expect("stop again");
        assert_eq!(again, StopOutcome::AlreadyTerminal);
        let stored = controller.load(&session.id).expect("load");
        assert_eq!(stored.end_time, Some(t0() + mins(3)));
    }

    #[test]
    fn transitions_after_stop_fail_with_precondition_errors() {
        let controller = controller();
        let session = controller.start(10, t0()).expect("start");
        controller.stop(&session.id, t0() + mins(3)).expect("stop");

        assert!(matches!(
            controller.pause(&session.id, t0() + mins(4)),
            Err(PouchError::NotActive(_))
        ));
        assert!(matches!(
            controller.resume(&session.id, t0() + mins(4)),
            Err(PouchError::NotPaused(_))
        ));
    }

    #[test]
    fn complete_only_applies_once() {
        let controller = controller();
        let session = controller.start(10, t0()).expect("start");

        assert_eq!(
            controller.complete(&session.id, t0() + mins(10)).expect("complete"),
            CompletionWrite::Applied
        );
        assert_eq!(
            controller.complete(&session.id, t0() + mins(11)).expect("complete again"),
            CompletionWrite::AlreadyTerminal
        );
        let stored = controller.load(&session.id).expect("load");
        assert_eq!(stored.end_time, Some(t0() + mins(10)));
    }

    #[test]
    fn foreign_owner_is_denied() {
        let store = MemoryStore::new();
        let alice = SessionController::new(&store, "alice");
        let bob = SessionController::new(&store, "bob");
        let session = alice.start(10, t0()).expect("start");

        assert!(matches!(
            bob.pause(&session.id, t0() + mins(1)),
            Err(PouchError::PermissionDenied { .. })
        ));
        assert!(matches!(
            bob.complete(&session.id, t0() + mins(11)),
            Err(PouchError::PermissionDenied { .. })
        ));
    }

    #[test]
    fn unknown_session_is_not_found() {
        let err = controller()
            .stop(&SessionId::from("missing"), t0())
            .unwrap_err();
        assert!(matches!(err, PouchError::NotFound(_)));
    }
}

//! Session record storage.
//!
//! The store is the only state shared between the foreground timer and the
//! background sweep. They never share process memory, so races on a row are
//! settled by conditional updates: [`SessionStore::update`] checks a
//! [`Precondition`] and applies a [`SessionPatch`] as one atomic step.
//!
//! Two implementations ship with the crate:
//! - [`MemoryStore`]: a mutex-guarded map, for tests and embedding.
//! - [`SqliteStore`]: a file-backed store usable from several processes.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::types::{NewSession, Session, SessionId};

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// The precondition did not hold at write time; nothing was written.
    #[error("precondition no longer holds for session {0}")]
    ConditionFailed(SessionId),

    #[error("session {id} is not owned by {owner}")]
    PermissionDenied { id: SessionId, owner: String },

    #[error("read failed: {0}")]
    Read(String),

    #[error("write failed: {0}")]
    Write(String),
}

pub trait SessionStore {
    /// Inserts a new active session and returns the stored row.
    fn create(&self, new: NewSession) -> Result<Session, StoreError>;

    fn get(&self, id: &SessionId) -> Result<Session, StoreError>;

    /// Applies `patch` only if `condition` holds against the current row.
    fn update(
        &self,
        id: &SessionId,
        patch: &SessionPatch,
        condition: &Precondition,
    ) -> Result<(), StoreError>;

    /// Sessions owned by `owner` with `is_active` set and no `end_time`,
    /// oldest first.
    fn list_active(&self, owner: &str) -> Result<Vec<Session>, StoreError>;
}

impl<T: SessionStore + ?Sized> SessionStore for &T {
    fn create(&self, new: NewSession) -> Result<Session, StoreError> {
        (**self).create(new)
    }

    fn get(&self, id: &SessionId) -> Result<Session, StoreError> {
        (**self).get(id)
    }

    fn update(
        &self,
        id: &SessionId,
        patch: &SessionPatch,
        condition: &Precondition,
    ) -> Result<(), StoreError> {
        (**self).update(id, patch, condition)
    }

    fn list_active(&self, owner: &str) -> Result<Vec<Session>, StoreError> {
        (**self).list_active(owner)
    }
}

impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    fn create(&self, new: NewSession) -> Result<Session, StoreError> {
        (**self).create(new)
    }

    fn get(&self, id: &SessionId) -> Result<Session, StoreError> {
        (**self).get(id)
    }

    fn update(
        &self,
        id: &SessionId,
        patch: &SessionPatch,
        condition: &Precondition,
    ) -> Result<(), StoreError> {
        (**self).update(id, patch, condition)
    }

    fn list_active(&self, owner: &str) -> Result<Vec<Session>, StoreError> {
        (**self).list_active(owner)
    }
}

/// Expected pause sub-state of a row at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseCondition {
    /// `paused_at` is unset.
    Running,
    /// `paused_at` equals exactly this instant.
    PausedAt(DateTime<Utc>),
}

/// Conjunction of optional clauses checked against the current row.
///
/// An owner mismatch is reported as `PermissionDenied`; any other violated
/// clause as `ConditionFailed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Precondition {
    pub owner: Option<String>,
    pub is_active: Option<bool>,
    pub pause: Option<PauseCondition>,
}

impl Precondition {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn while_active(mut self) -> Self {
        self.is_active = Some(true);
        self
    }

    pub fn while_running(mut self) -> Self {
        self.pause = Some(PauseCondition::Running);
        self
    }

    pub fn while_paused_at(mut self, paused_at: DateTime<Utc>) -> Self {
        self.pause = Some(PauseCondition::PausedAt(paused_at));
        self
    }

    pub fn check(&self, session: &Session) -> Result<(), StoreError> {
        if let Some(owner) = &self.owner {
            if &session.owner != owner {
                return Err(StoreError::PermissionDenied {
                    id: session.id.clone(),
                    owner: owner.clone(),
                });
            }
        }

        let active_ok = self
            .is_active
            .map(|expected| session.is_active == expected && session.end_time.is_none() == expected)
            .unwrap_or(true);

        let pause_ok = match self.pause {
            None => true,
            Some(PauseCondition::Running) => session.paused_at.is_none(),
            Some(PauseCondition::PausedAt(at)) => session.paused_at == Some(at),
        };

        if active_ok && pause_ok {
            Ok(())
        } else {
            Err(StoreError::ConditionFailed(session.id.clone()))
        }
    }
}

/// Lifecycle fields to overwrite. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub paused_at: Option<Option<DateTime<Utc>>>,
    pub total_pause_duration: Option<Duration>,
    pub is_active: Option<bool>,
    pub end_time: Option<DateTime<Utc>>,
}

impl SessionPatch {
    pub fn pause(at: DateTime<Utc>) -> Self {
        Self {
            paused_at: Some(Some(at)),
            ..Self::default()
        }
    }

    pub fn resume(total_pause_duration: Duration) -> Self {
        Self {
            paused_at: Some(None),
            total_pause_duration: Some(total_pause_duration),
            ..Self::default()
        }
    }

    /// Terminal write shared by stop and completion. Any open pause interval
    /// is dropped, not folded into the total.
    pub fn terminate(at: DateTime<Utc>) -> Self {
        Self {
            paused_at: Some(None),
            total_pause_duration: None,
            is_active: Some(false),
            end_time: Some(at),
        }
    }

    /// Applies the patch in place. Terminal rows are frozen, so `end_time`
    /// can never be overwritten through this path.
    pub fn apply(&self, session: &mut Session) -> Result<(), StoreError> {
        if session.is_terminal() {
            return Err(StoreError::ConditionFailed(session.id.clone()));
        }

        if let Some(paused_at) = self.paused_at {
            session.paused_at = paused_at;
        }
        if let Some(total) = self.total_pause_duration {
            if total < session.total_pause_duration {
                return Err(StoreError::Write(format!(
                    "total pause duration for {} may not decrease",
                    session.id
                )));
            }
            session.total_pause_duration = total;
        }
        if let Some(is_active) = self.is_active {
            session.is_active = is_active;
        }
        if let Some(end_time) = self.end_time {
            session.end_time = Some(end_time);
        }
        Ok(())
    }
}

//! Foreground presentation loop.
//!
//! While a viewed session is running, the loop ticks once per second,
//! recomputes the remaining time and, when it reaches zero, hands the
//! session to the reconciler. Local display state is reset to idle after
//! that regardless of the reconcile result; the store records whichever
//! context actually won.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::elapsed;
use crate::error::Result;
use crate::lifecycle::SessionController;
use crate::notify::Notifier;
use crate::reconcile::{CompletionReconciler, ReconcileOutcome};
use crate::store::SessionStore;
use crate::types::{LifecycleState, Session};

pub const TICK_INTERVAL: StdDuration = StdDuration::from_secs(1);

/// Values handed to rendering code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Presentation {
    pub state: LifecycleState,
    pub remaining_seconds: u64,
    pub progress_fraction: f64,
}

impl Presentation {
    pub fn idle(target_minutes: u32) -> Self {
        Self {
            state: LifecycleState::Idle,
            remaining_seconds: u64::from(target_minutes) * 60,
            progress_fraction: 0.0,
        }
    }

    pub fn of(session: &Session, now: DateTime<Utc>) -> Self {
        Self {
            state: session.state(),
            remaining_seconds: elapsed::remaining_seconds(session, now),
            progress_fraction: elapsed::progress_fraction(session, now),
        }
    }

    pub fn clock(&self) -> String {
        format_clock(self.remaining_seconds)
    }
}

/// Renders seconds as `m:ss`.
pub fn format_clock(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Nothing to tick: idle, paused or terminal.
    Idle,
    Running(Presentation),
    /// Remaining time hit zero. `None` when the reconcile call itself failed.
    Completed(Option<ReconcileOutcome>),
}

/// Local view state for one screen.
#[derive(Debug, Clone)]
pub struct ForegroundTimer {
    session: Option<Session>,
    target_minutes: u32,
}

impl ForegroundTimer {
    pub fn idle(target_minutes: u32) -> Self {
        Self {
            session: None,
            target_minutes,
        }
    }

    pub fn viewing(session: Session) -> Self {
        Self {
            target_minutes: session.target_minutes,
            session: Some(session),
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// True while the viewed session is active and unpaused.
    pub fn is_ticking(&self) -> bool {
        self.session
            .as_ref()
            .map(|session| session.state() == LifecycleState::Active)
            .unwrap_or(false)
    }

    pub fn presentation(&self, now: DateTime<Utc>) -> Presentation {
        match &self.session {
            Some(session) if !session.is_terminal() => Presentation::of(session, now),
            _ => Presentation::idle(self.target_minutes),
        }
    }

    /// Replaces the local snapshot with the persisted row. A row that turned
    /// terminal elsewhere resets the view to idle.
    pub fn refresh<S: SessionStore>(&mut self, controller: &SessionController<S>) -> Result<()> {
        let Some(current) = &self.session else {
            return Ok(());
        };
        let fresh = controller.load(&current.id)?;
        if fresh.is_terminal() {
            debug!(session_id = %fresh.id, "Viewed session closed elsewhere");
            self.reset();
        } else {
            self.session = Some(fresh);
        }
        Ok(())
    }

    pub fn tick<S: SessionStore, N: Notifier>(
        &mut self,
        reconciler: &CompletionReconciler<S, N>,
        now: DateTime<Utc>,
    ) -> TickOutcome {
        let session = match &self.session {
            Some(session) if self.is_ticking() => session,
            _ => return TickOutcome::Idle,
        };

        if elapsed::remaining_seconds(session, now) > 0 {
            return TickOutcome::Running(Presentation::of(session, now));
        }

        let outcome = match reconciler.reconcile_session(&session.id, now) {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                warn!(session_id = %session.id, error = %err, "Foreground reconcile failed");
                None
            }
        };
        self.reset();
        TickOutcome::Completed(outcome)
    }

    fn reset(&mut self) {
        self.session = None;
    }
}

/// Drives `timer` until it completes, stops ticking, or `cancel` is set.
///
/// Cancellation stops scheduling further ticks; it never interrupts a store
/// call already in flight. Returns the reconcile outcome when the loop ended
/// on completion.
pub fn run_foreground<S, N, F>(
    timer: &mut ForegroundTimer,
    reconciler: &CompletionReconciler<S, N>,
    cancel: &AtomicBool,
    tick_interval: StdDuration,
    mut on_tick: F,
) -> Result<Option<ReconcileOutcome>>
where
    S: SessionStore,
    N: Notifier,
    F: FnMut(&Presentation),
{
    loop {
        if cancel.load(Ordering::SeqCst) {
            debug!("Foreground loop cancelled");
            return Ok(None);
        }

        timer.refresh(reconciler.controller())?;
        let now = Utc::now();
        match timer.tick(reconciler, now) {
            TickOutcome::Idle => return Ok(None),
            TickOutcome::Running(presentation) => on_tick(&presentation),
            TickOutcome::Completed(outcome) => {
                on_tick(&timer.presentation(now));
                return Ok(outcome);
            }
        }

        thread::sleep(tick_interval);
    }
}

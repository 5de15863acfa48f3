//! Completion reconciliation.
//!
//! Both the foreground tick and the background sweep funnel into
//! [`CompletionReconciler::reconcile_session`]. Per candidate:
//!
//! 1. re-read the persisted row (callers share no memory);
//! 2. skip if already terminal;
//! 3. evaluate active time at `now`;
//! 4. skip if the target is not reached;
//! 5. commit the terminal write, conditioned on the row still being active;
//! 6. notify only if that write applied.
//!
//! Step 5 is the only synchronization between contexts. Whichever caller's
//! conditional write lands first owns the completion and its alert; every
//! other caller sees `ConditionFailed` (reported as
//! [`ReconcileOutcome::LostRace`]) and stays silent.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::elapsed;
use crate::error::Result;
use crate::lifecycle::{CompletionWrite, SessionController};
use crate::notify::{CompletionAlert, Notifier};
use crate::store::SessionStore;
use crate::types::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// This run committed the completion and requested the alert.
    Committed,
    /// The row was already terminal when read; nothing was written.
    AlreadyTerminal,
    /// Target not reached yet, or the session is paused.
    Pending { remaining: Duration },
    /// Completion was observed but another context's write landed first.
    LostRace,
}

/// Tally of one pass over an owner's active sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub candidates: usize,
    pub committed: usize,
    pub already_terminal: usize,
    pub pending: usize,
    pub lost_race: usize,
    pub failed: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Committed => self.committed += 1,
            ReconcileOutcome::AlreadyTerminal => self.already_terminal += 1,
            ReconcileOutcome::Pending { .. } => self.pending += 1,
            ReconcileOutcome::LostRace => self.lost_race += 1,
        }
    }
}

pub struct CompletionReconciler<S, N> {
    controller: SessionController<S>,
    alert: CompletionAlert<N>,
}

impl<S: SessionStore, N: Notifier> CompletionReconciler<S, N> {
    pub fn new(controller: SessionController<S>, alert: CompletionAlert<N>) -> Self {
        Self { controller, alert }
    }

    pub fn controller(&self) -> &SessionController<S> {
        &self.controller
    }

    pub fn reconcile_session(&self, id: &SessionId, now: DateTime<Utc>) -> Result<ReconcileOutcome> {
        let session = self.controller.load(id)?;
        if session.is_terminal() {
            debug!(session_id = %id, "Reconcile skipped; session already terminal");
            return Ok(ReconcileOutcome::AlreadyTerminal);
        }

        let evaluation = elapsed::evaluate(&session, now);
        if !evaluation.is_complete {
            return Ok(ReconcileOutcome::Pending {
                remaining: evaluation.remaining,
            });
        }

        match self.controller.complete(id, now)? {
            CompletionWrite::Applied => {
                info!(
                    session_id = %id,
                    owner = %self.controller.owner(),
                    active_ms = evaluation.active.num_milliseconds(),
                    end_time = %now.to_rfc3339(),
                    "Completion committed"
                );
                self.alert.send();
                Ok(ReconcileOutcome::Committed)
            }
            CompletionWrite::AlreadyTerminal => {
                debug!(session_id = %id, "Completion already committed elsewhere");
                Ok(ReconcileOutcome::LostRace)
            }
        }
    }

    /// Reconciles every active session of the controller's owner.
    ///
    /// A failure on one candidate is logged and counted; the rest are still
    /// processed. Only a failure to list candidates is returned as an error.
    pub fn reconcile_owner(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let candidates = self.controller.active_sessions()?;
        let mut report = SweepReport {
            candidates: candidates.len(),
            ..SweepReport::default()
        };

        for session in candidates {
            match self.reconcile_session(&session.id, now) {
                Ok(outcome) => report.record(outcome),
                Err(err) => {
                    warn!(session_id = %session.id, error = %err, "Reconcile failed");
                    report.failed += 1;
                }
            }
        }

        debug!(
            owner = %self.controller.owner(),
            candidates = report.candidates,
            committed = report.committed,
            failed = report.failed,
            "Reconcile pass finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingNotifier {
        fired: AtomicUsize,
    }

    impl Notifier for CountingNotifier {
        fn fire_now(&self, _title: &str, _body: &str) {
            self.fired.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 30, 9, 0, 0).unwrap()
    }

    fn mins(value: i64) -> Duration {
        Duration::minutes(value)
    }

    fn reconciler<'a>(
        store: &'a MemoryStore,
        notifier: &'a CountingNotifier,
    ) -> CompletionReconciler<&'a MemoryStore, &'a CountingNotifier> {
        CompletionReconciler::new(
            SessionController::new(store, "alice"),
            CompletionAlert::new(notifier),
        )
    }

    #[test]
    fn pending_session_is_left_alone() {
        let store = MemoryStore::new();
        let notifier = CountingNotifier::default();
        let reconciler = reconciler(&store, &notifier);
        let session = reconciler.controller().start(10, t0()).expect("start");

        let outcome = reconciler
            .reconcile_session(&session.id, t0() + mins(4))
            .expect("reconcile");

        assert_eq!(outcome, ReconcileOutcome::Pending { remaining: mins(6) });
        assert!(store.get(&session.id).expect("get").is_active);
        assert_eq!(notifier.fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reached_target_commits_once_and_notifies_once() {
        let store = MemoryStore::new();
        let notifier = CountingNotifier::default();
        let reconciler = reconciler(&store, &notifier);
        let session = reconciler.controller().start(10, t0()).expect("start");

        let first = reconciler
            .reconcile_session(&session.id, t0() + mins(10))
            .expect("first");
        let second = reconciler
            .reconcile_session(&session.id, t0() + mins(10))
            .expect("second");

        assert_eq!(first, ReconcileOutcome::Committed);
        assert_eq!(second, ReconcileOutcome::AlreadyTerminal);
        assert_eq!(notifier.fired.load(Ordering::SeqCst), 1);

        let stored = store.get(&session.id).expect("get");
        assert!(!stored.is_active);
        assert_eq!(stored.end_time, Some(t0() + mins(10)));
    }

    #[test]
    fn paused_session_never_self_completes() {
        let store = MemoryStore::new();
        let notifier = CountingNotifier::default();
        let reconciler = reconciler(&store, &notifier);
        let session = reconciler.controller().start(10, t0()).expect("start");
        reconciler
            .controller()
            .pause(&session.id, t0() + mins(3))
            .expect("pause");

        let outcome = reconciler
            .reconcile_session(&session.id, t0() + mins(90))
            .expect("reconcile");

        assert_eq!(outcome, ReconcileOutcome::Pending { remaining: mins(7) });
        assert_eq!(notifier.fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn completion_records_reconcile_instant_after_long_gap() {
        let store = MemoryStore::new();
        let notifier = CountingNotifier::default();
        let reconciler = reconciler(&store, &notifier);
        let session = reconciler.controller().start(20, t0()).expect("start");

        let report = reconciler
            .reconcile_owner(t0() + Duration::hours(1))
            .expect("sweep");

        assert_eq!(report.candidates, 1);
        assert_eq!(report.committed, 1);
        let stored = store.get(&session.id).expect("get");
        assert_eq!(stored.end_time, Some(t0() + Duration::hours(1)));
    }

    #[test]
    fn completion_after_unobserved_crossing_and_pause_ends_at_reconcile() {
        let store = MemoryStore::new();
        let notifier = CountingNotifier::default();
        let reconciler = reconciler(&store, &notifier);
        let controller = reconciler.controller();
        let session = controller.start(10, t0()).expect("start");

        // Target crossed at +10 with nobody watching; paused 12..20.
        controller.pause(&session.id, t0() + mins(12)).expect("pause");
        controller.resume(&session.id, t0() + mins(20)).expect("resume");

        let outcome = reconciler
            .reconcile_session(&session.id, t0() + mins(21))
            .expect("reconcile");

        assert_eq!(outcome, ReconcileOutcome::Committed);
        let stored = store.get(&session.id).expect("get");
        assert_eq!(stored.end_time, Some(t0() + mins(21)));
        assert_eq!(stored.total_pause_duration, mins(8));
        assert_eq!(notifier.fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn owner_pass_with_no_candidates_is_empty() {
        let store = MemoryStore::new();
        let notifier = CountingNotifier::default();
        let report = reconciler(&store, &notifier)
            .reconcile_owner(t0())
            .expect("sweep");

        assert_eq!(report, SweepReport::default());
        assert_eq!(notifier.fired.load(Ordering::SeqCst), 0);
    }
}

//! Background sweep and the periodic hosts that drive it.
//!
//! The host decides when (and whether) a sweep runs. The sweep assumes no
//! cadence: every run recomputes from wall-clock timestamps in the store, so
//! a run after an hour-long gap commits a completion just as a run one
//! second after the target would.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::notify::Notifier;
use crate::reconcile::CompletionReconciler;
use crate::store::SessionStore;

/// Coarse result handed back to the host scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepOutcome {
    /// At least one completion was committed.
    NewData,
    /// Nothing committed, including runs that failed.
    NoData,
}

pub struct BackgroundSweep<S, N> {
    reconciler: CompletionReconciler<S, N>,
}

impl<S: SessionStore, N: Notifier> BackgroundSweep<S, N> {
    pub fn new(reconciler: CompletionReconciler<S, N>) -> Self {
        Self { reconciler }
    }

    pub fn reconciler(&self) -> &CompletionReconciler<S, N> {
        &self.reconciler
    }

    /// Never fails: errors are logged and reported as `NoData` so the host
    /// keeps scheduling future runs.
    pub fn run(&self, now: DateTime<Utc>) -> SweepOutcome {
        match self.reconciler.reconcile_owner(now) {
            Ok(report) if report.committed > 0 => {
                info!(
                    owner = %self.reconciler.controller().owner(),
                    committed = report.committed,
                    candidates = report.candidates,
                    "Background sweep committed completions"
                );
                SweepOutcome::NewData
            }
            Ok(report) => {
                debug!(candidates = report.candidates, "Background sweep found nothing to commit");
                SweepOutcome::NoData
            }
            Err(err) => {
                warn!(error = %err, "Background sweep failed");
                SweepOutcome::NoData
            }
        }
    }
}

pub type SweepTask = Box<dyn FnMut() -> SweepOutcome + Send + 'static>;

/// Host capability that invokes a task at its own discretion.
///
/// `min_interval` is a hint; implementations may run the task less often or
/// not at all.
pub trait PeriodicTrigger {
    fn register(&mut self, min_interval: StdDuration, task: SweepTask);
}

/// Runs each registered task on its own thread: once immediately, then after
/// every `min_interval`.
#[derive(Default)]
pub struct ThreadTrigger {
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

const STOP_POLL: StdDuration = StdDuration::from_millis(250);

impl ThreadTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared flag; setting it stops every worker after its current run.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Blocks until every worker has exited.
    pub fn join(self) {
        for worker in self.workers {
            if worker.join().is_err() {
                warn!("Sweep worker panicked");
            }
        }
    }

    pub fn shutdown(self) {
        self.stop.store(true, Ordering::SeqCst);
        self.join();
    }
}

impl PeriodicTrigger for ThreadTrigger {
    fn register(&mut self, min_interval: StdDuration, mut task: SweepTask) {
        let stop = Arc::clone(&self.stop);
        let worker = thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                let outcome = task();
                debug!(outcome = ?outcome, "Sweep run finished");
                sleep_unless_stopped(&stop, min_interval);
            }
        });
        self.workers.push(worker);
    }
}

fn sleep_unless_stopped(stop: &AtomicBool, total: StdDuration) {
    let deadline = Instant::now() + total;
    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep(STOP_POLL.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::SessionController;
    use crate::notify::{CompletionAlert, LogNotifier};
    use crate::store::{MemoryStore, Precondition, SessionPatch, StoreError};
    use crate::types::{NewSession, Session, SessionId};
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::AtomicUsize;

    struct FailingStore;

    impl SessionStore for FailingStore {
        fn create(&self, _new: NewSession) -> Result<Session, StoreError> {
            Err(StoreError::Write("offline".to_string()))
        }

        fn get(&self, id: &SessionId) -> Result<Session, StoreError> {
            Err(StoreError::NotFound(id.clone()))
        }

        fn update(
            &self,
            _id: &SessionId,
            _patch: &SessionPatch,
            _condition: &Precondition,
        ) -> Result<(), StoreError> {
            Err(StoreError::Write("offline".to_string()))
        }

        fn list_active(&self, _owner: &str) -> Result<Vec<Session>, StoreError> {
            Err(StoreError::Read("offline".to_string()))
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 30, 9, 0, 0).unwrap()
    }

    fn sweep<S: SessionStore>(store: S) -> BackgroundSweep<S, LogNotifier> {
        BackgroundSweep::new(CompletionReconciler::new(
            SessionController::new(store, "alice"),
            CompletionAlert::new(LogNotifier),
        ))
    }

    #[test]
    fn store_failure_reports_no_data() {
        assert_eq!(sweep(FailingStore).run(t0()), SweepOutcome::NoData);
    }

    #[test]
    fn reports_new_data_only_when_committing() {
        let store = MemoryStore::new();
        let sweep = sweep(&store);
        sweep
            .reconciler()
            .controller()
            .start(5, t0())
            .expect("start");

        assert_eq!(sweep.run(t0() + Duration::minutes(1)), SweepOutcome::NoData);
        assert_eq!(sweep.run(t0() + Duration::minutes(5)), SweepOutcome::NewData);
        assert_eq!(sweep.run(t0() + Duration::minutes(6)), SweepOutcome::NoData);
    }

    #[test]
    fn thread_trigger_runs_until_stopped() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);

        let mut trigger = ThreadTrigger::new();
        trigger.register(
            StdDuration::from_millis(5),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                SweepOutcome::NoData
            }),
        );

        let deadline = Instant::now() + StdDuration::from_secs(5);
        while runs.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            thread::sleep(StdDuration::from_millis(5));
        }
        trigger.shutdown();

        let observed = runs.load(Ordering::SeqCst);
        assert!(observed >= 2, "expected repeated runs, saw {observed}");
        thread::sleep(StdDuration::from_millis(30));
        assert_eq!(runs.load(Ordering::SeqCst), observed);
    }

    #[test]
    fn stop_flag_releases_join_mid_interval() {
        let mut trigger = ThreadTrigger::new();
        trigger.register(
            StdDuration::from_secs(3600),
            Box::new(|| SweepOutcome::NoData),
        );

        let stop = trigger.stop_flag();
        let started = Instant::now();
        let setter = thread::spawn(move || {
            thread::sleep(StdDuration::from_millis(20));
            stop.store(true, Ordering::SeqCst);
        });
        trigger.join();
        setter.join().expect("setter thread");

        assert!(started.elapsed() < StdDuration::from_secs(5));
    }
}

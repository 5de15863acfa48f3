//! # pouch-core
//!
//! Session timing and completion reconciliation for pouch timers.
//!
//! A session runs for a target amount of *active* time (paused intervals
//! excluded) and must be recognized as complete exactly once, even though
//! completion can be detected by two contexts that share nothing but the
//! store: a foreground timer ticking every second, and a background sweep
//! that runs whenever the host gets around to it.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Store calls block.
//! - **Store as the only shared state**: Races are resolved with conditional
//!   writes, not locks; see [`reconcile`].
//! - **Injected capabilities**: The store, the notifier and the periodic
//!   trigger are traits, so the reconciliation logic runs without a host.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pouch_core::{CompletionAlert, CompletionReconciler, LogNotifier, SessionController, SqliteStore};
//!
//! let store = SqliteStore::open("/tmp/pouch.db")?;
//! let controller = SessionController::new(store, "alice");
//! let session = controller.start(30, chrono::Utc::now())?;
//!
//! let reconciler = CompletionReconciler::new(controller, CompletionAlert::new(LogNotifier));
//! reconciler.reconcile_session(&session.id, chrono::Utc::now())?;
//! ```

pub mod config;
pub mod elapsed;
pub mod error;
pub mod foreground;
pub mod lifecycle;
pub mod notify;
pub mod reconcile;
pub mod signal;
pub mod store;
pub mod trigger;
pub mod types;

pub use config::{load_config, NotificationConfig, PouchConfig, SweepConfig};
pub use elapsed::{evaluate, Elapsed};
pub use error::{PouchError, Result};
pub use foreground::{format_clock, run_foreground, ForegroundTimer, Presentation, TickOutcome};
pub use lifecycle::{CompletionWrite, SessionController, StopOutcome};
pub use notify::{CommandNotifier, CompletionAlert, LogNotifier, Notifier};
pub use reconcile::{CompletionReconciler, ReconcileOutcome, SweepReport};
pub use signal::register_shutdown;
pub use store::{
    MemoryStore, PauseCondition, Precondition, SessionPatch, SessionStore, SqliteStore, StoreError,
};
pub use trigger::{BackgroundSweep, PeriodicTrigger, SweepOutcome, SweepTask, ThreadTrigger};
pub use types::{LifecycleState, NewSession, Session, SessionId};

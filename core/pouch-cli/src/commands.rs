use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use pouch_core::elapsed;
use pouch_core::foreground::TICK_INTERVAL;
use pouch_core::{
    load_config, register_shutdown, run_foreground, BackgroundSweep, CompletionAlert,
    CompletionReconciler, ForegroundTimer, Notifier, PouchConfig, PouchError, Presentation,
    ReconcileOutcome, Session, SessionController, SessionId, SqliteStore, StopOutcome, StoreError,
    SweepOutcome,
};
use tracing::{info, warn};

const PROGRESS_BAR_WIDTH: usize = 30;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Pouch(#[from] PouchError),

    #[error("Failed to open session store: {0}")]
    Store(#[from] StoreError),

    #[error("No active session")]
    NoActiveSession,

    #[error("Failed to encode status: {0}")]
    Json(#[from] serde_json::Error),
}

type Notify = Box<dyn Notifier + Send + Sync>;

pub struct Context {
    config: PouchConfig,
    store: SqliteStore,
}

impl Context {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, CliError> {
        let config = load_config(config_path)?;
        let store = SqliteStore::open(config.database_path()?)?;
        info!(
            owner = %config.owner,
            db = %store.path().display(),
            "pouch context loaded"
        );
        Ok(Self { config, store })
    }

    fn controller(&self) -> SessionController<&SqliteStore> {
        SessionController::new(&self.store, self.config.owner.clone())
    }

    fn reconciler(&self) -> CompletionReconciler<&SqliteStore, Notify> {
        let notification = &self.config.notification;
        CompletionReconciler::new(
            self.controller(),
            CompletionAlert::with_text(
                notification.notifier(),
                notification.title.clone(),
                notification.body.clone(),
            ),
        )
    }

    fn resolve(&self, id: Option<SessionId>) -> Result<Session, CliError> {
        let controller = self.controller();
        match id {
            Some(id) => Ok(controller.load(&id)?),
            None => controller.current()?.ok_or(CliError::NoActiveSession),
        }
    }
}

pub fn start(context: &Context, minutes: Option<u32>) -> Result<(), CliError> {
    let minutes = minutes.unwrap_or(context.config.default_target_minutes);
    let session = context.controller().start(minutes, Utc::now())?;
    println!("Started {} ({} min)", session.id, session.target_minutes);
    Ok(())
}

pub fn pause(context: &Context, id: Option<SessionId>) -> Result<(), CliError> {
    let session = context.resolve(id)?;
    let now = Utc::now();
    let paused = context.controller().pause(&session.id, now)?;
    println!(
        "Paused {} with {} left",
        paused.id,
        Presentation::of(&paused, now).clock()
    );
    Ok(())
}

pub fn resume(context: &Context, id: Option<SessionId>) -> Result<(), CliError> {
    let session = context.resolve(id)?;
    let now = Utc::now();
    let resumed = context.controller().resume(&session.id, now)?;
    println!(
        "Resumed {} with {} left",
        resumed.id,
        Presentation::of(&resumed, now).clock()
    );
    Ok(())
}

pub fn stop(context: &Context, id: Option<SessionId>) -> Result<(), CliError> {
    let session = context.resolve(id)?;
    match context.controller().stop(&session.id, Utc::now())? {
        StopOutcome::Stopped(stopped) => println!("Stopped {}", stopped.id),
        StopOutcome::AlreadyTerminal => println!("{} had already ended", session.id),
    }
    Ok(())
}

pub fn status(context: &Context, id: Option<SessionId>, json: bool) -> Result<(), CliError> {
    let now = Utc::now();
    let session = match id {
        Some(id) => Some(context.controller().load(&id)?),
        None => context.controller().current()?,
    };

    let presentation = match &session {
        Some(session) if !session.is_terminal() => Presentation::of(session, now),
        _ => Presentation::idle(
            session
                .as_ref()
                .map(|session| session.target_minutes)
                .unwrap_or(context.config.default_target_minutes),
        ),
    };

    if json {
        let payload = serde_json::json!({
            "session": session,
            "presentation": presentation,
            "elapsed": session.as_ref().map(|session| elapsed::evaluate(session, now)),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    match &session {
        Some(session) => {
            println!("{} [{}]", session.id, session.state().as_str());
            println!(
                "{} {} left",
                progress_bar(presentation.progress_fraction),
                presentation.clock()
            );
            let paused_secs = session.total_pause_duration.num_seconds().max(0) as u64;
            if paused_secs > 0 {
                println!("paused {}", pouch_core::format_clock(paused_secs));
            }
        }
        None => println!("idle ({} ready)", presentation.clock()),
    }
    Ok(())
}

pub fn watch(context: &Context, id: Option<SessionId>) -> Result<(), CliError> {
    let session = context.resolve(id)?;
    let reconciler = context.reconciler();
    let mut timer = ForegroundTimer::viewing(session);
    // Ctrl-C ends the loop at the next tick boundary.
    let cancel = Arc::new(AtomicBool::new(false));
    if let Err(err) = register_shutdown(&cancel) {
        warn!(error = %err, "Watch cannot be cancelled cleanly");
    }

    let outcome = run_foreground(&mut timer, &reconciler, &cancel, TICK_INTERVAL, |view| {
        print!(
            "\r{} {} [{}]   ",
            progress_bar(view.progress_fraction),
            view.clock(),
            view.state.as_str()
        );
        let _ = std::io::stdout().flush();
    })?;
    println!();

    if cancel.load(Ordering::SeqCst) {
        println!("Stopped watching; the session keeps running");
        return Ok(());
    }
    match outcome {
        Some(ReconcileOutcome::Committed) => println!("Session complete"),
        Some(ReconcileOutcome::AlreadyTerminal) | Some(ReconcileOutcome::LostRace) => {
            println!("Session completed elsewhere")
        }
        Some(ReconcileOutcome::Pending { .. }) | None => println!("Session is not running"),
    }
    Ok(())
}

pub fn sweep(context: &Context) -> SweepOutcome {
    let sweep = BackgroundSweep::new(context.reconciler());
    let outcome = sweep.run(Utc::now());
    match outcome {
        SweepOutcome::NewData => println!("new_data"),
        SweepOutcome::NoData => println!("no_data"),
    }
    outcome
}

fn progress_bar(fraction: f64) -> String {
    let filled = (fraction.clamp(0.0, 1.0) * PROGRESS_BAR_WIDTH as f64).round() as usize;
    format!(
        "[{}{}]",
        "#".repeat(filled),
        "-".repeat(PROGRESS_BAR_WIDTH - filled)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_bar_fills_proportionally() {
        assert_eq!(progress_bar(0.0), format!("[{}]", "-".repeat(30)));
        assert_eq!(progress_bar(1.0), format!("[{}]", "#".repeat(30)));
        assert_eq!(
            progress_bar(0.5),
            format!("[{}{}]", "#".repeat(15), "-".repeat(15))
        );
        assert_eq!(progress_bar(3.0), progress_bar(1.0));
    }
}

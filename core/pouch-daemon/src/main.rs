//! Pouch sweep daemon.
//!
//! Stands in for the host's background scheduler: registers one completion
//! sweep with a [`ThreadTrigger`] and runs it every `[sweep] interval_secs`
//! (never more often than once a minute) until SIGINT or SIGTERM.

use std::env;

use chrono::Utc;
use pouch_core::{
    load_config, register_shutdown, BackgroundSweep, CompletionAlert, CompletionReconciler,
    PeriodicTrigger, PouchConfig, SessionController, SqliteStore, ThreadTrigger,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() {
    init_logging();

    let config = match load_config(None) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load pouch config; using defaults");
            PouchConfig::default()
        }
    };

    let db_path = match config.database_path() {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "Failed to resolve pouch database path");
            std::process::exit(1);
        }
    };

    let store = match SqliteStore::open(db_path) {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, "Failed to open pouch database");
            std::process::exit(1);
        }
    };

    let interval = config.sweep.interval();
    info!(
        owner = %config.owner,
        db = %store.path().display(),
        interval_secs = interval.as_secs(),
        notifier_command = !config.notification.command.is_empty(),
        "Pouch sweep daemon started"
    );

    let notification = config.notification;
    let sweep = BackgroundSweep::new(CompletionReconciler::new(
        SessionController::new(store, config.owner),
        CompletionAlert::with_text(
            notification.notifier(),
            notification.title,
            notification.body,
        ),
    ));

    let mut trigger = ThreadTrigger::new();
    trigger.register(interval, Box::new(move || sweep.run(Utc::now())));
    if let Err(err) = register_shutdown(&trigger.stop_flag()) {
        warn!(error = %err, "Shutdown signals not handled; daemon stops only when killed");
    }
    trigger.join();
    info!("Pouch sweep daemon stopped");
}

fn init_logging() {
    let debug_enabled = env::var("POUCH_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

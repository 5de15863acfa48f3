//! File logging for the CLI.
//!
//! stdout carries user-facing output, so logs go to a daily rolling file in
//! `~/.pouch/logs/`. `POUCH_DEBUG_LOG=1` forces debug level; otherwise
//! `RUST_LOG` applies, defaulting to `info`.

use std::env;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "pouch.log";

/// Installs the global subscriber. The returned guard flushes buffered log
/// lines on drop and must live until the process exits. Returns `None` when
/// the log directory cannot be created; logging is then disabled.
pub fn init() -> Option<WorkerGuard> {
    let log_dir = pouch_core::config::pouch_dir().ok()?.join("logs");
    fs_err::create_dir_all(&log_dir).ok()?;

    let appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Some(guard)
}

fn env_filter() -> EnvFilter {
    let debug_enabled = env::var("POUCH_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

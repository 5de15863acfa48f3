//! Best-effort completion alerts.
//!
//! Delivery is fire-and-forget: nothing here reports success, and nothing is
//! retried. A missed alert is acceptable; a duplicate is prevented upstream by
//! only notifying after a winning completion write.

use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

pub const DEFAULT_TITLE: &str = "Pouch Timer Complete";
pub const DEFAULT_BODY: &str = "Your pouch timer has finished!";

pub trait Notifier {
    fn fire_now(&self, title: &str, body: &str);
}

impl<T: Notifier + ?Sized> Notifier for &T {
    fn fire_now(&self, title: &str, body: &str) {
        (**self).fire_now(title, body)
    }
}

impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    fn fire_now(&self, title: &str, body: &str) {
        (**self).fire_now(title, body)
    }
}

impl<T: Notifier + ?Sized> Notifier for Box<T> {
    fn fire_now(&self, title: &str, body: &str) {
        (**self).fire_now(title, body)
    }
}

/// Emits the alert as a log event only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn fire_now(&self, title: &str, body: &str) {
        info!(title, body, "Notification");
    }
}

/// Spawns an external command with the title and body appended as the last
/// two arguments, e.g. `["notify-send", "--urgency=normal"]`. The child is
/// reaped on a detached thread so the caller never blocks on it.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
    args: Vec<String>,
}

impl CommandNotifier {
    /// Returns `None` for an empty argv.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// Spawns the command and returns the handle of the thread reaping it,
    /// or `None` when the spawn failed.
    fn dispatch(&self, title: &str, body: &str) -> Option<JoinHandle<Option<ExitStatus>>> {
        let spawned = Command::new(&self.program)
            .args(&self.args)
            .arg(title)
            .arg(body)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                warn!(program = %self.program, error = %err, "Notification command failed");
                return None;
            }
        };
        info!(program = %self.program, pid = child.id(), "Notification dispatched");

        let program = self.program.clone();
        Some(thread::spawn(move || match child.wait() {
            Ok(status) => {
                if !status.success() {
                    warn!(program = %program, status = %status, "Notification command exited with failure");
                }
                Some(status)
            }
            Err(err) => {
                warn!(program = %program, error = %err, "Failed to reap notification command");
                None
            }
        }))
    }
}

impl Notifier for CommandNotifier {
    fn fire_now(&self, title: &str, body: &str) {
        let _ = self.dispatch(title, body);
    }
}

/// Notifier plus the alert text it sends on completion.
pub struct CompletionAlert<N> {
    notifier: N,
    title: String,
    body: String,
}

impl<N: Notifier> CompletionAlert<N> {
    pub fn new(notifier: N) -> Self {
        Self::with_text(notifier, DEFAULT_TITLE, DEFAULT_BODY)
    }

    pub fn with_text(notifier: N, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            notifier,
            title: title.into(),
            body: body.into(),
        }
    }

    pub fn send(&self) {
        self.notifier.fire_now(&self.title, &self.body);
    }
}

//! SIGINT/SIGTERM handling for the long-running loops.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::debug;

use crate::error::{PouchError, Result};

/// Sets `flag` on SIGINT or SIGTERM instead of terminating the process.
///
/// Pass the daemon's [`crate::ThreadTrigger::stop_flag`] or the foreground
/// cancel flag; both loops poll it between runs, so a signal never cuts a
/// store write short.
pub fn register_shutdown(flag: &Arc<AtomicBool>) -> Result<()> {
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(flag))
            .map_err(|err| PouchError::SignalSetup(format!("signal {signal}: {err}")))?;
    }
    debug!("Shutdown signal handlers installed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn sigterm_sets_flag_without_exiting() {
        let flag = Arc::new(AtomicBool::new(false));
        register_shutdown(&flag).expect("register");

        signal_hook::low_level::raise(SIGTERM).expect("raise");

        assert!(flag.load(Ordering::SeqCst));
    }
}

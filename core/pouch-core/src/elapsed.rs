//! Active-time arithmetic.
//!
//! Pure functions of `(session, now)`. Nothing here reads the clock or the
//! store, so the foreground tick and the background sweep evaluate a freshly
//! read row the same way.
//!
//! ```text
//! wall_elapsed   = now - start_time
//! open_pause     = now - paused_at        (0 when running)
//! active_elapsed = wall_elapsed - total_pause_duration - open_pause   (>= 0)
//! remaining      = target - active_elapsed                           (>= 0)
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::types::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Elapsed {
    #[serde(rename = "active_ms", serialize_with = "millis")]
    pub active: Duration,
    #[serde(rename = "remaining_ms", serialize_with = "millis")]
    pub remaining: Duration,
    pub is_complete: bool,
}

fn millis<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(value.num_milliseconds())
}

/// Active (unpaused) time accumulated by `session` at `now`, never negative.
///
/// Terminal sessions are evaluated at their `end_time` so the value stops
/// growing once the session is closed.
pub fn active_elapsed(session: &Session, now: DateTime<Utc>) -> Duration {
    let at = match session.end_time {
        Some(end) if end < now => end,
        _ => now,
    };

    let wall = at.signed_duration_since(session.start_time);
    let open_pause = match session.paused_at {
        Some(paused_at) if !session.is_terminal() => {
            non_negative(at.signed_duration_since(paused_at))
        }
        _ => Duration::zero(),
    };

    non_negative(wall - session.total_pause_duration - open_pause)
}

pub fn evaluate(session: &Session, now: DateTime<Utc>) -> Elapsed {
    let active = active_elapsed(session, now);
    let target = session.target_duration();
    let remaining = non_negative(target - active);

    // A paused session never self-completes; it has to cross the threshold
    // while running. A zero target counts as already reached.
    let is_complete = !session.is_terminal()
        && session.paused_at.is_none()
        && (session.target_minutes == 0 || active >= target);

    Elapsed {
        active,
        remaining,
        is_complete,
    }
}

/// `active / target`, clamped to `[0, 1]`. A zero target reports full progress.
pub fn progress_fraction(session: &Session, now: DateTime<Utc>) -> f64 {
    let target_ms = session.target_duration().num_milliseconds();
    if target_ms <= 0 {
        return 1.0;
    }
    let active_ms = active_elapsed(session, now).num_milliseconds();
    (active_ms as f64 / target_ms as f64).clamp(0.0, 1.0)
}

/// Whole seconds left, rounded up so the display reaches `0:00` only when the
/// target is actually met.
pub fn remaining_seconds(session: &Session, now: DateTime<Utc>) -> u64 {
    let remaining_ms = evaluate(session, now).remaining.num_milliseconds();
    if remaining_ms <= 0 {
        0
    } else {
        ((remaining_ms + 999) / 1000) as u64
    }
}

fn non_negative(value: Duration) -> Duration {
    if value < Duration::zero() {
        Duration::zero()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewSession, SessionId};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 30, 9, 0, 0).unwrap()
    }

    fn session(target_minutes: u32) -> Session {
        NewSession {
            owner: "alice".to_string(),
            target_minutes,
            start_time: t0(),
        }
        .into_session(SessionId::from("s-1"))
    }

    fn mins(value: i64) -> Duration {
        Duration::minutes(value)
    }

    #[test]
    fn never_paused_session_tracks_wall_clock() {
        let record = session(10);
        for minute in [0, 1, 7, 30] {
            let now = t0() + mins(minute);
            assert_eq!(active_elapsed(&record, now), mins(minute));
        }
    }

    #[test]
    fn clock_skew_clamps_to_zero() {
        let record = session(10);
        let before_start = t0() - Duration::seconds(45);
        assert_eq!(active_elapsed(&record, before_start), Duration::zero());
        assert_eq!(evaluate(&record, before_start).remaining, mins(10));
        assert_eq!(progress_fraction(&record, before_start), 0.0);
    }

    #[test]
    fn closed_pause_interval_is_subtracted() {
        let mut record = session(10);
        record.total_pause_duration = mins(4);

        assert_eq!(active_elapsed(&record, t0() + mins(9)), mins(5));
        assert_eq!(active_elapsed(&record, t0() + mins(20)), mins(16));
    }

    #[test]
    fn pause_then_resume_scenario() {
        // Paused at T+2 for 3 minutes, resumed at T+5.
        let mut record = session(10);
        record.total_pause_duration = mins(3);

        let at_14 = evaluate(&record, t0() + mins(14));
        assert_eq!(at_14.active, mins(9));
        assert!(!at_14.is_complete);

        let at_15 = evaluate(&record, t0() + mins(15));
        assert_eq!(at_15.active, mins(10));
        assert!(at_15.is_complete);
    }

    #[test]
    fn open_pause_is_excluded_and_blocks_completion() {
        let mut record = session(10);
        record.paused_at = Some(t0() + mins(8));

        let later = evaluate(&record, t0() + mins(60));
        assert_eq!(later.active, mins(8));
        assert_eq!(later.remaining, mins(2));
        assert!(!later.is_complete);
    }

    #[test]
    fn paused_after_reaching_target_is_not_complete() {
        let mut record = session(10);
        record.paused_at = Some(t0() + mins(12));

        let result = evaluate(&record, t0() + mins(13));
        assert_eq!(result.active, mins(12));
        assert_eq!(result.remaining, Duration::zero());
        assert!(!result.is_complete);
    }

    #[test]
    fn zero_target_is_already_complete() {
        let record = session(0);
        let result = evaluate(&record, t0());
        assert!(result.is_complete);
        assert_eq!(result.remaining, Duration::zero());
        assert_eq!(progress_fraction(&record, t0()), 1.0);
    }

    #[test]
    fn terminal_session_freezes_at_end_time() {
        let mut record = session(10);
        record.is_active = false;
        record.end_time = Some(t0() + mins(6));

        let result = evaluate(&record, t0() + mins(45));
        assert_eq!(result.active, mins(6));
        assert!(!result.is_complete);
    }

    #[test]
    fn remaining_seconds_rounds_up_and_progress_clamps() {
        let record = session(1);
        let now = t0() + Duration::milliseconds(500);
        assert_eq!(remaining_seconds(&record, now), 60);
        assert_eq!(remaining_seconds(&record, t0() + mins(5)), 0);
        assert_eq!(progress_fraction(&record, t0() + mins(5)), 1.0);
        assert!((progress_fraction(&record, t0() + Duration::seconds(15)) - 0.25).abs() < 1e-9);
    }
}

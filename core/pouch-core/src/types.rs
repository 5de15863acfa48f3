//! Persistent session model shared by every component.
//!
//! A [`Session`] is the only durable entity. Lifecycle fields are written
//! exclusively through [`crate::lifecycle::SessionController`]; everything
//! else reads snapshots and recomputes derived values on demand.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Opaque session identifier (ULID text).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coarse lifecycle view of a session, as exposed to presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// No session is being viewed.
    Idle,
    Active,
    Paused,
    /// `end_time` is set; reached by stop or completion.
    Terminal,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Active => "active",
            LifecycleState::Paused => "paused",
            LifecycleState::Terminal => "terminal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub owner: String,
    pub start_time: DateTime<Utc>,
    /// Target active time in minutes.
    pub target_minutes: u32,
    pub is_active: bool,
    #[serde(default)]
    pub paused_at: Option<DateTime<Utc>>,
    /// Sum of closed pause intervals; the open interval is not included.
    #[serde(with = "duration_ms", rename = "total_pause_ms")]
    pub total_pause_duration: Duration,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl Session {
    pub fn target_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.target_minutes))
    }

    pub fn is_terminal(&self) -> bool {
        self.end_time.is_some() || !self.is_active
    }

    pub fn is_paused(&self) -> bool {
        !self.is_terminal() && self.paused_at.is_some()
    }

    pub fn state(&self) -> LifecycleState {
        if self.is_terminal() {
            LifecycleState::Terminal
        } else if self.paused_at.is_some() {
            LifecycleState::Paused
        } else {
            LifecycleState::Active
        }
    }
}

/// Input for [`crate::store::SessionStore::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub owner: String,
    pub target_minutes: u32,
    pub start_time: DateTime<Utc>,
}

impl NewSession {
    pub(crate) fn into_session(self, id: SessionId) -> Session {
        Session {
            id,
            owner: self.owner,
            start_time: self.start_time,
            target_minutes: self.target_minutes,
            is_active: true,
            paused_at: None,
            total_pause_duration: Duration::zero(),
            end_time: None,
        }
    }
}

mod duration_ms {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        i64::deserialize(deserializer).map(Duration::milliseconds)
    }
}

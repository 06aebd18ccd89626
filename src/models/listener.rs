use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chat-platform user identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        UserId(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        UserId(value)
    }
}

/// Voice presence of a single user as reported by the platform adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Active,
    Muted,
    Deafened,
    Absent,
}

impl Presence {
    /// Muted and deafened users count as absent
    pub fn is_listening(self) -> bool {
        matches!(self, Presence::Active)
    }
}

/// State changes of the bot's own voice connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportEvent {
    Ready,
    Muted,
    Unmuted,
    Disconnected,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListenerStatus {
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
    pub songs_listened: u32,
    pub auto_end: Option<u32>,
    pub skip_vote: bool,
    pub neutral: bool,
}

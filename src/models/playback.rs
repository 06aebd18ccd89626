use crate::models::{SongHash, SongInfo, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPhase {
    Idle,
    Pending,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayOutcome {
    Completed,
    Skipped,
    Stopped,
}

/// Direction a listener's curators pushed a song when it was picked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasSign {
    Positive,
    Negative,
    Neutral,
}

impl BiasSign {
    pub fn of(value: Decimal) -> Self {
        if value.is_zero() {
            BiasSign::Neutral
        } else if value.is_sign_positive() {
            BiasSign::Positive
        } else {
            BiasSign::Negative
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub song: SongHash,
    pub requester: UserId,
    pub inserted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub song: SongInfo,
    pub requester: Option<UserId>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
    pub outcome: PlayOutcome,
    /// Curator bias of each listener present when the song was picked
    pub listener_bias: BTreeMap<UserId, BiasSign>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NowPlaying {
    pub phase: PlaybackPhase,
    pub enabled: bool,
    pub song: Option<SongInfo>,
    pub requester: Option<UserId>,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_secs: f64,
    pub listeners: usize,
    pub skip_votes: usize,
    pub skip_required: usize,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SkipOutcome {
    pub votes: usize,
    pub required: usize,
    pub skipped: bool,
}

use crate::models::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Key under which scheduler statistics live in the library's metadata map
pub const STATS_KEY: &str = "voice_radio";

/// Stable content identity of a song
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SongHash(pub String);

impl fmt::Display for SongHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SongHash {
    fn from(value: &str) -> Self {
        SongHash(value.to_string())
    }
}

impl From<String> for SongHash {
    fn from(value: String) -> Self {
        SongHash(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Song {
    pub hash: SongHash,
    pub title: String,
    pub artist: String,
    /// Length in seconds
    pub length: u32,
    /// Integrated loudness in dB, when it has been measured
    #[serde(default)]
    pub loudness: Option<f64>,
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    pub added_at: DateTime<Utc>,
}

/// Per-song playback statistics kept by the scheduler
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SongStats {
    #[serde(default)]
    pub plays: u32,
    #[serde(default)]
    pub last_played: Option<DateTime<Utc>>,
    /// Skip events: when the song was voted off, and by whom
    #[serde(default)]
    pub skips: BTreeMap<DateTime<Utc>, BTreeSet<UserId>>,
    /// Manual loudness correction in dB
    #[serde(default)]
    pub volume_tweak: Option<f64>,
}

impl SongStats {
    pub fn record_play(&mut self, at: DateTime<Utc>) {
        self.plays = self.plays.saturating_add(1);
        self.last_played = Some(at);
    }

    pub fn record_skip(&mut self, at: DateTime<Utc>, voters: impl IntoIterator<Item = UserId>) {
        self.skips.entry(at).or_default().extend(voters);
    }

    /// Most recent time `user` voted this song off
    pub fn last_skip_by(&self, user: &UserId) -> Option<DateTime<Utc>> {
        self.skips
            .iter()
            .rev()
            .find(|(_, voters)| voters.contains(user))
            .map(|(at, _)| *at)
    }
}

/// Song as shown to listeners
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongInfo {
    pub hash: SongHash,
    pub title: String,
    pub artist: String,
    pub length: u32,
}

impl From<&Song> for SongInfo {
    fn from(song: &Song) -> Self {
        SongInfo {
            hash: song.hash.clone(),
            title: song.title.clone(),
            artist: song.artist.clone(),
            length: song.length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn last_skip_by_finds_most_recent_vote() {
        let now = Utc::now();
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");
        let mut stats = SongStats::default();

        stats.record_skip(now - Duration::hours(3), [alice.clone()]);
        stats.record_skip(now - Duration::hours(1), [alice.clone(), bob.clone()]);
        stats.record_skip(now, [bob.clone()]);

        assert_eq!(stats.last_skip_by(&alice), Some(now - Duration::hours(1)));
        assert_eq!(stats.last_skip_by(&bob), Some(now));
        assert_eq!(stats.last_skip_by(&UserId::from("carol")), None);
    }

    #[test]
    fn stats_survive_json_metadata() {
        let now = Utc::now();
        let mut stats = SongStats::default();
        stats.record_play(now);
        stats.record_skip(now, [UserId::from("alice")]);

        let value = serde_json::to_value(&stats).unwrap();
        let back: SongStats = serde_json::from_value(value).unwrap();
        assert_eq!(back, stats);

        let empty: SongStats = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(empty.plays, 0);
    }
}

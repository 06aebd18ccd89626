//! Recently played songs
//!
//! Bounded ring buffer; the oldest entry is discarded once full. Besides the
//! listing it feeds the slide computation of the priority engine.

use crate::models::{BiasSign, HistoryEntry, UserId};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct History {
    /// Most recent entry at the back
    entries: VecDeque<HistoryEntry>,
    max_size: usize,
}

impl History {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.max_size == 0 {
            return;
        }
        if self.entries.len() >= self.max_size {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Entries newest first
    pub fn recent(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().rev()
    }

    /// Bias signs recorded for `user` within the last `window` entries,
    /// newest first
    pub fn bias_of(&self, user: &UserId, window: usize) -> Vec<BiasSign> {
        self.recent()
            .take(window)
            .filter_map(|entry| entry.listener_bias.get(user).copied())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PlayOutcome, SongInfo};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn entry(hash: &str, bias: &[(&str, BiasSign)]) -> HistoryEntry {
        HistoryEntry {
            id: Uuid::new_v4(),
            song: SongInfo {
                hash: hash.into(),
                title: format!("Song {}", hash),
                artist: "Test Artist".to_string(),
                length: 180,
            },
            requester: None,
            started_at: Some(Utc::now()),
            ended_at: Utc::now(),
            outcome: PlayOutcome::Completed,
            listener_bias: bias
                .iter()
                .map(|(user, sign)| (UserId::from(*user), *sign))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn discards_oldest_when_full() {
        let mut history = History::new(2);
        history.push(entry("a", &[]));
        history.push(entry("b", &[]));
        history.push(entry("c", &[]));

        let hashes: Vec<_> = history.recent().map(|e| e.song.hash.0.clone()).collect();
        assert_eq!(hashes, vec!["c", "b"]);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn bias_of_respects_window_and_presence() {
        let mut history = History::new(10);
        history.push(entry("a", &[("alice", BiasSign::Negative)]));
        history.push(entry("b", &[("bob", BiasSign::Positive)]));
        history.push(entry("c", &[("alice", BiasSign::Positive)]));
        history.push(entry("d", &[("alice", BiasSign::Positive), ("bob", BiasSign::Neutral)]));

        let alice = UserId::from("alice");
        assert_eq!(
            history.bias_of(&alice, 10),
            vec![BiasSign::Positive, BiasSign::Positive, BiasSign::Negative]
        );
        assert_eq!(history.bias_of(&alice, 2), vec![BiasSign::Positive, BiasSign::Positive]);
        assert!(history.bias_of(&UserId::from("carol"), 10).is_empty());
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut history = History::new(0);
        history.push(entry("a", &[]));
        assert!(history.is_empty());
    }
}

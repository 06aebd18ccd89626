//! Listener request queue
//!
//! Bounded and ordered for fairness: a requester with fewer pending requests
//! than the busiest requester is slotted in round-robin fashion instead of
//! waiting at the tail. Demand requests jump to the head.

use crate::models::{QueueEntry, SongHash, UserId};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of pending requests
    pub max_size: usize,
    /// How long a song that just left the queue may not be requested again
    pub requeue_cooldown: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 20,
            requeue_cooldown: Duration::minutes(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueManager {
    entries: Vec<QueueEntry>,
    config: QueueConfig,
    /// When each song was last taken off the queue for playback
    dequeued: HashMap<SongHash, DateTime<Utc>>,
}

impl QueueManager {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            entries: Vec::with_capacity(config.max_size),
            config,
            dequeued: HashMap::new(),
        }
    }

    /// Add a request. Returns false when the song is already queued, was
    /// dequeued too recently, or there is no room for it.
    pub fn enqueue(
        &mut self,
        song: SongHash,
        requester: UserId,
        demand: bool,
        now: DateTime<Utc>,
    ) -> bool {
        if self.config.max_size == 0 || self.position(&song).is_some() {
            return false;
        }

        let cooldown = self.config.requeue_cooldown;
        self.dequeued.retain(|_, at| now - *at < cooldown);
        if self.dequeued.contains_key(&song) {
            tracing::debug!("Song {} was just played from the queue, refusing request", song);
            return false;
        }

        let entry = QueueEntry {
            song: song.clone(),
            requester: requester.clone(),
            inserted_at: now,
        };

        if demand {
            self.entries.insert(0, entry);
            self.entries.truncate(self.config.max_size);
            return true;
        }

        let counts = self.requester_counts();
        let own = counts.get(&requester).copied().unwrap_or(0);
        let busiest = counts.values().copied().max().unwrap_or(0);

        if own >= busiest {
            if self.entries.len() >= self.config.max_size {
                return false;
            }
            self.entries.push(entry);
            return true;
        }

        let index = self.fair_position(own + 1);
        self.entries.insert(index, entry);
        self.entries.truncate(self.config.max_size);
        self.position(&song).is_some()
    }

    /// Remove every request of `requester`, returning how many were removed
    pub fn withdraw(&mut self, requester: &UserId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| &entry.requester != requester);
        before - self.entries.len()
    }

    /// Remove a song picked for playback and remember when it left
    pub fn take(&mut self, song: &SongHash, now: DateTime<Utc>) -> Option<QueueEntry> {
        let index = self.position(song)?;
        self.dequeued.insert(song.clone(), now);
        Some(self.entries.remove(index))
    }

    pub fn position(&self, song: &SongHash) -> Option<usize> {
        self.entries.iter().position(|entry| &entry.song == song)
    }

    /// Queue positions of every pending song
    pub fn positions(&self) -> HashMap<SongHash, usize> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (entry.song.clone(), index))
            .collect()
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.config.max_size
    }

    fn requester_counts(&self) -> HashMap<&UserId, usize> {
        let mut counts = HashMap::new();
        for entry in &self.entries {
            *counts.entry(&entry.requester).or_insert(0) += 1;
        }
        counts
    }

    /// Index just after the last entry that is at most its requester's
    /// `round`-th request, i.e. the end of that round-robin round.
    fn fair_position(&self, round: usize) -> usize {
        let mut seen: HashMap<&UserId, usize> = HashMap::new();
        let mut index = 0;
        for (i, entry) in self.entries.iter().enumerate() {
            let occurrence = seen.entry(&entry.requester).or_insert(0);
            *occurrence += 1;
            if *occurrence <= round {
                index = i + 1;
            }
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(max_size: usize) -> QueueManager {
        QueueManager::new(QueueConfig {
            max_size,
            requeue_cooldown: Duration::minutes(10),
        })
    }

    fn order(queue: &QueueManager) -> Vec<String> {
        queue
            .entries()
            .iter()
            .map(|e| format!("{}:{}", e.requester, e.song))
            .collect()
    }

    #[test]
    fn interleaves_requesters_round_robin() {
        let now = Utc::now();
        let mut q = queue(10);
        assert!(q.enqueue("a1".into(), "alice".into(), false, now));
        assert!(q.enqueue("a2".into(), "alice".into(), false, now));
        assert!(q.enqueue("a3".into(), "alice".into(), false, now));
        assert!(q.enqueue("b1".into(), "bob".into(), false, now));
        assert!(q.enqueue("c1".into(), "carol".into(), false, now));
        assert!(q.enqueue("b2".into(), "bob".into(), false, now));

        assert_eq!(
            order(&q),
            vec!["alice:a1", "bob:b1", "carol:c1", "alice:a2", "bob:b2", "alice:a3"]
        );
    }

    #[test]
    fn demand_jumps_to_head_and_truncates_tail() {
        let now = Utc::now();
        let mut q = queue(2);
        assert!(q.enqueue("a1".into(), "alice".into(), false, now));
        assert!(q.enqueue("a2".into(), "alice".into(), false, now));
        assert!(q.enqueue("d1".into(), "dave".into(), true, now));

        assert_eq!(order(&q), vec!["dave:d1", "alice:a1"]);
    }

    #[test]
    fn never_exceeds_capacity_and_rejects_duplicates() {
        let now = Utc::now();
        let mut q = queue(3);
        for (i, user) in ["alice", "bob", "alice", "carol", "bob", "dave"].iter().enumerate() {
            q.enqueue(format!("s{}", i).into(), (*user).into(), false, now);
            assert!(q.len() <= 3);
        }
        assert_eq!(q.len(), 3);

        let before = order(&q);
        let queued = q.entries()[0].song.clone();
        assert!(!q.enqueue(queued.clone(), "zed".into(), false, now));
        assert!(!q.enqueue(queued, "zed".into(), true, now));
        assert_eq!(order(&q), before);
    }

    #[test]
    fn busiest_requester_is_rejected_when_full() {
        let now = Utc::now();
        let mut q = queue(2);
        assert!(q.enqueue("a1".into(), "alice".into(), false, now));
        assert!(q.enqueue("a2".into(), "alice".into(), false, now));
        assert!(!q.enqueue("a3".into(), "alice".into(), false, now));
        // A less busy requester displaces the tail instead
        assert!(q.enqueue("b1".into(), "bob".into(), false, now));
        assert_eq!(order(&q), vec!["alice:a1", "bob:b1"]);
    }

    #[test]
    fn withdraw_removes_only_that_requester() {
        let now = Utc::now();
        let mut q = queue(10);
        q.enqueue("a1".into(), "alice".into(), false, now);
        q.enqueue("b1".into(), "bob".into(), false, now);
        q.enqueue("a2".into(), "alice".into(), false, now);

        assert_eq!(q.withdraw(&"alice".into()), 2);
        assert_eq!(order(&q), vec!["bob:b1"]);
        assert_eq!(q.withdraw(&"alice".into()), 0);
        assert_eq!(q.withdraw(&"nobody".into()), 0);
    }

    #[test]
    fn taken_song_cools_down_before_requeue() {
        let now = Utc::now();
        let mut q = queue(10);
        q.enqueue("a1".into(), "alice".into(), false, now);

        let taken = q.take(&"a1".into(), now).unwrap();
        assert_eq!(taken.requester, UserId::from("alice"));
        assert!(q.is_empty());

        assert!(!q.enqueue("a1".into(), "bob".into(), false, now + Duration::minutes(1)));
        assert!(q.enqueue("a1".into(), "bob".into(), false, now + Duration::minutes(11)));
    }
}

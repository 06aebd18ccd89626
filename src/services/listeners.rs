//! Listener sessions
//!
//! Tracks who is actually listening, their skip votes and auto-end counters.
//! A departing listener gets a withdrawal timer; if they are still gone when
//! it fires, their queued requests are dropped. The timers live here keyed by
//! user so they outlive the session that started them.

use crate::models::{ListenerStatus, Presence, UserId};
use crate::services::timer::TimerSlot;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::mpsc::WeakSender;

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// How long a departed listener's requests stay queued
    pub withdrawal_delay: Duration,
    pub auto_end_max: u32,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            withdrawal_delay: Duration::from_secs(300),
            auto_end_max: 50,
        }
    }
}

#[derive(Debug, Clone)]
struct ListenerSession {
    joined_at: DateTime<Utc>,
    songs_listened: u32,
    auto_end: Option<u32>,
    skip_vote: bool,
    neutral: bool,
}

impl ListenerSession {
    fn new(joined_at: DateTime<Utc>) -> Self {
        Self {
            joined_at,
            songs_listened: 0,
            auto_end: None,
            skip_vote: false,
            neutral: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChange {
    Arrived,
    /// `had_vote` is set when the listener's skip vote went with them
    Departed { had_vote: bool },
    Unchanged,
}

#[derive(Debug, Default)]
pub struct ListenerTracker {
    config: ListenerConfig,
    sessions: BTreeMap<UserId, ListenerSession>,
    withdrawals: HashMap<UserId, TimerSlot>,
}

impl ListenerTracker {
    pub fn new(config: ListenerConfig) -> Self {
        Self {
            config,
            sessions: BTreeMap::new(),
            withdrawals: HashMap::new(),
        }
    }

    /// Apply a presence report. Departures arm the withdrawal timer, which
    /// posts `on_withdrawal(generation)` back through `tx`.
    pub fn update_presence<M, F>(
        &mut self,
        user: &UserId,
        presence: Presence,
        now: DateTime<Utc>,
        tx: &WeakSender<M>,
        on_withdrawal: F,
    ) -> PresenceChange
    where
        M: Send + 'static,
        F: FnOnce(u64) -> M + Send + 'static,
    {
        let listening = presence.is_listening();
        let present = self.sessions.contains_key(user);

        if listening && !present {
            if self.cancel_withdrawal(user) {
                tracing::debug!("{} returned, keeping their requests", user);
            }
            self.sessions.insert(user.clone(), ListenerSession::new(now));
            tracing::info!("{} started listening", user);
            return PresenceChange::Arrived;
        }

        if !listening && present {
            let had_vote = self
                .sessions
                .remove(user)
                .map(|session| session.skip_vote)
                .unwrap_or(false);
            self.withdrawals.entry(user.clone()).or_default().arm(
                self.config.withdrawal_delay,
                tx,
                on_withdrawal,
            );
            tracing::info!("{} stopped listening ({:?})", user, presence);
            return PresenceChange::Departed { had_vote };
        }

        PresenceChange::Unchanged
    }

    /// Accept a fired withdrawal timer. False for stale or cancelled timers,
    /// in which case the requests must stay.
    pub fn fire_withdrawal(&mut self, user: &UserId, generation: u64) -> bool {
        let fired = self
            .withdrawals
            .get_mut(user)
            .map(|slot| slot.take_fired(generation))
            .unwrap_or(false);
        if fired {
            self.withdrawals.remove(user);
        }
        fired
    }

    pub fn cancel_withdrawal(&mut self, user: &UserId) -> bool {
        self.withdrawals
            .remove(user)
            .map(|mut slot| slot.cancel())
            .unwrap_or(false)
    }

    pub fn cancel_all_withdrawals(&mut self) {
        for (_, mut slot) in self.withdrawals.drain() {
            slot.cancel();
        }
    }

    pub fn pending_withdrawals(&self) -> usize {
        self.withdrawals.len()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Present listeners whose preferences count
    pub fn scoring_listeners(&self) -> Vec<UserId> {
        self.sessions
            .iter()
            .filter(|(_, session)| !session.neutral)
            .map(|(user, _)| user.clone())
            .collect()
    }

    pub fn set_neutral(&mut self, user: &UserId, neutral: bool) -> Option<ListenerStatus> {
        let session = self.sessions.get_mut(user)?;
        session.neutral = neutral;
        Some(status(user, session))
    }

    /// Set or clear the number of songs after which `user` is disconnected
    pub fn set_auto_end(&mut self, user: &UserId, songs: Option<u32>) -> Option<ListenerStatus> {
        let max = self.config.auto_end_max;
        let session = self.sessions.get_mut(user)?;
        session.auto_end = songs.filter(|n| *n > 0).map(|n| n.min(max));
        Some(status(user, session))
    }

    /// Register a skip vote. `None` when `user` is not listening.
    pub fn cast_vote(&mut self, user: &UserId) -> Option<usize> {
        self.sessions.get_mut(user)?.skip_vote = true;
        Some(self.counted_votes())
    }

    /// Votes toward the threshold. Neutral voters only count once everyone
    /// present is neutral.
    pub fn counted_votes(&self) -> usize {
        let all_neutral = self.sessions.values().all(|s| s.neutral);
        self.sessions
            .values()
            .filter(|s| s.skip_vote && (all_neutral || !s.neutral))
            .count()
    }

    /// Votes needed to skip. Neutral listeners are exempt unless everyone is.
    pub fn required_votes(&self) -> usize {
        let counted = self.sessions.values().filter(|s| !s.neutral).count();
        if counted == 0 {
            self.sessions.len()
        } else {
            counted
        }
    }

    /// Reset every vote, returning who had voted
    pub fn clear_votes(&mut self) -> Vec<UserId> {
        self.sessions
            .iter_mut()
            .filter(|(_, session)| session.skip_vote)
            .map(|(user, session)| {
                session.skip_vote = false;
                user.clone()
            })
            .collect()
    }

    /// Count a finished song for everyone present. Returns the listeners
    /// whose auto-end counter ran out.
    pub fn complete_song(&mut self) -> Vec<UserId> {
        let mut expired = Vec::new();
        for (user, session) in self.sessions.iter_mut() {
            session.songs_listened = session.songs_listened.saturating_add(1);
            if let Some(remaining) = session.auto_end {
                let remaining = remaining.saturating_sub(1);
                if remaining == 0 {
                    session.auto_end = None;
                    expired.push(user.clone());
                } else {
                    session.auto_end = Some(remaining);
                }
            }
        }
        expired
    }

    pub fn statuses(&self) -> Vec<ListenerStatus> {
        self.sessions
            .iter()
            .map(|(user, session)| status(user, session))
            .collect()
    }
}

fn status(user: &UserId, session: &ListenerSession) -> ListenerStatus {
    ListenerStatus {
        user_id: user.clone(),
        joined_at: session.joined_at,
        songs_listened: session.songs_listened,
        auto_end: session.auto_end,
        skip_vote: session.skip_vote,
        neutral: session.neutral,
    }
}

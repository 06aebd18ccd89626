//! Playback scheduler
//!
//! A single task owns the queue, the listener sessions, the history and the
//! playback state, and handles commands and timer deliveries one at a time
//! from its channel. [`SchedulerHandle`] is the only way in.
//!
//! Phases: Idle -> Pending (song picked, lead-in running) -> Playing, with
//! Playing <-> Paused while nobody listens. Any phase falls back to Idle on
//! disable, transport loss or pause expiry.

use crate::error::{AppError, Result};
use crate::models::{
    BiasSign, HistoryEntry, ListenerStatus, NowPlaying, PlayOutcome, PlaybackPhase, Presence,
    QueueEntry, SkipOutcome, Song, SongHash, SongInfo, TransportEvent, UserId,
};
use crate::services::history::History;
use crate::services::library::{load_stats, store_stats, Library};
use crate::services::listeners::{ListenerConfig, ListenerTracker, PresenceChange};
use crate::services::priority::PriorityTrace;
use crate::services::queue::{QueueConfig, QueueManager};
use crate::services::sampler::{Sampler, Selection};
use crate::services::timer::TimerSlot;
use crate::services::voice::VoiceGateway;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, WeakSender};
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delay between picking a song and starting it
    pub lead_in: Duration,
    /// How long a paused song is kept before it is abandoned
    pub pause_expiry: Duration,
    pub base_volume: f64,
    /// Loudness (dB) songs are normalized to
    pub reference_loudness: f64,
    pub max_attenuation_db: f64,
    pub history_size: usize,
    /// Minimum spacing of "up next" announcements
    pub announce_interval: Duration,
    pub start_enabled: bool,
    pub queue: QueueConfig,
    pub listeners: ListenerConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lead_in: Duration::from_secs(3),
            pause_expiry: Duration::from_secs(120),
            base_volume: 0.5,
            reference_loudness: -14.0,
            max_attenuation_db: 20.0,
            history_size: 50,
            announce_interval: Duration::from_secs(30),
            start_enabled: true,
            queue: QueueConfig::default(),
            listeners: ListenerConfig::default(),
        }
    }
}

/// Playback volume for a song: attenuate loud songs down to the reference
/// loudness, never amplify quiet ones
pub fn normalized_volume(
    base: f64,
    loudness: Option<f64>,
    tweak: Option<f64>,
    config: &SchedulerConfig,
) -> f64 {
    let gain = match loudness {
        Some(loudness) => (config.reference_loudness - loudness + tweak.unwrap_or(0.0))
            .min(0.0)
            .max(-config.max_attenuation_db),
        None => 0.0,
    };
    base * 10f64.powf(gain / 20.0)
}

pub enum Command {
    Presence {
        user: UserId,
        presence: Presence,
        reply: oneshot::Sender<()>,
    },
    Transport {
        event: TransportEvent,
        reply: oneshot::Sender<()>,
    },
    StreamEnded {
        hash: Option<SongHash>,
        reply: oneshot::Sender<bool>,
    },
    VoteSkip {
        user: UserId,
        reply: oneshot::Sender<Result<SkipOutcome>>,
    },
    Enqueue {
        hash: SongHash,
        requester: UserId,
        demand: bool,
        reply: oneshot::Sender<Result<bool>>,
    },
    Withdraw {
        requester: UserId,
        reply: oneshot::Sender<usize>,
    },
    Queue {
        reply: oneshot::Sender<Vec<QueueEntry>>,
    },
    History {
        reply: oneshot::Sender<Vec<HistoryEntry>>,
    },
    NowPlaying {
        reply: oneshot::Sender<NowPlaying>,
    },
    Listeners {
        reply: oneshot::Sender<Vec<ListenerStatus>>,
    },
    SetVolume {
        volume: f64,
        reply: oneshot::Sender<Result<f64>>,
    },
    SetEnabled {
        enabled: bool,
        reply: oneshot::Sender<()>,
    },
    SetNeutral {
        user: UserId,
        neutral: bool,
        reply: oneshot::Sender<Option<ListenerStatus>>,
    },
    SetAutoEnd {
        user: UserId,
        songs: Option<u32>,
        reply: oneshot::Sender<Option<ListenerStatus>>,
    },
    Trace {
        hash: SongHash,
        reply: oneshot::Sender<Result<PriorityTrace>>,
    },
    Stop {
        reply: oneshot::Sender<bool>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    LeadIn { generation: u64 },
    PauseExpired { generation: u64 },
    Withdrawal { user: UserId, generation: u64 },
}

pub enum Message {
    Command(Command),
    Timer(TimerEvent),
}

/// Cloneable handle to a running scheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Message>,
}

impl SchedulerHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message::Command(make(reply)))
            .await
            .map_err(|_| AppError::SchedulerUnavailable)?;
        rx.await.map_err(|_| AppError::SchedulerUnavailable)
    }

    pub async fn presence(&self, user: UserId, presence: Presence) -> Result<()> {
        self.request(|reply| Command::Presence {
            user,
            presence,
            reply,
        })
        .await
    }

    pub async fn transport(&self, event: TransportEvent) -> Result<()> {
        self.request(|reply| Command::Transport { event, reply }).await
    }

    /// Report that the current stream finished. Returns false when the report
    /// does not concern the current song.
    pub async fn stream_ended(&self, hash: Option<SongHash>) -> Result<bool> {
        self.request(|reply| Command::StreamEnded { hash, reply })
            .await
    }

    pub async fn vote_skip(&self, user: UserId) -> Result<SkipOutcome> {
        self.request(|reply| Command::VoteSkip { user, reply })
            .await?
    }

    pub async fn enqueue(&self, hash: SongHash, requester: UserId, demand: bool) -> Result<bool> {
        self.request(|reply| Command::Enqueue {
            hash,
            requester,
            demand,
            reply,
        })
        .await?
    }

    pub async fn withdraw(&self, requester: UserId) -> Result<usize> {
        self.request(|reply| Command::Withdraw { requester, reply })
            .await
    }

    pub async fn queue(&self) -> Result<Vec<QueueEntry>> {
        self.request(|reply| Command::Queue { reply }).await
    }

    pub async fn history(&self) -> Result<Vec<HistoryEntry>> {
        self.request(|reply| Command::History { reply }).await
    }

    pub async fn now_playing(&self) -> Result<NowPlaying> {
        self.request(|reply| Command::NowPlaying { reply }).await
    }

    pub async fn listeners(&self) -> Result<Vec<ListenerStatus>> {
        self.request(|reply| Command::Listeners { reply }).await
    }

    pub async fn set_volume(&self, volume: f64) -> Result<f64> {
        self.request(|reply| Command::SetVolume { volume, reply })
            .await?
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.request(|reply| Command::SetEnabled { enabled, reply })
            .await
    }

    pub async fn set_neutral(&self, user: UserId, neutral: bool) -> Result<ListenerStatus> {
        let missing = AppError::NotFound(format!("{} is not listening", user));
        self.request(|reply| Command::SetNeutral {
            user,
            neutral,
            reply,
        })
        .await?
        .ok_or(missing)
    }

    pub async fn set_auto_end(&self, user: UserId, songs: Option<u32>) -> Result<ListenerStatus> {
        let missing = AppError::NotFound(format!("{} is not listening", user));
        self.request(|reply| Command::SetAutoEnd { user, songs, reply })
            .await?
            .ok_or(missing)
    }

    pub async fn trace(&self, hash: SongHash) -> Result<PriorityTrace> {
        self.request(|reply| Command::Trace { hash, reply }).await?
    }

    /// End the current song. Returns whether anything was playing.
    pub async fn stop(&self) -> Result<bool> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}

pub struct Scheduler;

impl Scheduler {
    pub fn spawn(
        config: SchedulerConfig,
        sampler: Sampler,
        library: Arc<dyn Library>,
        voice: Arc<dyn VoiceGateway>,
        rng: StdRng,
    ) -> SchedulerHandle {
        let (tx, rx) = mpsc::channel(64);
        let actor = SchedulerActor::new(config, sampler, library, voice, rng, tx.downgrade());
        tokio::spawn(actor.run(rx));
        SchedulerHandle { tx }
    }
}

/// The song currently pending, playing or paused
struct Current {
    song: Song,
    requester: Option<UserId>,
    bias: BTreeMap<UserId, BiasSign>,
    started_at: Option<DateTime<Utc>>,
    /// Playback time accumulated before the latest resume
    offset: Duration,
    resumed_at: Option<Instant>,
}

impl Current {
    fn new(selection: Selection) -> Self {
        Self {
            song: selection.song,
            requester: selection.requester,
            bias: selection.bias,
            started_at: None,
            offset: Duration::ZERO,
            resumed_at: None,
        }
    }

    fn elapsed(&self) -> Duration {
        self.offset + self.resumed_at.map(|at| at.elapsed()).unwrap_or_default()
    }

    fn freeze(&mut self) {
        self.offset = self.elapsed();
        self.resumed_at = None;
    }
}

struct SchedulerActor {
    config: SchedulerConfig,
    sampler: Sampler,
    library: Arc<dyn Library>,
    voice: Arc<dyn VoiceGateway>,
    rng: StdRng,
    tx: WeakSender<Message>,

    queue: QueueManager,
    history: History,
    listeners: ListenerTracker,

    phase: PlaybackPhase,
    current: Option<Current>,
    enabled: bool,
    transport_ready: bool,
    transport_muted: bool,
    volume: f64,

    lead_in: TimerSlot,
    pause_expiry: TimerSlot,
    announcer: Option<DefaultDirectRateLimiter>,
}

impl SchedulerActor {
    fn new(
        config: SchedulerConfig,
        sampler: Sampler,
        library: Arc<dyn Library>,
        voice: Arc<dyn VoiceGateway>,
        rng: StdRng,
        tx: WeakSender<Message>,
    ) -> Self {
        Self {
            queue: QueueManager::new(config.queue.clone()),
            history: History::new(config.history_size),
            listeners: ListenerTracker::new(config.listeners.clone()),
            phase: PlaybackPhase::Idle,
            current: None,
            enabled: config.start_enabled,
            transport_ready: false,
            transport_muted: false,
            volume: config.base_volume,
            lead_in: TimerSlot::default(),
            pause_expiry: TimerSlot::default(),
            announcer: Quota::with_period(config.announce_interval).map(RateLimiter::direct),
            config,
            sampler,
            library,
            voice,
            rng,
            tx,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Message>) {
        tracing::info!("Scheduler started");

        for (user, presence) in self.voice.listeners().await {
            self.on_presence(user, presence).await;
        }

        while let Some(message) = rx.recv().await {
            match message {
                Message::Command(Command::Shutdown { reply }) => {
                    self.teardown().await;
                    self.listeners.cancel_all_withdrawals();
                    let _ = reply.send(());
                    break;
                }
                Message::Command(command) => self.handle_command(command).await,
                Message::Timer(event) => self.handle_timer(event).await,
            }
        }

        tracing::info!("Scheduler stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        // A dropped reply receiver only means the caller went away
        match command {
            Command::Presence {
                user,
                presence,
                reply,
            } => {
                self.on_presence(user, presence).await;
                let _ = reply.send(());
            }
            Command::Transport { event, reply } => {
                self.on_transport(event).await;
                let _ = reply.send(());
            }
            Command::StreamEnded { hash, reply } => {
                let ended = self.on_stream_ended(hash).await;
                let _ = reply.send(ended);
            }
            Command::VoteSkip { user, reply } => {
                let outcome = self.vote_skip(user).await;
                let _ = reply.send(outcome);
            }
            Command::Enqueue {
                hash,
                requester,
                demand,
                reply,
            } => {
                let accepted = self.enqueue(hash, requester, demand).await;
                let _ = reply.send(accepted);
            }
            Command::Withdraw { requester, reply } => {
                let removed = self.queue.withdraw(&requester);
                self.listeners.cancel_withdrawal(&requester);
                tracing::info!("Withdrew {} requests of {}", removed, requester);
                let _ = reply.send(removed);
            }
            Command::Queue { reply } => {
                let _ = reply.send(self.queue.entries().to_vec());
            }
            Command::History { reply } => {
                let _ = reply.send(self.history.recent().cloned().collect());
            }
            Command::NowPlaying { reply } => {
                let _ = reply.send(self.now_playing());
            }
            Command::Listeners { reply } => {
                let _ = reply.send(self.listeners.statuses());
            }
            Command::SetVolume { volume, reply } => {
                let result = self.set_volume(volume).await;
                let _ = reply.send(result);
            }
            Command::SetEnabled { enabled, reply } => {
                self.set_enabled(enabled).await;
                let _ = reply.send(());
            }
            Command::SetNeutral {
                user,
                neutral,
                reply,
            } => {
                let _ = reply.send(self.listeners.set_neutral(&user, neutral));
            }
            Command::SetAutoEnd { user, songs, reply } => {
                let _ = reply.send(self.listeners.set_auto_end(&user, songs));
            }
            Command::Trace { hash, reply } => {
                let listeners = self.listeners.scoring_listeners();
                let trace = self
                    .sampler
                    .trace(&hash, &listeners, &self.history, &self.queue, Utc::now())
                    .await;
                let _ = reply.send(trace);
            }
            Command::Stop { reply } => {
                let stopped = self.stop().await;
                let _ = reply.send(stopped);
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    async fn handle_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::LeadIn { generation } => {
                if self.lead_in.take_fired(generation) {
                    self.on_lead_in().await;
                }
            }
            TimerEvent::PauseExpired { generation } => {
                if self.pause_expiry.take_fired(generation) && self.phase == PlaybackPhase::Paused {
                    tracing::info!("Nobody came back, abandoning paused song");
                    self.teardown().await;
                }
            }
            TimerEvent::Withdrawal { user, generation } => {
                if self.listeners.fire_withdrawal(&user, generation) {
                    let removed = self.queue.withdraw(&user);
                    tracing::info!("{} did not return, dropped {} of their requests", user, removed);
                }
            }
        }
    }

    fn can_play(&self) -> bool {
        self.enabled
            && self.transport_ready
            && !self.transport_muted
            && self.listeners.active_count() > 0
    }

    /// Idle -> Pending, if anything can be played
    async fn try_start(&mut self) {
        if self.phase != PlaybackPhase::Idle || !self.can_play() {
            return;
        }

        let listeners = self.listeners.scoring_listeners();
        let selection = self
            .sampler
            .select_next(
                &listeners,
                &self.history,
                &mut self.queue,
                &mut self.rng,
                Utc::now(),
            )
            .await;
        let Some(selection) = selection else {
            tracing::warn!("Nothing to play");
            return;
        };

        tracing::info!(
            "Up next: {} - {} ({})",
            selection.song.artist,
            selection.song.title,
            selection.song.hash
        );
        self.announce(&selection).await;

        self.current = Some(Current::new(selection));
        self.phase = PlaybackPhase::Pending;
        self.lead_in.arm(self.config.lead_in, &self.tx, |generation| {
            Message::Timer(TimerEvent::LeadIn { generation })
        });
    }

    async fn announce(&self, selection: &Selection) {
        if let Some(limiter) = &self.announcer {
            if limiter.check().is_err() {
                tracing::debug!("Announcement rate limited");
                return;
            }
        }

        let mut message = format!(
            "Up next: {} by {}",
            selection.song.title, selection.song.artist
        );
        if let Some(requester) = &selection.requester {
            message.push_str(&format!(", requested by {}", requester));
        }
        if let Err(e) = self.voice.announce(&message).await {
            tracing::warn!("Failed to announce next song: {}", e);
        }
    }

    /// Pending -> Playing
    async fn on_lead_in(&mut self) {
        if self.phase != PlaybackPhase::Pending {
            return;
        }

        // Everyone left or the transport went quiet during the lead-in
        if !self.can_play() {
            tracing::info!("Nobody to play to, holding the song at its start");
            self.hold();
            return;
        }

        if let Err(e) = self.play_current(Duration::ZERO).await {
            tracing::error!("Failed to start playback: {}", e);
            self.teardown().await;
            return;
        }

        if let Some(current) = self.current.as_mut() {
            current.started_at = Some(Utc::now());
            current.resumed_at = Some(Instant::now());
            tracing::info!("Playing {}", current.song.hash);
        }
        self.phase = PlaybackPhase::Playing;
    }

    async fn play_current(&self, seek: Duration) -> Result<()> {
        let current = self
            .current
            .as_ref()
            .ok_or_else(|| AppError::Conflict("No song selected".to_string()))?;
        let hash = &current.song.hash;
        let path = self
            .library
            .content_path(hash)
            .await
            .ok_or_else(|| AppError::NotFound(format!("No audio for {}", hash)))?;

        let stats = load_stats(self.library.as_ref(), hash).await;
        let volume = normalized_volume(
            self.volume,
            current.song.loudness,
            stats.volume_tweak,
            &self.config,
        );
        self.voice.play(&current.song, &path, volume, seek).await
    }

    /// Playing -> Paused
    async fn pause(&mut self) {
        if self.phase != PlaybackPhase::Playing {
            return;
        }

        if let Some(current) = self.current.as_mut() {
            current.freeze();
            tracing::info!(
                "Pausing {} at {:.1}s",
                current.song.hash,
                current.offset.as_secs_f64()
            );
        }
        if let Err(e) = self.voice.stop().await {
            tracing::warn!("Failed to stop audio while pausing: {}", e);
        }
        self.hold();
    }

    /// Enter Paused and start the expiry clock
    fn hold(&mut self) {
        self.phase = PlaybackPhase::Paused;
        self.pause_expiry
            .arm(self.config.pause_expiry, &self.tx, |generation| {
                Message::Timer(TimerEvent::PauseExpired { generation })
            });
    }

    /// Paused -> Playing
    async fn resume(&mut self) {
        if self.phase != PlaybackPhase::Paused || !self.can_play() {
            return;
        }
        self.pause_expiry.cancel();

        let seek = self
            .current
            .as_ref()
            .map(Current::elapsed)
            .unwrap_or_default();
        if let Err(e) = self.play_current(seek).await {
            tracing::error!("Failed to resume playback: {}", e);
            self.teardown().await;
            return;
        }

        if let Some(current) = self.current.as_mut() {
            current.started_at.get_or_insert_with(Utc::now);
            current.resumed_at = Some(Instant::now());
            tracing::info!("Resuming {} at {:.1}s", current.song.hash, seek.as_secs_f64());
        }
        self.phase = PlaybackPhase::Playing;
    }

    /// Playing/Paused -> Idle, recording the song, then look for the next one
    async fn finish(&mut self, outcome: PlayOutcome) {
        if !matches!(self.phase, PlaybackPhase::Playing | PlaybackPhase::Paused) {
            return;
        }
        self.pause_expiry.cancel();
        let Some(current) = self.current.take() else {
            self.phase = PlaybackPhase::Idle;
            return;
        };

        if outcome != PlayOutcome::Completed && self.phase == PlaybackPhase::Playing {
            if let Err(e) = self.voice.stop().await {
                tracing::warn!("Failed to stop audio: {}", e);
            }
        }

        let now = Utc::now();
        let hash = &current.song.hash;
        let voters = self.listeners.clear_votes();

        let mut stats = load_stats(self.library.as_ref(), hash).await;
        stats.record_play(now);
        if outcome == PlayOutcome::Skipped {
            stats.record_skip(now, voters.iter().cloned());
        }
        if let Err(e) = store_stats(self.library.as_ref(), hash, &stats).await {
            tracing::warn!("Failed to store stats of {}: {}", hash, e);
        }

        self.history.push(HistoryEntry {
            id: Uuid::new_v4(),
            song: SongInfo::from(&current.song),
            requester: current.requester.clone(),
            started_at: current.started_at,
            ended_at: now,
            outcome,
            listener_bias: current.bias.clone(),
        });
        tracing::info!("Finished {} ({:?})", hash, outcome);

        for voter in &voters {
            if let Err(e) = self.voice.set_member_muted(voter, false).await {
                tracing::warn!("Failed to unsilence {}: {}", voter, e);
            }
        }
        for user in self.listeners.complete_song() {
            tracing::info!("Auto-end reached for {}, disconnecting", user);
            if let Err(e) = self.voice.disconnect_member(&user).await {
                tracing::warn!("Failed to disconnect {}: {}", user, e);
            }
        }

        self.phase = PlaybackPhase::Idle;
        self.try_start().await;
    }

    /// Any phase -> Idle without recording anything
    async fn teardown(&mut self) {
        self.lead_in.cancel();
        self.pause_expiry.cancel();
        if self.phase == PlaybackPhase::Playing {
            if let Err(e) = self.voice.stop().await {
                tracing::warn!("Failed to stop audio: {}", e);
            }
        }
        if let Some(current) = self.current.take() {
            tracing::info!("Dropped {} ({:?})", current.song.hash, self.phase);
        }
        self.phase = PlaybackPhase::Idle;

        for voter in self.listeners.clear_votes() {
            if let Err(e) = self.voice.set_member_muted(&voter, false).await {
                tracing::warn!("Failed to unsilence {}: {}", voter, e);
            }
        }
    }

    async fn on_presence(&mut self, user: UserId, presence: Presence) {
        let withdrawal_user = user.clone();
        let change = self.listeners.update_presence(
            &user,
            presence,
            Utc::now(),
            &self.tx,
            move |generation| {
                Message::Timer(TimerEvent::Withdrawal {
                    user: withdrawal_user,
                    generation,
                })
            },
        );

        match change {
            PresenceChange::Arrived => {
                if self.phase == PlaybackPhase::Paused {
                    self.resume().await;
                } else {
                    self.try_start().await;
                }
            }
            PresenceChange::Departed { had_vote } => {
                if had_vote {
                    if let Err(e) = self.voice.set_member_muted(&user, false).await {
                        tracing::warn!("Failed to unsilence {}: {}", user, e);
                    }
                }
                if self.listeners.active_count() == 0 {
                    self.pause().await;
                } else {
                    self.check_skip_threshold().await;
                }
            }
            PresenceChange::Unchanged => {}
        }
    }

    async fn on_transport(&mut self, event: TransportEvent) {
        tracing::info!("Voice transport: {:?}", event);
        match event {
            TransportEvent::Ready => {
                self.transport_ready = true;
                self.try_start().await;
            }
            TransportEvent::Muted => {
                self.transport_muted = true;
                self.pause().await;
            }
            TransportEvent::Unmuted => {
                self.transport_muted = false;
                if self.phase == PlaybackPhase::Paused {
                    self.resume().await;
                } else {
                    self.try_start().await;
                }
            }
            TransportEvent::Disconnected => {
                self.transport_ready = false;
                self.teardown().await;
            }
        }
    }

    async fn on_stream_ended(&mut self, hash: Option<SongHash>) -> bool {
        let current = match &self.current {
            Some(current) if self.phase == PlaybackPhase::Playing => current,
            _ => return false,
        };
        if hash.is_some_and(|hash| hash != current.song.hash) {
            tracing::debug!("Ignoring end of a stream that is no longer current");
            return false;
        }
        self.finish(PlayOutcome::Completed).await;
        true
    }

    async fn vote_skip(&mut self, user: UserId) -> Result<SkipOutcome> {
        if self.phase != PlaybackPhase::Playing {
            return Err(AppError::Conflict("Nothing is playing".to_string()));
        }
        let votes = self
            .listeners
            .cast_vote(&user)
            .ok_or_else(|| AppError::Validation(format!("{} is not listening", user)))?;
        let required = self.listeners.required_votes();
        tracing::info!("{} voted to skip ({}/{})", user, votes, required);

        if let Err(e) = self.voice.set_member_muted(&user, true).await {
            tracing::warn!("Failed to silence {}: {}", user, e);
        }
        let skipped = self.check_skip_threshold().await;

        Ok(SkipOutcome {
            votes,
            required,
            skipped,
        })
    }

    async fn check_skip_threshold(&mut self) -> bool {
        let votes = self.listeners.counted_votes();
        if self.phase == PlaybackPhase::Playing
            && votes > 0
            && votes >= self.listeners.required_votes()
        {
            self.finish(PlayOutcome::Skipped).await;
            true
        } else {
            false
        }
    }

    async fn enqueue(&mut self, hash: SongHash, requester: UserId, demand: bool) -> Result<bool> {
        if self.library.song(&hash).await.is_none() {
            return Err(AppError::NotFound(format!("Song {} is not in the library", hash)));
        }
        let accepted = self
            .queue
            .enqueue(hash.clone(), requester.clone(), demand, Utc::now());
        if accepted {
            tracing::info!("{} requested {}", requester, hash);
        }
        Ok(accepted)
    }

    async fn set_volume(&mut self, volume: f64) -> Result<f64> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(AppError::Validation(
                "Volume must lie between 0 and 1".to_string(),
            ));
        }
        self.volume = volume;

        if let (PlaybackPhase::Playing, Some(current)) = (self.phase, &self.current) {
            let stats = load_stats(self.library.as_ref(), &current.song.hash).await;
            let normalized =
                normalized_volume(volume, current.song.loudness, stats.volume_tweak, &self.config);
            self.voice.set_volume(normalized).await?;
        }
        Ok(volume)
    }

    async fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        tracing::info!("Radio {}", if enabled { "enabled" } else { "disabled" });

        if enabled {
            self.try_start().await;
        } else {
            self.teardown().await;
            self.listeners.cancel_all_withdrawals();
        }
    }

    async fn stop(&mut self) -> bool {
        match self.phase {
            PlaybackPhase::Playing | PlaybackPhase::Paused => {
                self.finish(PlayOutcome::Stopped).await;
                true
            }
            PlaybackPhase::Pending => {
                self.teardown().await;
                true
            }
            PlaybackPhase::Idle => false,
        }
    }

    fn now_playing(&self) -> NowPlaying {
        let current = self.current.as_ref();
        NowPlaying {
            phase: self.phase,
            enabled: self.enabled,
            song: current.map(|c| SongInfo::from(&c.song)),
            requester: current.and_then(|c| c.requester.clone()),
            started_at: current.and_then(|c| c.started_at),
            elapsed_secs: current.map(|c| c.elapsed().as_secs_f64()).unwrap_or(0.0),
            listeners: self.listeners.active_count(),
            skip_votes: self.listeners.counted_votes(),
            skip_required: self.listeners.required_votes(),
            volume: self.volume,
        }
    }
}

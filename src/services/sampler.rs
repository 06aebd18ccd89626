//! Selection sampler
//!
//! Scores the whole catalog and draws one song with probability proportional
//! to its score. Scores are turned into integer units before the draw so the
//! cumulative table is exact.

use crate::error::{AppError, Result};
use crate::models::{BiasSign, Song, SongHash, UserId};
use crate::services::history::History;
use crate::services::library::{load_stats, Library};
use crate::services::preferences::PreferenceStore;
use crate::services::priority::{
    is_novelty, Candidate, PriorityEngine, PriorityTrace, ScoringContext, SelectionFlags,
};
use crate::services::queue::QueueManager;
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Units per score point in the cumulative draw
const UNITS_PER_POINT: i64 = 1_000_000_000;

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Chance of drawing from the queue when it is not empty
    pub queue_probability: f64,
    /// Chance of restricting the draw to novelties when there are any
    pub novelty_probability: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            queue_probability: 0.75,
            novelty_probability: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub song: Song,
    /// Set when the song came off the queue
    pub requester: Option<UserId>,
    /// Curator bias of each scoring listener towards the song
    pub bias: BTreeMap<UserId, BiasSign>,
    pub score: Decimal,
}

pub struct Sampler {
    engine: PriorityEngine,
    library: Arc<dyn Library>,
    preferences: Arc<PreferenceStore>,
    config: SamplerConfig,
}

impl Sampler {
    pub fn new(
        engine: PriorityEngine,
        library: Arc<dyn Library>,
        preferences: Arc<PreferenceStore>,
        config: SamplerConfig,
    ) -> Self {
        Self {
            engine,
            library,
            preferences,
            config,
        }
    }

    /// Pick the next song for `listeners`. A song drawn from the queue is
    /// taken off it and its requester returned.
    pub async fn select_next<R: Rng>(
        &self,
        listeners: &[UserId],
        history: &History,
        queue: &mut QueueManager,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Option<Selection> {
        let candidates = self.candidates().await;
        if candidates.is_empty() {
            tracing::debug!("Library is empty, nothing to select");
            return None;
        }

        let ctx = self
            .context(listeners, history, queue, &candidates, now)
            .await;

        let novelties = candidates
            .iter()
            .any(|c| is_novelty(&c.song, &c.stats, now, self.engine.config()));
        let flags = SelectionFlags {
            use_queue: !queue.is_empty() && rng.gen::<f64>() < self.config.queue_probability,
            use_novelty: novelties && rng.gen::<f64>() < self.config.novelty_probability,
        };

        let mut scores = self.score_all(&candidates, &ctx, flags).await;
        let mut index = weighted_index(&scores, rng);
        if index.is_none() && flags != SelectionFlags::default() {
            // Queued songs may have vanished from the library
            tracing::debug!("Flagged draw {:?} came up empty, drawing from the catalog", flags);
            scores = self
                .score_all(&candidates, &ctx, SelectionFlags::default())
                .await;
            index = weighted_index(&scores, rng);
        }

        let Some(index) = index else {
            tracing::debug!("Every song scored zero, nothing to select");
            return None;
        };

        let chosen = &candidates[index];
        let requester = queue
            .take(&chosen.song.hash, now)
            .map(|entry| entry.requester);
        let bias = self
            .engine
            .listener_terms(chosen, &ctx)
            .await
            .into_iter()
            .map(|(user, term)| (user, BiasSign::of(term)))
            .collect();

        tracing::debug!(
            "Selected {} (score {}, queue {}, novelty {})",
            chosen.song.hash,
            scores[index],
            flags.use_queue,
            flags.use_novelty
        );

        Some(Selection {
            song: chosen.song.clone(),
            requester,
            bias,
            score: scores[index],
        })
    }

    /// Score breakdown of a single song as a regular draw would compute it
    pub async fn trace(
        &self,
        hash: &SongHash,
        listeners: &[UserId],
        history: &History,
        queue: &QueueManager,
        now: DateTime<Utc>,
    ) -> Result<PriorityTrace> {
        let candidates = self.candidates().await;
        let candidate = candidates
            .iter()
            .find(|c| &c.song.hash == hash)
            .ok_or_else(|| AppError::NotFound(format!("Song {} is not in the library", hash)))?;

        let ctx = self
            .context(listeners, history, queue, &candidates, now)
            .await;
        let mut trace = PriorityTrace::new(hash.clone());
        self.engine
            .compute(candidate, &ctx, SelectionFlags::default(), Some(&mut trace))
            .await;
        Ok(trace)
    }

    async fn candidates(&self) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for song in self.library.catalog().await {
            let stats = load_stats(self.library.as_ref(), &song.hash).await;
            candidates.push(Candidate { song, stats });
        }
        candidates
    }

    async fn context(
        &self,
        listeners: &[UserId],
        history: &History,
        queue: &QueueManager,
        candidates: &[Candidate],
        now: DateTime<Utc>,
    ) -> ScoringContext {
        let window = self.engine.config().slide_window;
        let mut ctx = ScoringContext::new(now).with_catalog(candidates);
        ctx.listeners = self.preferences.profiles_for(listeners).await;
        ctx.recent_bias = listeners
            .iter()
            .map(|user| (user.clone(), history.bias_of(user, window)))
            .collect();
        ctx.queue_positions = queue.positions();
        ctx.max_queue_size = queue.max_size();
        ctx
    }

    async fn score_all(
        &self,
        candidates: &[Candidate],
        ctx: &ScoringContext,
        flags: SelectionFlags,
    ) -> Vec<Decimal> {
        let mut scores = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            scores.push(self.engine.compute(candidate, ctx, flags, None).await);
        }
        scores
    }
}

/// Draw an index with probability proportional to its score. Returns `None`
/// when nothing has a positive score.
pub fn weighted_index<R: Rng>(scores: &[Decimal], rng: &mut R) -> Option<usize> {
    // Per-score cap keeps the running total inside u128
    let cap = u128::MAX / scores.len().max(1) as u128;
    let mut cumulative: Vec<(usize, u128)> = Vec::with_capacity(scores.len());
    let mut total: u128 = 0;

    for (index, score) in scores.iter().enumerate() {
        if *score <= Decimal::ZERO {
            continue;
        }
        let units = to_units(*score).min(cap);
        if units == 0 {
            continue;
        }
        total += units;
        cumulative.push((index, total));
    }

    if total == 0 {
        return None;
    }

    let draw = rng.gen_range(0..total);
    cumulative
        .iter()
        .find(|(_, bound)| *bound > draw)
        .map(|(index, _)| *index)
}

/// Whole and fractional parts are scaled separately so no score overflows
fn to_units(score: Decimal) -> u128 {
    let whole = score.trunc();
    let fraction = ((score - whole) * Decimal::from(UNITS_PER_POINT)).trunc();
    whole
        .to_u128()
        .unwrap_or(0)
        .saturating_mul(UNITS_PER_POINT as u128)
        .saturating_add(fraction.to_u128().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SongStats;
    use crate::services::library::{store_stats, CatalogLibrary};
    use crate::services::preferences::{MemoryPreferenceRepository, PreferenceLimits};
    use crate::services::priority::PriorityConfig;
    use crate::services::queue::QueueConfig;
    use chrono::Duration;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn song(hash: &str, length: u32) -> Song {
        Song {
            hash: hash.into(),
            title: hash.to_uppercase(),
            artist: "Artist".to_string(),
            length,
            loudness: None,
            keywords: Default::default(),
            added_at: Utc::now() - Duration::days(365),
        }
    }

    async fn sampler(library: Arc<CatalogLibrary>, config: SamplerConfig) -> Sampler {
        let preferences = Arc::new(PreferenceStore::new(
            Arc::new(MemoryPreferenceRepository::default()),
            PreferenceLimits::default(),
        ));
        Sampler::new(
            PriorityEngine::new(PriorityConfig::default(), None),
            library,
            preferences,
            config,
        )
    }

    #[test]
    fn draws_proportionally_to_score() {
        let mut rng = StdRng::seed_from_u64(7);
        let scores = [Decimal::from(3), Decimal::ONE];
        let draws = 10_000;
        let first = (0..draws)
            .filter(|_| weighted_index(&scores, &mut rng) == Some(0))
            .count();

        let share = first as f64 / draws as f64;
        assert!((0.72..=0.78).contains(&share), "share was {}", share);
    }

    #[test]
    fn huge_scores_keep_their_proportions() {
        let mut rng = StdRng::seed_from_u64(7);
        let scores = [Decimal::MAX, Decimal::MAX / Decimal::from(3)];
        assert_eq!(to_units(Decimal::new(15, 1)), 1_500_000_000);

        let draws = 10_000;
        let first = (0..draws)
            .filter(|_| weighted_index(&scores, &mut rng) == Some(0))
            .count();
        let share = first as f64 / draws as f64;
        assert!((0.72..=0.78).contains(&share), "share was {}", share);
    }

    #[test]
    fn nothing_to_draw_from_zero_scores() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(weighted_index(&[], &mut rng), None);
        assert_eq!(
            weighted_index(&[Decimal::ZERO, Decimal::ZERO], &mut rng),
            None
        );
        assert_eq!(
            weighted_index(&[Decimal::ZERO, Decimal::new(1, 3)], &mut rng),
            Some(1)
        );
    }

    #[tokio::test]
    async fn short_unplayed_song_beats_long_overplayed_one() {
        let library = Arc::new(CatalogLibrary::new("/music"));
        library.insert(song("a", 200), "a.ogg").await;
        library.insert(song("b", 1000), "b.ogg").await;

        let mut played = SongStats::default();
        played.plays = 50;
        played.last_played = Some(Utc::now() - Duration::days(1));
        store_stats(library.as_ref(), &"b".into(), &played)
            .await
            .unwrap();

        let sampler = sampler(library, SamplerConfig::default()).await;
        let history = History::default();
        let mut queue = QueueManager::new(QueueConfig::default());
        let mut rng = StdRng::seed_from_u64(42);
        let listeners = vec![UserId::from("alice")];

        let (mut a, mut b) = (0, 0);
        for _ in 0..1000 {
            let selection = sampler
                .select_next(&listeners, &history, &mut queue, &mut rng, Utc::now())
                .await
                .unwrap();
            match selection.song.hash.0.as_str() {
                "a" => a += 1,
                _ => b += 1,
            }
        }

        assert!(a > b, "a {} b {}", a, b);
        assert!(b > 0);
    }

    #[tokio::test]
    async fn queued_song_is_taken_with_its_requester() {
        let library = Arc::new(CatalogLibrary::new("/music"));
        library.insert(song("a", 200), "a.ogg").await;
        library.insert(song("b", 200), "b.ogg").await;

        let config = SamplerConfig {
            queue_probability: 1.0,
            novelty_probability: 0.0,
        };
        let sampler = sampler(library, config).await;
        let history = History::default();
        let mut queue = QueueManager::new(QueueConfig::default());
        let now = Utc::now();
        assert!(queue.enqueue("b".into(), "alice".into(), false, now));

        let mut rng = StdRng::seed_from_u64(3);
        let selection = sampler
            .select_next(&["alice".into()], &history, &mut queue, &mut rng, now)
            .await
            .unwrap();

        assert_eq!(selection.song.hash, SongHash::from("b"));
        assert_eq!(selection.requester, Some(UserId::from("alice")));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn empty_library_selects_nothing() {
        let library = Arc::new(CatalogLibrary::new("/music"));
        let sampler = sampler(library, SamplerConfig::default()).await;
        let mut queue = QueueManager::new(QueueConfig::default());
        let mut rng = StdRng::seed_from_u64(0);

        let selection = sampler
            .select_next(&[], &History::default(), &mut queue, &mut rng, Utc::now())
            .await;
        assert!(selection.is_none());

        let trace = sampler
            .trace(&"ghost".into(), &[], &History::default(), &queue, Utc::now())
            .await;
        assert!(matches!(trace, Err(AppError::NotFound(_))));
    }
}

//! Priority engine
//!
//! Scores a single song against the current listener set. The score is a
//! non-negative decimal; the sampler draws songs proportionally to it. Every
//! step of the computation is a separate function so it can be checked on its
//! own, and [`PriorityEngine::compute`] records the running value after each
//! step when asked for a trace.

use crate::models::{BiasSign, PreferenceProfile, Song, SongHash, SongStats, UserId};
use crate::services::ranking::Ranking;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, MathematicalOps};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct PriorityConfig {
    pub base: Decimal,
    pub popularity_weight: Decimal,
    pub curator_weight: Decimal,
    /// Applied to a curator opinion when none of the listener's rated
    /// keywords of the same sign match the song
    pub keyword_attenuation: Decimal,
    pub skip_window: Duration,
    pub skip_decay_power: i64,
    pub slide_step: Decimal,
    /// Number of history entries considered for the slide
    pub slide_window: usize,
    pub slide_exponent: Decimal,
    pub length_bonus: Decimal,
    /// Seconds
    pub min_length: u32,
    /// Seconds
    pub ideal_max_length: u32,
    /// Seconds past `ideal_max_length` at which the length bonus reaches zero
    pub max_excess_length: u32,
    pub low_play_factor: Decimal,
    pub low_play_ceiling: Decimal,
    pub rarity_slice: Decimal,
    pub recency_window: Duration,
    pub dislike_threshold: Decimal,
    pub dislike_penalty: Decimal,
    pub hate_threshold: Decimal,
    pub hate_penalty: Decimal,
    pub novelty_window: Duration,
    pub novelty_play_breaker: u32,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            base: Decimal::TEN,
            popularity_weight: Decimal::from(5),
            curator_weight: Decimal::from(40),
            keyword_attenuation: Decimal::new(5, 1),
            skip_window: Duration::days(7),
            skip_decay_power: 2,
            slide_step: Decimal::new(1, 1),
            slide_window: 10,
            slide_exponent: Decimal::ONE,
            length_bonus: Decimal::from(20),
            min_length: 90,
            ideal_max_length: 420,
            max_excess_length: 600,
            low_play_factor: Decimal::from(30),
            low_play_ceiling: Decimal::from(15),
            rarity_slice: Decimal::new(5, 1),
            recency_window: Duration::hours(6),
            dislike_threshold: Decimal::new(-3, 1),
            dislike_penalty: Decimal::new(25, 2),
            hate_threshold: Decimal::new(-7, 1),
            hate_penalty: Decimal::new(2, 2),
            novelty_window: Duration::days(7),
            novelty_play_breaker: 3,
        }
    }
}

/// A catalog song together with the scheduler's statistics for it
#[derive(Debug, Clone)]
pub struct Candidate {
    pub song: Song,
    pub stats: SongStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionFlags {
    pub use_queue: bool,
    pub use_novelty: bool,
}

/// Everything about the current situation a score depends on, gathered once
/// per selection
#[derive(Debug, Clone)]
pub struct ScoringContext {
    /// Scoring listeners; neutral-mode users are left out
    pub listeners: Vec<(UserId, PreferenceProfile)>,
    /// Bias signs from recent history per listener, newest first
    pub recent_bias: HashMap<UserId, Vec<BiasSign>>,
    pub queue_positions: HashMap<SongHash, usize>,
    pub max_queue_size: usize,
    /// Number of catalog songs with strictly more plays
    pub plays_rank: HashMap<SongHash, usize>,
    pub catalog_size: usize,
    pub now: DateTime<Utc>,
}

impl ScoringContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            listeners: Vec::new(),
            recent_bias: HashMap::new(),
            queue_positions: HashMap::new(),
            max_queue_size: 0,
            plays_rank: HashMap::new(),
            catalog_size: 0,
            now,
        }
    }

    /// Fill in the plays ranks and catalog size
    pub fn with_catalog(mut self, candidates: &[Candidate]) -> Self {
        self.plays_rank = plays_ranks(candidates);
        self.catalog_size = candidates.len();
        self
    }
}

/// For every song, how many songs were played strictly more often
pub fn plays_ranks(candidates: &[Candidate]) -> HashMap<SongHash, usize> {
    let mut plays: Vec<u32> = candidates.iter().map(|c| c.stats.plays).collect();
    plays.sort_unstable_by(|a, b| b.cmp(a));

    candidates
        .iter()
        .map(|c| {
            let rank = plays.partition_point(|&p| p > c.stats.plays);
            (c.song.hash.clone(), rank)
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceStep {
    pub step: &'static str,
    pub value: Decimal,
}

/// Running score after each step of a single computation
#[derive(Debug, Clone, Serialize)]
pub struct PriorityTrace {
    pub hash: SongHash,
    pub steps: Vec<TraceStep>,
}

impl PriorityTrace {
    pub fn new(hash: SongHash) -> Self {
        Self {
            hash,
            steps: Vec::new(),
        }
    }

    pub fn record(&mut self, step: &'static str, value: Decimal) {
        self.steps.push(TraceStep { step, value });
    }

    pub fn score(&self) -> Decimal {
        self.steps.last().map(|s| s.value).unwrap_or_default()
    }
}

pub struct PriorityEngine {
    config: PriorityConfig,
    ranking: Option<Arc<dyn Ranking>>,
}

impl PriorityEngine {
    pub fn new(config: PriorityConfig, ranking: Option<Arc<dyn Ranking>>) -> Self {
        Self { config, ranking }
    }

    pub fn config(&self) -> &PriorityConfig {
        &self.config
    }

    pub async fn compute(
        &self,
        candidate: &Candidate,
        ctx: &ScoringContext,
        flags: SelectionFlags,
        mut trace: Option<&mut PriorityTrace>,
    ) -> Decimal {
        let cfg = &self.config;
        let song = &candidate.song;
        let stats = &candidate.stats;

        let mut record = |step: &'static str, value: Decimal| {
            if let Some(trace) = trace.as_deref_mut() {
                trace.record(step, value);
            }
        };

        let mut total = cfg.base;
        record("base", total);

        if let Some(ranking) = &self.ranking {
            if let Some(rank) = ranking.global_rank(&song.hash).await {
                total += cfg.popularity_weight * rank;
            }
        }
        record("popularity", total);

        let terms = self.listener_terms(candidate, ctx).await;
        let curator = mean(terms.iter().map(|(_, term)| *term)) * cfg.curator_weight;
        record("curator", total + curator);

        let sign = BiasSign::of(curator);
        let slide = mean(ctx.listeners.iter().map(|(user, _)| {
            let same = ctx
                .recent_bias
                .get(user)
                .map(|signs| signs.iter().filter(|s| **s == sign).count())
                .unwrap_or(0);
            listener_slide(same, cfg.slide_step, cfg.slide_window)
        }));
        // Without listeners there is nothing to slide
        let slide = if ctx.listeners.is_empty() {
            Decimal::ONE
        } else {
            slide
        };
        total += curator * slide_factor(slide, cfg.slide_exponent);
        record("slide", total);

        total += length_term(song.length, cfg);
        record("length", total);

        total += low_play_term(stats.plays, cfg);
        record("low_plays", total);

        total = total.max(Decimal::ZERO);
        record("clamp", total);

        let rank = ctx.plays_rank.get(&song.hash).copied().unwrap_or(0);
        let exponent = rarity_exponent(rank, ctx.catalog_size, cfg.rarity_slice);
        total = apply_rarity(total, exponent);
        record("rarity", total);

        total *= recency(stats.last_played, ctx.now, cfg.recency_window);
        record("recency", total);

        total *= self.opinion_penalty(&song.hash, ctx).await;
        record("opinion", total);

        if flags.use_queue {
            total = queue_override(ctx.queue_positions.get(&song.hash).copied(), ctx.max_queue_size);
            record("queue", total);
        }

        if flags.use_novelty && !is_novelty(song, stats, ctx.now, cfg) {
            total = Decimal::ZERO;
            record("novelty", total);
        }

        tracing::trace!("Priority of {}: {}", song.hash, total);
        total
    }

    /// Curator opinion of each scoring listener about the song, after keyword
    /// attenuation and skip decay. The sign of each term is what history
    /// records as that listener's bias.
    pub async fn listener_terms(
        &self,
        candidate: &Candidate,
        ctx: &ScoringContext,
    ) -> Vec<(UserId, Decimal)> {
        let mut terms = Vec::with_capacity(ctx.listeners.len());
        for (user, profile) in &ctx.listeners {
            let mut term = self.curator_opinion(profile, &candidate.song.hash).await;
            term *= keyword_attenuation(term, profile, &candidate.song, self.config.keyword_attenuation);
            if term > Decimal::ZERO {
                term *= skip_decay(
                    candidate.stats.last_skip_by(user),
                    ctx.now,
                    self.config.skip_window,
                    self.config.skip_decay_power,
                );
            }
            terms.push((user.clone(), term));
        }
        terms
    }

    /// Mean signed likeability over the curators the ranking has an opinion
    /// from
    async fn curator_opinion(&self, profile: &PreferenceProfile, song: &SongHash) -> Decimal {
        let Some(ranking) = &self.ranking else {
            return Decimal::ZERO;
        };

        let mut opinions = Vec::new();
        for (curator, polarity) in &profile.curators {
            if let Some(value) = ranking.likeability(curator, song).await {
                opinions.push(polarity.apply(value));
            }
        }
        mean(opinions.into_iter())
    }

    async fn opinion_penalty(&self, song: &SongHash, ctx: &ScoringContext) -> Decimal {
        let Some(ranking) = &self.ranking else {
            return Decimal::ONE;
        };
        if ctx.listeners.is_empty() {
            return Decimal::ONE;
        }

        let mut opinions = Vec::with_capacity(ctx.listeners.len());
        for (user, _) in &ctx.listeners {
            match ranking.likeability(user, song).await {
                Some(value) => opinions.push(value),
                None => return Decimal::ONE,
            }
        }
        opinion_penalty(&opinions, &self.config)
    }
}

fn mean(values: impl Iterator<Item = Decimal>) -> Decimal {
    let (sum, count) = values.fold((Decimal::ZERO, 0u32), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        Decimal::ZERO
    } else {
        sum / Decimal::from(count)
    }
}

fn ratio(elapsed: Duration, window: Duration) -> Decimal {
    if window <= Duration::zero() {
        return Decimal::ONE;
    }
    let elapsed = Decimal::from(elapsed.num_milliseconds().max(0));
    let window = Decimal::from(window.num_milliseconds());
    (elapsed / window).min(Decimal::ONE)
}

/// Multiplier for a curator term whose sign is not backed by any of the
/// listener's keywords of that sign present on the song
pub fn keyword_attenuation(
    term: Decimal,
    profile: &PreferenceProfile,
    song: &Song,
    attenuation: Decimal,
) -> Decimal {
    let unbacked = |keywords: Vec<&String>| {
        !keywords.is_empty() && !keywords.iter().any(|k| song.keywords.contains(*k))
    };

    if term > Decimal::ZERO && unbacked(profile.liked_keywords().collect()) {
        attenuation
    } else if term < Decimal::ZERO && unbacked(profile.disliked_keywords().collect()) {
        attenuation
    } else {
        Decimal::ONE
    }
}

/// 0 right after the listener voted the song off, rising to 1 over `window`
pub fn skip_decay(
    last_skip: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: Duration,
    power: i64,
) -> Decimal {
    match last_skip {
        Some(at) => ratio(now - at, window).powi(power),
        None => Decimal::ONE,
    }
}

/// Slide of one listener: `1 + step * n`, with `n` bounded by the window
pub fn listener_slide(same_sign: usize, step: Decimal, window: usize) -> Decimal {
    Decimal::ONE + step * Decimal::from(same_sign.min(window))
}

pub fn slide_factor(slide: Decimal, exponent: Decimal) -> Decimal {
    if slide <= Decimal::ONE {
        return Decimal::ONE;
    }
    match slide.checked_powd(exponent) {
        Some(scaled) if scaled > Decimal::ZERO => Decimal::ONE / scaled,
        _ => Decimal::ONE,
    }
}

pub fn length_term(length: u32, cfg: &PriorityConfig) -> Decimal {
    if length < cfg.min_length {
        return cfg.length_bonus * Decimal::from(length) / Decimal::from(cfg.min_length);
    }
    if length <= cfg.ideal_max_length {
        return cfg.length_bonus;
    }

    let excess = length - cfg.ideal_max_length;
    if excess >= cfg.max_excess_length {
        Decimal::ZERO
    } else {
        let remaining = Decimal::from(cfg.max_excess_length - excess);
        cfg.length_bonus * remaining / Decimal::from(cfg.max_excess_length)
    }
}

pub fn low_play_term(plays: u32, cfg: &PriorityConfig) -> Decimal {
    if plays == 0 {
        cfg.low_play_ceiling
    } else {
        cfg.low_play_ceiling
            .min(cfg.low_play_factor / Decimal::from(plays))
    }
}

/// `ln(rank + 1) / ln(1 + catalog_size * slice)`, or 1 when the denominator
/// would not be positive
pub fn rarity_exponent(plays_rank: usize, catalog_size: usize, slice: Decimal) -> Decimal {
    let spread = Decimal::ONE + Decimal::from(catalog_size) * slice;
    if spread <= Decimal::ONE {
        return Decimal::ONE;
    }
    if plays_rank == 0 {
        return Decimal::ZERO;
    }
    let numerator = Decimal::from(plays_rank + 1).ln();
    numerator / spread.ln()
}

pub fn apply_rarity(total: Decimal, exponent: Decimal) -> Decimal {
    if total <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    if exponent.is_zero() {
        return Decimal::ONE;
    }
    total.checked_powd(exponent).unwrap_or_else(|| {
        tracing::warn!("Rarity exponent {} overflowed on {}, leaving score as is", exponent, total);
        total
    })
}

pub fn recency(last_played: Option<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) -> Decimal {
    match last_played {
        Some(at) => ratio(now - at, window),
        None => Decimal::ONE,
    }
}

/// Penalty when every listener dislikes (or hates) the song
pub fn opinion_penalty(opinions: &[Decimal], cfg: &PriorityConfig) -> Decimal {
    if opinions.is_empty() {
        Decimal::ONE
    } else if opinions.iter().all(|o| *o <= cfg.hate_threshold) {
        cfg.hate_penalty
    } else if opinions.iter().all(|o| *o <= cfg.dislike_threshold) {
        cfg.dislike_penalty
    } else {
        Decimal::ONE
    }
}

/// Score of a song when drawing from the queue: earlier entries weigh more,
/// songs not in the queue not at all
pub fn queue_override(position: Option<usize>, max_queue_size: usize) -> Decimal {
    match position {
        Some(position) if position < max_queue_size => {
            Decimal::from(max_queue_size - position) / Decimal::from(max_queue_size)
        }
        _ => Decimal::ZERO,
    }
}

pub fn is_novelty(song: &Song, stats: &SongStats, now: DateTime<Utc>, cfg: &PriorityConfig) -> bool {
    now - song.added_at < cfg.novelty_window && stats.plays < cfg.novelty_play_breaker
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CuratorPolarity;
    use crate::services::ranking::StaticRanking;
    use rust_decimal::prelude::ToPrimitive;

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

    fn candidate(hash: &str, length: u32, plays: u32, last_played: Option<DateTime<Utc>>) -> Candidate {
        Candidate {
            song: song(hash, length),
            stats: SongStats {
                plays,
                last_played,
                ..Default::default()
            },
        }
    }

    fn close(actual: Decimal, expected: f64) -> bool {
        let actual = actual.to_f64().unwrap();
        (actual - expected).abs() <= expected.abs() * 1e-4 + 1e-6
    }

    #[tokio::test]
    async fn listenerless_score_matches_hand_computation() {
        let config = PriorityConfig {
            base: Decimal::TEN,
            length_bonus: Decimal::from(20),
            min_length: 120,
            ideal_max_length: 300,
            max_excess_length: 300,
            low_play_ceiling: Decimal::from(15),
            low_play_factor: Decimal::from(30),
            recency_window: Duration::seconds(3600),
            rarity_slice: Decimal::new(5, 1),
            ..Default::default()
        };
        let engine = PriorityEngine::new(config, None);

        let now = Utc::now();
        let catalog = vec![
            candidate("s1", 200, 0, None),
            candidate("s2", 60, 4, Some(now - Duration::seconds(1800))),
            candidate("s3", 450, 10, Some(now - Duration::seconds(7200))),
        ];
        let ctx = ScoringContext::new(now).with_catalog(&catalog);

        let denominator = 2.5f64.ln();
        let expected = [
            (10.0f64 + 20.0 + 15.0).powf(3f64.ln() / denominator),
            (10.0f64 + 10.0 + 7.5).powf(2f64.ln() / denominator) * 0.5,
            1.0,
        ];

        for (candidate, expected) in catalog.iter().zip(expected) {
            let score = engine
                .compute(candidate, &ctx, SelectionFlags::default(), None)
                .await;
            assert!(
                close(score, expected),
                "{}: {} vs {}",
                candidate.song.hash,
                score,
                expected
            );
        }
    }

    #[test]
    fn plays_rank_counts_strictly_more_played_songs() {
        let catalog = vec![
            candidate("a", 100, 5, None),
            candidate("b", 100, 5, None),
            candidate("c", 100, 1, None),
            candidate("d", 100, 9, None),
        ];
        let ranks = plays_ranks(&catalog);
        assert_eq!(ranks[&SongHash::from("d")], 0);
        assert_eq!(ranks[&SongHash::from("a")], 1);
        assert_eq!(ranks[&SongHash::from("b")], 1);
        assert_eq!(ranks[&SongHash::from("c")], 3);
    }

    #[test]
    fn length_term_tapers_on_both_sides() {
        let cfg = PriorityConfig {
            length_bonus: Decimal::from(20),
            min_length: 100,
            ideal_max_length: 300,
            max_excess_length: 200,
            ..Default::default()
        };
        assert_eq!(length_term(50, &cfg), Decimal::TEN);
        assert_eq!(length_term(100, &cfg), Decimal::from(20));
        assert_eq!(length_term(300, &cfg), Decimal::from(20));
        assert_eq!(length_term(400, &cfg), Decimal::TEN);
        assert_eq!(length_term(500, &cfg), Decimal::ZERO);
        assert_eq!(length_term(5000, &cfg), Decimal::ZERO);
    }

    #[test]
    fn low_play_term_is_capped() {
        let cfg = PriorityConfig::default();
        assert_eq!(low_play_term(0, &cfg), Decimal::from(15));
        assert_eq!(low_play_term(1, &cfg), Decimal::from(15));
        assert_eq!(low_play_term(3, &cfg), Decimal::TEN);
    }

    #[test]
    fn rarity_keeps_zero_and_degenerate_catalogs() {
        assert_eq!(apply_rarity(Decimal::ZERO, Decimal::from(2)), Decimal::ZERO);
        assert_eq!(apply_rarity(Decimal::from(42), Decimal::ZERO), Decimal::ONE);
        assert_eq!(rarity_exponent(0, 0, Decimal::new(5, 1)), Decimal::ONE);
        assert_eq!(rarity_exponent(3, 10, Decimal::ZERO), Decimal::ONE);
        assert!(rarity_exponent(0, 10, Decimal::new(5, 1)).is_zero());
    }

    #[test]
    fn skip_decay_recovers_over_the_window() {
        let now = Utc::now();
        let window = Duration::days(4);
        assert_eq!(skip_decay(None, now, window, 2), Decimal::ONE);
        assert_eq!(skip_decay(Some(now), now, window, 2), Decimal::ZERO);
        assert_eq!(
            skip_decay(Some(now - Duration::days(2)), now, window, 2),
            Decimal::new(25, 2)
        );
        assert_eq!(skip_decay(Some(now - Duration::days(9)), now, window, 2), Decimal::ONE);
    }

    #[test]
    fn slide_factor_is_one_at_rest_and_never_increases() {
        let step = Decimal::new(1, 1);
        let exponent = Decimal::new(15, 1);
        assert_eq!(slide_factor(Decimal::ONE, exponent), Decimal::ONE);
        assert_eq!(listener_slide(0, step, 10), Decimal::ONE);

        let mut previous = Decimal::ONE;
        for n in 0..1000 {
            let factor = slide_factor(listener_slide(n, step, 10), exponent);
            assert!(factor > Decimal::ZERO);
            assert!(factor <= previous);
            previous = factor;
        }
        // Histories longer than the window saturate
        assert_eq!(listener_slide(1000, step, 10), Decimal::from(2));
    }

    #[test]
    fn keywords_attenuate_unbacked_opinions() {
        let mut profile = PreferenceProfile::default();
        profile.keywords.insert("jazz".to_string(), Decimal::ONE);
        profile.keywords.insert("metal".to_string(), -Decimal::ONE);

        let half = Decimal::new(5, 1);
        let mut tagged = song("a", 200);
        assert_eq!(keyword_attenuation(Decimal::ONE, &profile, &tagged, half), half);
        assert_eq!(keyword_attenuation(-Decimal::ONE, &profile, &tagged, half), half);

        tagged.keywords.insert("jazz".to_string());
        assert_eq!(keyword_attenuation(Decimal::ONE, &profile, &tagged, half), Decimal::ONE);
        assert_eq!(keyword_attenuation(-Decimal::ONE, &profile, &tagged, half), half);

        let plain = PreferenceProfile::default();
        assert_eq!(keyword_attenuation(Decimal::ONE, &plain, &tagged, half), Decimal::ONE);
    }

    #[test]
    fn queue_override_prefers_the_head() {
        assert_eq!(queue_override(Some(0), 20), Decimal::ONE);
        assert_eq!(queue_override(Some(10), 20), Decimal::new(5, 1));
        assert_eq!(queue_override(None, 20), Decimal::ZERO);
        assert_eq!(queue_override(Some(0), 0), Decimal::ZERO);
    }

    #[test]
    fn unanimous_dislike_is_penalized() {
        let cfg = PriorityConfig::default();
        let hate = [Decimal::new(-8, 1), Decimal::new(-9, 1)];
        let dislike = [Decimal::new(-8, 1), Decimal::new(-4, 1)];
        let mixed = [Decimal::new(-8, 1), Decimal::new(4, 1)];
        assert_eq!(opinion_penalty(&hate, &cfg), cfg.hate_penalty);
        assert_eq!(opinion_penalty(&dislike, &cfg), cfg.dislike_penalty);
        assert_eq!(opinion_penalty(&mixed, &cfg), Decimal::ONE);
        assert_eq!(opinion_penalty(&[], &cfg), Decimal::ONE);
    }

    #[tokio::test]
    async fn curators_raise_and_trace_records_every_step() {
        let ranking = StaticRanking::default()
            .with_likeability("dj", "a", Decimal::new(8, 1))
            .with_likeability("alice", "a", Decimal::new(5, 1));
        let engine = PriorityEngine::new(PriorityConfig::default(), Some(Arc::new(ranking)));

        let now = Utc::now();
        let catalog = vec![
            candidate("a", 200, 0, None),
            candidate("b", 200, 5, None),
            candidate("c", 200, 5, None),
        ];
        let mut profile = PreferenceProfile::default();
        profile.curators.insert("dj".into(), CuratorPolarity::Positive);

        let mut ctx = ScoringContext::new(now).with_catalog(&catalog);
        let plain = engine
            .compute(&catalog[0], &ctx, SelectionFlags::default(), None)
            .await;

        ctx.listeners.push(("alice".into(), profile));
        let mut trace = PriorityTrace::new("a".into());
        let curated = engine
            .compute(&catalog[0], &ctx, SelectionFlags::default(), Some(&mut trace))
            .await;

        assert!(curated > plain);
        assert_eq!(trace.score(), curated);
        let steps: Vec<_> = trace.steps.iter().map(|s| s.step).collect();
        assert_eq!(
            steps,
            vec![
                "base", "popularity", "curator", "slide", "length", "low_plays", "clamp", "rarity",
                "recency", "opinion"
            ]
        );

        let terms = engine.listener_terms(&catalog[0], &ctx).await;
        assert_eq!(BiasSign::of(terms[0].1), BiasSign::Positive);
    }

    #[tokio::test]
    async fn novelty_flag_zeroes_old_songs() {
        let engine = PriorityEngine::new(PriorityConfig::default(), None);
        let now = Utc::now();
        let old = candidate("old", 200, 0, None);
        let mut fresh = candidate("fresh", 200, 0, None);
        fresh.song.added_at = now - Duration::days(1);
        let catalog = vec![old.clone(), fresh.clone()];
        let ctx = ScoringContext::new(now).with_catalog(&catalog);

        let flags = SelectionFlags {
            use_queue: false,
            use_novelty: true,
        };
        assert!(engine.compute(&old, &ctx, flags, None).await.is_zero());
        assert!(engine.compute(&fresh, &ctx, flags, None).await > Decimal::ZERO);
    }
}

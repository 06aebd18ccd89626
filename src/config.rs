use crate::services::listeners::ListenerConfig;
use crate::services::queue::QueueConfig;
use crate::services::{PreferenceLimits, PriorityConfig, SamplerConfig, SchedulerConfig};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Preferences are kept in memory when unset
    pub database_url: Option<String>,
    pub server_host: String,
    pub server_port: u16,
    /// JSON manifest describing the song library
    pub catalog_path: PathBuf,
    /// Where song metadata (scheduler stats) is persisted
    pub metadata_path: Option<PathBuf>,
    /// Optional JSON ranking table
    pub ranking_path: Option<PathBuf>,
    /// Fixed seed for reproducible draws
    pub rng_seed: Option<u64>,
    pub scheduler: SchedulerConfig,
    pub priority: PriorityConfig,
    pub sampler: SamplerConfig,
    pub preference_limits: PreferenceLimits,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let catalog_path: PathBuf = env::var("RADIO_CATALOG")
            .unwrap_or_else(|_| "./library/catalog.json".to_string())
            .into();

        let priority_defaults = PriorityConfig::default();
        let priority = PriorityConfig {
            base: var("RADIO_BASE", priority_defaults.base)?,
            popularity_weight: var("RADIO_POPULARITY_WEIGHT", priority_defaults.popularity_weight)?,
            curator_weight: var("RADIO_CURATOR_WEIGHT", priority_defaults.curator_weight)?,
            keyword_attenuation: var(
                "RADIO_KEYWORD_ATTENUATION",
                priority_defaults.keyword_attenuation,
            )?,
            skip_window: chrono::Duration::seconds(var(
                "RADIO_SKIP_WINDOW_SECS",
                priority_defaults.skip_window.num_seconds(),
            )?),
            skip_decay_power: var("RADIO_SKIP_DECAY_POWER", priority_defaults.skip_decay_power)?,
            slide_step: var("RADIO_SLIDE_STEP", priority_defaults.slide_step)?,
            slide_window: var("RADIO_SLIDE_WINDOW", priority_defaults.slide_window)?,
            slide_exponent: var("RADIO_SLIDE_EXPONENT", priority_defaults.slide_exponent)?,
            length_bonus: var("RADIO_LENGTH_BONUS", priority_defaults.length_bonus)?,
            min_length: var("RADIO_MIN_LENGTH", priority_defaults.min_length)?,
            ideal_max_length: var("RADIO_IDEAL_MAX_LENGTH", priority_defaults.ideal_max_length)?,
            max_excess_length: var("RADIO_MAX_EXCESS_LENGTH", priority_defaults.max_excess_length)?,
            low_play_factor: var("RADIO_LOW_PLAY_FACTOR", priority_defaults.low_play_factor)?,
            low_play_ceiling: var("RADIO_LOW_PLAY_CEILING", priority_defaults.low_play_ceiling)?,
            rarity_slice: var("RADIO_RARITY_SLICE", priority_defaults.rarity_slice)?,
            recency_window: chrono::Duration::seconds(var(
                "RADIO_RECENCY_WINDOW_SECS",
                priority_defaults.recency_window.num_seconds(),
            )?),
            dislike_threshold: var("RADIO_DISLIKE_THRESHOLD", priority_defaults.dislike_threshold)?,
            dislike_penalty: var("RADIO_DISLIKE_PENALTY", priority_defaults.dislike_penalty)?,
            hate_threshold: var("RADIO_HATE_THRESHOLD", priority_defaults.hate_threshold)?,
            hate_penalty: var("RADIO_HATE_PENALTY", priority_defaults.hate_penalty)?,
            novelty_window: chrono::Duration::seconds(var(
                "RADIO_NOVELTY_WINDOW_SECS",
                priority_defaults.novelty_window.num_seconds(),
            )?),
            novelty_play_breaker: var(
                "RADIO_NOVELTY_PLAY_BREAKER",
                priority_defaults.novelty_play_breaker,
            )?,
        };

        let sampler_defaults = SamplerConfig::default();
        let sampler = SamplerConfig {
            queue_probability: probability(
                "RADIO_QUEUE_PROBABILITY",
                sampler_defaults.queue_probability,
            )?,
            novelty_probability: probability(
                "RADIO_NOVELTY_PROBABILITY",
                sampler_defaults.novelty_probability,
            )?,
        };

        let defaults = SchedulerConfig::default();
        let queue_defaults = QueueConfig::default();
        let listener_defaults = ListenerConfig::default();
        let scheduler = SchedulerConfig {
            lead_in: secs("RADIO_LEAD_IN_SECS", defaults.lead_in)?,
            pause_expiry: secs("RADIO_PAUSE_EXPIRY_SECS", defaults.pause_expiry)?,
            base_volume: probability("RADIO_VOLUME", defaults.base_volume)?,
            reference_loudness: var("RADIO_REFERENCE_LOUDNESS", defaults.reference_loudness)?,
            max_attenuation_db: var("RADIO_MAX_ATTENUATION_DB", defaults.max_attenuation_db)?,
            history_size: var("RADIO_HISTORY_SIZE", defaults.history_size)?,
            announce_interval: secs("RADIO_ANNOUNCE_INTERVAL_SECS", defaults.announce_interval)?,
            start_enabled: var("RADIO_START_ENABLED", defaults.start_enabled)?,
            queue: QueueConfig {
                max_size: var("RADIO_QUEUE_MAX", queue_defaults.max_size)?,
                requeue_cooldown: chrono::Duration::seconds(var(
                    "RADIO_REQUEUE_COOLDOWN_SECS",
                    queue_defaults.requeue_cooldown.num_seconds(),
                )?),
            },
            listeners: ListenerConfig {
                withdrawal_delay: secs(
                    "RADIO_WITHDRAWAL_DELAY_SECS",
                    listener_defaults.withdrawal_delay,
                )?,
                auto_end_max: var("RADIO_AUTO_END_MAX", listener_defaults.auto_end_max)?,
            },
        };

        let limit_defaults = PreferenceLimits::default();
        let preference_limits = PreferenceLimits {
            max_curators: var("RADIO_MAX_CURATORS", limit_defaults.max_curators)?,
            max_keywords: var("RADIO_MAX_KEYWORDS", limit_defaults.max_keywords)?,
            max_profiles: var("RADIO_MAX_PROFILES", limit_defaults.max_profiles)?,
        };

        Ok(Config {
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .unwrap_or(8000),
            metadata_path: env::var("RADIO_METADATA").ok().map(PathBuf::from).or_else(|| {
                catalog_path
                    .parent()
                    .map(|dir| dir.join("voice_radio_metadata.json"))
            }),
            catalog_path,
            ranking_path: env::var("RADIO_RANKING").ok().map(PathBuf::from),
            rng_seed: env::var("RADIO_SEED").ok().and_then(|s| s.parse().ok()),
            scheduler,
            priority,
            sampler,
            preference_limits,
        })
    }
}

/// Read an optional override; malformed values are an error rather than
/// silently falling back
fn var<T: FromStr>(name: &str, default: T) -> Result<T, anyhow::Error> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

fn secs(name: &str, default: Duration) -> Result<Duration, anyhow::Error> {
    var(name, default.as_secs()).map(Duration::from_secs)
}

fn probability(name: &str, default: f64) -> Result<f64, anyhow::Error> {
    let value = var(name, default)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(anyhow::anyhow!("{} must lie between 0 and 1", name));
    }
    Ok(value)
}

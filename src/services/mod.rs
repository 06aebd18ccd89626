pub mod history;
pub mod library;
pub mod listeners;
pub mod preferences;
pub mod priority;
pub mod queue;
pub mod ranking;
pub mod sampler;
pub mod scheduler;
pub mod timer;
pub mod voice;

pub use library::{CatalogLibrary, Library};
pub use preferences::{
    MemoryPreferenceRepository, PgPreferenceRepository, PreferenceLimits, PreferenceRepository,
    PreferenceStore,
};
pub use priority::{PriorityConfig, PriorityEngine};
pub use ranking::{Ranking, StaticRanking};
pub use sampler::{Sampler, SamplerConfig};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerHandle};
pub use voice::{BroadcastVoice, VoiceGateway};

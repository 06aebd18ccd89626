pub mod listener;
pub mod playback;
pub mod preference;
pub mod song;

pub use listener::{ListenerStatus, Presence, TransportEvent, UserId};
pub use playback::{
    BiasSign, HistoryEntry, NowPlaying, PlayOutcome, PlaybackPhase, QueueEntry, SkipOutcome,
};
pub use preference::{CuratorPolarity, PreferenceProfile, ProfileSnapshot};
pub use song::{Song, SongHash, SongInfo, SongStats, STATS_KEY};

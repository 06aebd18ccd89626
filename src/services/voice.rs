//! Voice/presence collaborator
//!
//! Everything the scheduler asks of the voice platform goes through
//! [`VoiceGateway`]. [`BroadcastVoice`] turns those requests into
//! [`VoiceAction`] events that platform adapters follow over SSE.

use crate::error::{AppError, Result};
use crate::models::{Presence, Song, SongHash, UserId};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum VoiceAction {
    Play {
        hash: SongHash,
        path: PathBuf,
        volume: f64,
        seek_secs: f64,
    },
    Stop,
    SetVolume {
        volume: f64,
    },
    SetMemberMuted {
        user: UserId,
        muted: bool,
    },
    DisconnectMember {
        user: UserId,
    },
    Announce {
        message: String,
    },
}

#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Users currently in the voice channel, as far as the platform knows
    async fn listeners(&self) -> Vec<(UserId, Presence)>;

    async fn play(&self, song: &Song, path: &Path, volume: f64, seek: Duration) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn set_volume(&self, volume: f64) -> Result<()>;

    async fn set_member_muted(&self, user: &UserId, muted: bool) -> Result<()>;

    async fn disconnect_member(&self, user: &UserId) -> Result<()>;

    async fn announce(&self, message: &str) -> Result<()>;
}

pub struct BroadcastVoice {
    tx: broadcast::Sender<VoiceAction>,
}

impl BroadcastVoice {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Follow the actions requested by the scheduler
    pub fn subscribe(&self) -> broadcast::Receiver<VoiceAction> {
        self.tx.subscribe()
    }

    fn publish(&self, action: VoiceAction) {
        if self.tx.send(action).is_err() {
            tracing::debug!("No voice adapter subscribed, action dropped");
        }
    }
}

#[async_trait]
impl VoiceGateway for BroadcastVoice {
    async fn listeners(&self) -> Vec<(UserId, Presence)> {
        // Adapters report presence as events; there is nothing to poll
        Vec::new()
    }

    async fn play(&self, song: &Song, path: &Path, volume: f64, seek: Duration) -> Result<()> {
        // Audio only reaches the channel through a connected adapter
        self.tx
            .send(VoiceAction::Play {
                hash: song.hash.clone(),
                path: path.to_path_buf(),
                volume,
                seek_secs: seek.as_secs_f64(),
            })
            .map(|_| ())
            .map_err(|_| AppError::Collaborator("No voice adapter is connected".to_string()))
    }

    async fn stop(&self) -> Result<()> {
        self.publish(VoiceAction::Stop);
        Ok(())
    }

    async fn set_volume(&self, volume: f64) -> Result<()> {
        self.publish(VoiceAction::SetVolume { volume });
        Ok(())
    }

    async fn set_member_muted(&self, user: &UserId, muted: bool) -> Result<()> {
        self.publish(VoiceAction::SetMemberMuted {
            user: user.clone(),
            muted,
        });
        Ok(())
    }

    async fn disconnect_member(&self, user: &UserId) -> Result<()> {
        self.publish(VoiceAction::DisconnectMember { user: user.clone() });
        Ok(())
    }

    async fn announce(&self, message: &str) -> Result<()> {
        self.publish(VoiceAction::Announce {
            message: message.to_string(),
        });
        Ok(())
    }
}

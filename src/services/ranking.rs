//! Optional ranking collaborator
//!
//! Supplies a global popularity rank per song and per-user likeability in
//! [-1, 1]. When no ranking service is configured every term it feeds scores
//! zero.

use crate::error::Result;
use crate::models::{SongHash, UserId};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[async_trait]
pub trait Ranking: Send + Sync {
    async fn global_rank(&self, song: &SongHash) -> Option<Decimal>;

    async fn likeability(&self, user: &UserId, song: &SongHash) -> Option<Decimal>;
}

/// Ranking table loaded once from JSON
#[derive(Debug, Default, Deserialize)]
pub struct StaticRanking {
    #[serde(default)]
    global: HashMap<SongHash, Decimal>,
    #[serde(default)]
    likeability: HashMap<UserId, HashMap<SongHash, Decimal>>,
}

impl StaticRanking {
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read(path).await?;
        let ranking: StaticRanking = serde_json::from_slice(&raw)?;
        tracing::info!(
            "Loaded ranking table: {} songs, {} users",
            ranking.global.len(),
            ranking.likeability.len()
        );
        Ok(ranking)
    }

    pub fn with_global(mut self, song: impl Into<SongHash>, rank: Decimal) -> Self {
        self.global.insert(song.into(), rank);
        self
    }

    pub fn with_likeability(
        mut self,
        user: impl Into<UserId>,
        song: impl Into<SongHash>,
        value: Decimal,
    ) -> Self {
        self.likeability
            .entry(user.into())
            .or_default()
            .insert(song.into(), value);
        self
    }
}

#[async_trait]
impl Ranking for StaticRanking {
    async fn global_rank(&self, song: &SongHash) -> Option<Decimal> {
        self.global.get(song).copied()
    }

    async fn likeability(&self, user: &UserId, song: &SongHash) -> Option<Decimal> {
        self.likeability
            .get(user)
            .and_then(|songs| songs.get(song))
            .copied()
    }
}

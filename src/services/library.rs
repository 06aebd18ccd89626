//! Song library collaborator
//!
//! The scheduler never owns songs; it reads them through [`Library`] and keeps
//! its own statistics in the generic per-song metadata map under
//! [`STATS_KEY`].

use crate::error::{AppError, Result};
use crate::models::{Song, SongHash, SongStats, STATS_KEY};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[async_trait]
pub trait Library: Send + Sync {
    async fn song(&self, hash: &SongHash) -> Option<Song>;

    async fn catalog(&self) -> Vec<Song>;

    async fn metadata(&self, hash: &SongHash, key: &str) -> Option<serde_json::Value>;

    async fn set_metadata(&self, hash: &SongHash, key: &str, value: serde_json::Value) -> Result<()>;

    /// Where the audio for `hash` can be streamed from
    async fn content_path(&self, hash: &SongHash) -> Option<PathBuf>;
}

/// Scheduler statistics of a song; unreadable entries count as fresh
pub async fn load_stats(library: &dyn Library, hash: &SongHash) -> SongStats {
    match library.metadata(hash, STATS_KEY).await {
        Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
            tracing::warn!("Discarding unreadable stats of {}: {}", hash, e);
            SongStats::default()
        }),
        None => SongStats::default(),
    }
}

pub async fn store_stats(library: &dyn Library, hash: &SongHash, stats: &SongStats) -> Result<()> {
    let value = serde_json::to_value(stats)?;
    library.set_metadata(hash, STATS_KEY, value).await
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogEntry {
    #[serde(flatten)]
    song: Song,
    /// Audio file, relative to the manifest's directory
    path: PathBuf,
}

type MetadataMap = HashMap<SongHash, BTreeMap<String, serde_json::Value>>;

/// Library backed by a JSON manifest, with metadata optionally persisted to a
/// sidecar JSON file
pub struct CatalogLibrary {
    root: PathBuf,
    songs: RwLock<BTreeMap<SongHash, CatalogEntry>>,
    metadata: RwLock<MetadataMap>,
    sidecar: Option<PathBuf>,
}

impl CatalogLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            songs: RwLock::new(BTreeMap::new()),
            metadata: RwLock::new(HashMap::new()),
            sidecar: None,
        }
    }

    /// Load the manifest and, when it already exists, the metadata sidecar
    pub async fn open(manifest: &Path, sidecar: Option<PathBuf>) -> Result<Self> {
        let raw = tokio::fs::read(manifest).await?;
        let entries: Vec<CatalogEntry> = serde_json::from_slice(&raw)?;
        let root = manifest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let metadata = match &sidecar {
            Some(path) if tokio::fs::try_exists(path).await? => {
                let raw = tokio::fs::read(path).await?;
                serde_json::from_slice(&raw)?
            }
            _ => MetadataMap::new(),
        };

        let library = Self {
            root,
            songs: RwLock::new(BTreeMap::new()),
            metadata: RwLock::new(metadata),
            sidecar,
        };
        for entry in entries {
            library.insert(entry.song, entry.path).await;
        }

        tracing::info!(
            "Loaded {} songs from {}",
            library.songs.read().await.len(),
            manifest.display()
        );
        Ok(library)
    }

    pub async fn insert(&self, mut song: Song, path: impl Into<PathBuf>) {
        song.keywords = song
            .keywords
            .into_iter()
            .map(|keyword| keyword.trim().to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .collect();

        self.songs.write().await.insert(
            song.hash.clone(),
            CatalogEntry {
                song,
                path: path.into(),
            },
        );
    }

    async fn persist(&self, metadata: &MetadataMap) -> Result<()> {
        if let Some(path) = &self.sidecar {
            let raw = serde_json::to_vec_pretty(metadata)?;
            tokio::fs::write(path, raw).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Library for CatalogLibrary {
    async fn song(&self, hash: &SongHash) -> Option<Song> {
        self.songs.read().await.get(hash).map(|entry| entry.song.clone())
    }

    async fn catalog(&self) -> Vec<Song> {
        self.songs
            .read()
            .await
            .values()
            .map(|entry| entry.song.clone())
            .collect()
    }

    async fn metadata(&self, hash: &SongHash, key: &str) -> Option<serde_json::Value> {
        self.metadata
            .read()
            .await
            .get(hash)
            .and_then(|entries| entries.get(key))
            .cloned()
    }

    async fn set_metadata(&self, hash: &SongHash, key: &str, value: serde_json::Value) -> Result<()> {
        if !self.songs.read().await.contains_key(hash) {
            return Err(AppError::NotFound(format!("Song {} is not in the library", hash)));
        }

        let mut metadata = self.metadata.write().await;
        metadata
            .entry(hash.clone())
            .or_default()
            .insert(key.to_string(), value);
        self.persist(&metadata).await
    }

    async fn content_path(&self, hash: &SongHash) -> Option<PathBuf> {
        self.songs
            .read()
            .await
            .get(hash)
            .map(|entry| self.root.join(&entry.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn song(hash: &str) -> Song {
        Song {
            hash: hash.into(),
            title: format!("Song {}", hash),
            artist: "Test Artist".to_string(),
            length: 200,
            loudness: Some(-12.0),
            keywords: ["  Jazz ".to_string(), "".to_string()].into_iter().collect(),
            added_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn stats_round_trip_through_metadata() {
        let library = CatalogLibrary::new("/music");
        library.insert(song("a"), "a.ogg").await;

        let hash = SongHash::from("a");
        assert_eq!(load_stats(&library, &hash).await, SongStats::default());

        let mut stats = SongStats::default();
        stats.record_play(Utc::now());
        store_stats(&library, &hash, &stats).await.unwrap();
        assert_eq!(load_stats(&library, &hash).await.plays, 1);
    }

    #[tokio::test]
    async fn unknown_songs_reject_metadata() {
        let library = CatalogLibrary::new("/music");
        let result = library
            .set_metadata(&"ghost".into(), STATS_KEY, serde_json::json!({}))
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn keywords_are_normalized_and_paths_resolved() {
        let library = CatalogLibrary::new("/music");
        library.insert(song("a"), "rock/a.ogg").await;

        let stored = library.song(&"a".into()).await.unwrap();
        assert_eq!(stored.keywords.into_iter().collect::<Vec<_>>(), vec!["jazz"]);
        assert_eq!(
            library.content_path(&"a".into()).await,
            Some(PathBuf::from("/music/rock/a.ogg"))
        );
    }

    #[tokio::test]
    async fn corrupt_stats_degrade_to_defaults() {
        let library = CatalogLibrary::new("/music");
        library.insert(song("a"), "a.ogg").await;
        library
            .set_metadata(&"a".into(), STATS_KEY, serde_json::json!({"plays": "many"}))
            .await
            .unwrap();
        assert_eq!(load_stats(&library, &"a".into()).await, SongStats::default());
    }
}

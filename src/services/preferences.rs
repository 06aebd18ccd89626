//! Per-user listening preferences
//!
//! Curators, keyword ratings and named profile snapshots. Every edit is
//! validated against the configured bounds on a copy of the record; a
//! rejected edit leaves both the cache and the repository untouched.

use crate::error::{AppError, Result};
use crate::models::{CuratorPolarity, PreferenceProfile, UserId};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[async_trait]
pub trait PreferenceRepository: Send + Sync {
    async fn load(&self, user: &UserId) -> Result<Option<PreferenceProfile>>;
    async fn save(&self, user: &UserId, profile: &PreferenceProfile) -> Result<()>;
}

/// Volatile repository used when no database is configured
#[derive(Default)]
pub struct MemoryPreferenceRepository {
    records: RwLock<HashMap<UserId, PreferenceProfile>>,
}

#[async_trait]
impl PreferenceRepository for MemoryPreferenceRepository {
    async fn load(&self, user: &UserId) -> Result<Option<PreferenceProfile>> {
        Ok(self.records.read().await.get(user).cloned())
    }

    async fn save(&self, user: &UserId, profile: &PreferenceProfile) -> Result<()> {
        self.records
            .write()
            .await
            .insert(user.clone(), profile.clone());
        Ok(())
    }
}

pub struct PgPreferenceRepository {
    db: PgPool,
}

impl PgPreferenceRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PreferenceRepository for PgPreferenceRepository {
    async fn load(&self, user: &UserId) -> Result<Option<PreferenceProfile>> {
        let profile: Option<sqlx::types::Json<PreferenceProfile>> =
            sqlx::query_scalar("SELECT profile FROM user_preferences WHERE user_id = $1")
                .bind(&user.0)
                .fetch_optional(&self.db)
                .await?;

        Ok(profile.map(|json| json.0))
    }

    async fn save(&self, user: &UserId, profile: &PreferenceProfile) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_preferences (user_id, profile, updated_at) VALUES ($1, $2, NOW())
             ON CONFLICT (user_id) DO UPDATE SET profile = $2, updated_at = NOW()",
        )
        .bind(&user.0)
        .bind(sqlx::types::Json(profile))
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PreferenceLimits {
    pub max_curators: usize,
    pub max_keywords: usize,
    pub max_profiles: usize,
}

impl Default for PreferenceLimits {
    fn default() -> Self {
        Self {
            max_curators: 10,
            max_keywords: 30,
            max_profiles: 5,
        }
    }
}

pub struct PreferenceStore {
    repository: Arc<dyn PreferenceRepository>,
    cache: RwLock<HashMap<UserId, PreferenceProfile>>,
    /// Serializes edits per user; readers never wait on these
    edit_locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
    limits: PreferenceLimits,
}

impl PreferenceStore {
    pub fn new(repository: Arc<dyn PreferenceRepository>, limits: PreferenceLimits) -> Self {
        Self {
            repository,
            cache: RwLock::new(HashMap::new()),
            edit_locks: Mutex::new(HashMap::new()),
            limits,
        }
    }

    /// The user's record; users who never edited anything get an empty one
    pub async fn profile(&self, user: &UserId) -> Result<PreferenceProfile> {
        if let Some(profile) = self.cache.read().await.get(user) {
            return Ok(profile.clone());
        }

        let profile = self.repository.load(user).await?.unwrap_or_default();
        self.cache
            .write()
            .await
            .insert(user.clone(), profile.clone());
        Ok(profile)
    }

    /// Records for a listener set. Unreadable records degrade to empty ones.
    pub async fn profiles_for(&self, users: &[UserId]) -> Vec<(UserId, PreferenceProfile)> {
        let mut profiles = Vec::with_capacity(users.len());
        for user in users {
            let profile = match self.profile(user).await {
                Ok(profile) => profile,
                Err(e) => {
                    tracing::warn!("Failed to load preferences of {}: {:?}", user, e);
                    PreferenceProfile::default()
                }
            };
            profiles.push((user.clone(), profile));
        }
        profiles
    }

    pub async fn add_curator(
        &self,
        user: &UserId,
        curator: UserId,
        polarity: CuratorPolarity,
    ) -> Result<PreferenceProfile> {
        let limit = self.limits.max_curators;
        self.edit(user, |profile| {
            if &curator == user {
                return Err(AppError::Validation("You cannot curate yourself".to_string()));
            }
            if !profile.curators.contains_key(&curator) && profile.curators.len() >= limit {
                return Err(AppError::Validation(format!(
                    "At most {} curators are allowed",
                    limit
                )));
            }
            profile.curators.insert(curator, polarity);
            Ok(())
        })
        .await
    }

    pub async fn remove_curator(&self, user: &UserId, curator: &UserId) -> Result<PreferenceProfile> {
        self.edit(user, |profile| {
            profile
                .curators
                .remove(curator)
                .map(|_| ())
                .ok_or_else(|| AppError::NotFound(format!("{} is not a curator", curator)))
        })
        .await
    }

    pub async fn replace_curators(
        &self,
        user: &UserId,
        curators: Vec<(UserId, CuratorPolarity)>,
    ) -> Result<PreferenceProfile> {
        let limit = self.limits.max_curators;
        self.edit(user, |profile| {
            let replacement: BTreeMap<_, _> = curators.into_iter().collect();
            if replacement.len() > limit {
                return Err(AppError::Validation(format!(
                    "At most {} curators are allowed",
                    limit
                )));
            }
            if replacement.contains_key(user) {
                return Err(AppError::Validation("You cannot curate yourself".to_string()));
            }
            profile.curators = replacement;
            Ok(())
        })
        .await
    }

    pub async fn add_keyword(
        &self,
        user: &UserId,
        keyword: &str,
        rating: Decimal,
    ) -> Result<PreferenceProfile> {
        let limit = self.limits.max_keywords;
        let keyword = normalize_keyword(keyword)?;
        if rating < -Decimal::ONE || rating > Decimal::ONE {
            return Err(AppError::Validation(
                "Keyword ratings must lie between -1 and 1".to_string(),
            ));
        }

        self.edit(user, |profile| {
            if !profile.keywords.contains_key(&keyword) && profile.keywords.len() >= limit {
                return Err(AppError::Validation(format!(
                    "At most {} keywords are allowed",
                    limit
                )));
            }
            profile.keywords.insert(keyword, rating);
            Ok(())
        })
        .await
    }

    pub async fn remove_keyword(&self, user: &UserId, keyword: &str) -> Result<PreferenceProfile> {
        let keyword = normalize_keyword(keyword)?;
        self.edit(user, |profile| {
            profile
                .keywords
                .remove(&keyword)
                .map(|_| ())
                .ok_or_else(|| AppError::NotFound(format!("Keyword '{}' is not rated", keyword)))
        })
        .await
    }

    pub async fn clear_keywords(&self, user: &UserId) -> Result<PreferenceProfile> {
        self.edit(user, |profile| {
            profile.keywords.clear();
            Ok(())
        })
        .await
    }

    /// Store the current curators and keywords under `name`
    pub async fn save_profile(&self, user: &UserId, name: &str) -> Result<PreferenceProfile> {
        let limit = self.limits.max_profiles;
        let name = normalize_profile_name(name)?;
        self.edit(user, |profile| {
            if !profile.saved_profiles.contains_key(&name) && profile.saved_profiles.len() >= limit {
                return Err(AppError::Validation(format!(
                    "At most {} saved profiles are allowed",
                    limit
                )));
            }
            let snapshot = profile.snapshot();
            profile.saved_profiles.insert(name, snapshot);
            Ok(())
        })
        .await
    }

    /// Replace the current curators and keywords with a saved snapshot
    pub async fn load_profile(&self, user: &UserId, name: &str) -> Result<PreferenceProfile> {
        let name = normalize_profile_name(name)?;
        self.edit(user, |profile| {
            let snapshot = profile
                .saved_profiles
                .get(&name)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("No saved profile '{}'", name)))?;
            profile.curators = snapshot.curators;
            profile.keywords = snapshot.keywords;
            Ok(())
        })
        .await
    }

    pub async fn delete_profile(&self, user: &UserId, name: &str) -> Result<PreferenceProfile> {
        let name = normalize_profile_name(name)?;
        self.edit(user, |profile| {
            profile
                .saved_profiles
                .remove(&name)
                .map(|_| ())
                .ok_or_else(|| AppError::NotFound(format!("No saved profile '{}'", name)))
        })
        .await
    }

    /// Apply `change` to a copy of the record and persist it only on success.
    /// Edits of one user never interleave; the cache is only locked to swap
    /// in the saved record.
    async fn edit<F>(&self, user: &UserId, change: F) -> Result<PreferenceProfile>
    where
        F: FnOnce(&mut PreferenceProfile) -> Result<()>,
    {
        let lock = self
            .edit_locks
            .lock()
            .await
            .entry(user.clone())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        let mut profile = self.profile(user).await?;
        change(&mut profile)?;

        self.repository.save(user, &profile).await?;
        self.cache
            .write()
            .await
            .insert(user.clone(), profile.clone());
        tracing::debug!("Updated preferences of {}", user);
        Ok(profile)
    }
}

fn normalize_keyword(keyword: &str) -> Result<String> {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        return Err(AppError::Validation("Keyword must not be empty".to_string()));
    }
    Ok(keyword)
}

fn normalize_profile_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Profile name must not be empty".to_string()));
    }
    Ok(name.to_string())
}

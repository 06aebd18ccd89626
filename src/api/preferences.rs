use crate::api::AppState;
use crate::error::{AppError, Result as AppResult};
use crate::models::{CuratorPolarity, PreferenceProfile, UserId};
use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
struct CuratorRequest {
    #[validate(length(min = 1, max = 128))]
    curator: String,
    #[serde(default = "positive")]
    polarity: CuratorPolarity,
}

fn positive() -> CuratorPolarity {
    CuratorPolarity::Positive
}

#[derive(Debug, Deserialize)]
struct ReplaceCuratorsRequest {
    curators: Vec<CuratorRequest>,
}

#[derive(Debug, Deserialize, Validate)]
struct KeywordRequest {
    #[validate(length(min = 1, max = 64))]
    keyword: String,
    rating: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
struct ProfileRequest {
    #[validate(length(min = 1, max = 64))]
    name: String,
}

pub fn preference_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/:user/preferences", get(get_preferences))
        .route(
            "/users/:user/curators",
            post(add_curator).put(replace_curators),
        )
        .route("/users/:user/curators/:curator", delete(remove_curator))
        .route(
            "/users/:user/keywords",
            post(add_keyword).delete(clear_keywords),
        )
        .route("/users/:user/keywords/:keyword", delete(remove_keyword))
        .route("/users/:user/profiles", post(save_profile))
        .route("/users/:user/profiles/:name", delete(delete_profile))
        .route("/users/:user/profiles/:name/load", post(load_profile))
}

fn validate(req: &impl Validate) -> AppResult<()> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))
}

async fn get_preferences(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> AppResult<Json<PreferenceProfile>> {
    Ok(Json(state.preferences.profile(&user.into()).await?))
}

async fn add_curator(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    Json(req): Json<CuratorRequest>,
) -> AppResult<Json<PreferenceProfile>> {
    validate(&req)?;
    let profile = state
        .preferences
        .add_curator(&user.into(), req.curator.into(), req.polarity)
        .await?;
    Ok(Json(profile))
}

async fn replace_curators(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    Json(req): Json<ReplaceCuratorsRequest>,
) -> AppResult<Json<PreferenceProfile>> {
    for curator in &req.curators {
        validate(curator)?;
    }
    let curators = req
        .curators
        .into_iter()
        .map(|c| (UserId::from(c.curator), c.polarity))
        .collect();
    let profile = state
        .preferences
        .replace_curators(&user.into(), curators)
        .await?;
    Ok(Json(profile))
}

async fn remove_curator(
    State(state): State<Arc<AppState>>,
    Path((user, curator)): Path<(String, String)>,
) -> AppResult<Json<PreferenceProfile>> {
    let profile = state
        .preferences
        .remove_curator(&user.into(), &curator.into())
        .await?;
    Ok(Json(profile))
}

async fn add_keyword(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    Json(req): Json<KeywordRequest>,
) -> AppResult<Json<PreferenceProfile>> {
    validate(&req)?;
    let profile = state
        .preferences
        .add_keyword(&user.into(), &req.keyword, req.rating)
        .await?;
    Ok(Json(profile))
}

async fn remove_keyword(
    State(state): State<Arc<AppState>>,
    Path((user, keyword)): Path<(String, String)>,
) -> AppResult<Json<PreferenceProfile>> {
    let profile = state
        .preferences
        .remove_keyword(&user.into(), &keyword)
        .await?;
    Ok(Json(profile))
}

async fn clear_keywords(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> AppResult<Json<PreferenceProfile>> {
    Ok(Json(state.preferences.clear_keywords(&user.into()).await?))
}

async fn save_profile(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    Json(req): Json<ProfileRequest>,
) -> AppResult<Json<PreferenceProfile>> {
    validate(&req)?;
    let profile = state
        .preferences
        .save_profile(&user.into(), &req.name)
        .await?;
    Ok(Json(profile))
}

async fn load_profile(
    State(state): State<Arc<AppState>>,
    Path((user, name)): Path<(String, String)>,
) -> AppResult<Json<PreferenceProfile>> {
    let profile = state.preferences.load_profile(&user.into(), &name).await?;
    Ok(Json(profile))
}

async fn delete_profile(
    State(state): State<Arc<AppState>>,
    Path((user, name)): Path<(String, String)>,
) -> AppResult<Json<PreferenceProfile>> {
    let profile = state
        .preferences
        .delete_profile(&user.into(), &name)
        .await?;
    Ok(Json(profile))
}

use crate::api::AppState;
use crate::error::{AppError, Result as AppResult};
use crate::models::{
    HistoryEntry, ListenerStatus, NowPlaying, Presence, QueueEntry, SkipOutcome, TransportEvent,
};
use crate::services::priority::PriorityTrace;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
struct UserRequest {
    #[validate(length(min = 1, max = 128))]
    user_id: String,
}

#[derive(Debug, Deserialize, Validate)]
struct EnqueueRequest {
    #[validate(length(min = 1, max = 128))]
    song: String,
    #[validate(length(min = 1, max = 128))]
    requester: String,
    /// Jump the queue
    #[serde(default)]
    demand: bool,
}

#[derive(Debug, Serialize)]
struct EnqueueResponse {
    accepted: bool,
}

#[derive(Debug, Serialize)]
struct WithdrawResponse {
    removed: usize,
}

#[derive(Debug, Serialize)]
struct StopResponse {
    stopped: bool,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
struct VolumeRequest {
    #[validate(range(min = 0.0, max = 1.0))]
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct NeutralRequest {
    neutral: bool,
}

#[derive(Debug, Deserialize, Validate)]
struct AutoEndRequest {
    /// Songs left before disconnecting; null clears the counter
    #[validate(range(min = 1))]
    songs: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
struct PresenceRequest {
    #[validate(length(min = 1, max = 128))]
    user_id: String,
    presence: Presence,
}

#[derive(Debug, Deserialize)]
struct TransportRequest {
    event: TransportEvent,
}

#[derive(Debug, Default, Deserialize)]
struct StreamEndedRequest {
    /// Song whose stream ended; the current one when omitted
    #[serde(default)]
    hash: Option<String>,
}

#[derive(Debug, Serialize)]
struct StreamEndedResponse {
    accepted: bool,
}

pub fn playback_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/now", get(now_playing))
        .route("/skip", post(vote_skip))
        .route("/stop", post(stop))
        .route("/queue", get(list_queue).post(enqueue))
        .route("/queue/:requester", delete(withdraw))
        .route("/history", get(history))
        .route("/volume", put(set_volume))
        .route("/enable", post(enable))
        .route("/disable", post(disable))
        .route("/listeners", get(listeners))
        .route("/listeners/:user/neutral", put(set_neutral))
        .route("/listeners/:user/auto-end", put(set_auto_end))
        .route("/trace/:hash", get(trace))
        .route("/presence", post(presence))
        .route("/transport", post(transport))
        .route("/stream/ended", post(stream_ended))
}

fn validate(req: &impl Validate) -> AppResult<()> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))
}

async fn now_playing(State(state): State<Arc<AppState>>) -> AppResult<Json<NowPlaying>> {
    Ok(Json(state.scheduler.now_playing().await?))
}

async fn vote_skip(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UserRequest>,
) -> AppResult<Json<SkipOutcome>> {
    validate(&req)?;
    let outcome = state.scheduler.vote_skip(req.user_id.into()).await?;
    Ok(Json(outcome))
}

async fn stop(State(state): State<Arc<AppState>>) -> AppResult<Json<StopResponse>> {
    let stopped = state.scheduler.stop().await?;
    Ok(Json(StopResponse { stopped }))
}

async fn list_queue(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<QueueEntry>>> {
    Ok(Json(state.scheduler.queue().await?))
}

async fn enqueue(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EnqueueRequest>,
) -> AppResult<Json<EnqueueResponse>> {
    validate(&req)?;
    let accepted = state
        .scheduler
        .enqueue(req.song.into(), req.requester.into(), req.demand)
        .await?;
    Ok(Json(EnqueueResponse { accepted }))
}

async fn withdraw(
    State(state): State<Arc<AppState>>,
    Path(requester): Path<String>,
) -> AppResult<Json<WithdrawResponse>> {
    let removed = state.scheduler.withdraw(requester.into()).await?;
    Ok(Json(WithdrawResponse { removed }))
}

async fn history(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<HistoryEntry>>> {
    Ok(Json(state.scheduler.history().await?))
}

async fn set_volume(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VolumeRequest>,
) -> AppResult<Json<VolumeRequest>> {
    validate(&req)?;
    let volume = state.scheduler.set_volume(req.volume).await?;
    Ok(Json(VolumeRequest { volume }))
}

async fn enable(State(state): State<Arc<AppState>>) -> AppResult<Json<NowPlaying>> {
    state.scheduler.set_enabled(true).await?;
    Ok(Json(state.scheduler.now_playing().await?))
}

async fn disable(State(state): State<Arc<AppState>>) -> AppResult<Json<NowPlaying>> {
    state.scheduler.set_enabled(false).await?;
    Ok(Json(state.scheduler.now_playing().await?))
}

async fn listeners(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<ListenerStatus>>> {
    Ok(Json(state.scheduler.listeners().await?))
}

async fn set_neutral(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    Json(req): Json<NeutralRequest>,
) -> AppResult<Json<ListenerStatus>> {
    let status = state.scheduler.set_neutral(user.into(), req.neutral).await?;
    Ok(Json(status))
}

async fn set_auto_end(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    Json(req): Json<AutoEndRequest>,
) -> AppResult<Json<ListenerStatus>> {
    validate(&req)?;
    let status = state.scheduler.set_auto_end(user.into(), req.songs).await?;
    Ok(Json(status))
}

async fn trace(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> AppResult<Json<PriorityTrace>> {
    Ok(Json(state.scheduler.trace(hash.into()).await?))
}

async fn presence(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PresenceRequest>,
) -> AppResult<StatusCode> {
    validate(&req)?;
    state
        .scheduler
        .presence(req.user_id.into(), req.presence)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn transport(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TransportRequest>,
) -> AppResult<StatusCode> {
    state.scheduler.transport(req.event).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stream_ended(
    State(state): State<Arc<AppState>>,
    req: Option<Json<StreamEndedRequest>>,
) -> AppResult<Json<StreamEndedResponse>> {
    let req = req.map(|Json(req)| req).unwrap_or_default();
    let accepted = state
        .scheduler
        .stream_ended(req.hash.map(Into::into))
        .await?;
    Ok(Json(StreamEndedResponse { accepted }))
}

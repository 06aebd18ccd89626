use crate::api::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use std::{convert::Infallible, sync::Arc};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;

pub fn event_routes() -> Router<Arc<AppState>> {
    Router::new().route("/voice/events", get(voice_events))
}

/// Voice actions for platform adapters. Each connection holds its own
/// subscription, released when the client goes away.
async fn voice_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::info!("Voice adapter connected");

    let stream = BroadcastStream::new(state.voice.subscribe()).filter_map(|action| match action {
        Ok(action) => match serde_json::to_string(&action) {
            Ok(data) => Some(Ok(Event::default().event("voice").data(data))),
            Err(e) => {
                tracing::warn!("Failed to encode voice action: {}", e);
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(missed)) => {
            tracing::warn!("Voice adapter lagging, {} actions dropped", missed);
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub mod events;
pub mod playback;
pub mod preferences;

pub use events::event_routes;
pub use playback::playback_routes;
pub use preferences::preference_routes;

use crate::services::{BroadcastVoice, PreferenceStore, SchedulerHandle};
use axum::Router;
use std::sync::Arc;

pub struct AppState {
    pub scheduler: SchedulerHandle,
    pub preferences: Arc<PreferenceStore>,
    pub voice: Arc<BroadcastVoice>,
}

/// Every route of the command surface, relative to the API prefix
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(playback_routes())
        .merge(preference_routes())
        .merge(event_routes())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Song, STATS_KEY};
    use crate::services::{
        CatalogLibrary, Library, MemoryPreferenceRepository, PreferenceLimits, PriorityConfig,
        PriorityEngine, Sampler, SamplerConfig, Scheduler, SchedulerConfig,
    };
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use chrono::Utc;
    use http_body_util::BodyExt;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn app() -> (Router, Arc<CatalogLibrary>) {
        let library = Arc::new(CatalogLibrary::new("/music"));
        library
            .insert(
                Song {
                    hash: "a".into(),
                    title: "Alpha".to_string(),
                    artist: "Artist".to_string(),
                    length: 200,
                    loudness: None,
                    keywords: Default::default(),
                    added_at: Utc::now(),
                },
                "a.ogg",
            )
            .await;

        let preferences = Arc::new(PreferenceStore::new(
            Arc::new(MemoryPreferenceRepository::default()),
            PreferenceLimits::default(),
        ));
        let voice = Arc::new(BroadcastVoice::new(16));
        let sampler = Sampler::new(
            PriorityEngine::new(PriorityConfig::default(), None),
            library.clone(),
            preferences.clone(),
            SamplerConfig::default(),
        );
        let scheduler = Scheduler::spawn(
            SchedulerConfig::default(),
            sampler,
            library.clone(),
            voice.clone(),
            StdRng::seed_from_u64(5),
        );

        let state = Arc::new(AppState {
            scheduler,
            preferences,
            voice,
        });
        (api_routes(state), library)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn reports_idle_radio() {
        let (app, _) = app().await;
        let (status, body) = call(&app, Method::GET, "/now", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "idle");
        assert_eq!(body["listeners"], 0);
    }

    #[tokio::test]
    async fn queue_requests_are_checked_against_the_library() {
        let (app, _) = app().await;

        let (status, _) = call(
            &app,
            Method::POST,
            "/queue",
            Some(json!({"song": "missing", "requester": "alice"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let request = json!({"song": "a", "requester": "alice"});
        let (status, body) = call(&app, Method::POST, "/queue", Some(request.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accepted"], true);
        let (_, body) = call(&app, Method::POST, "/queue", Some(request)).await;
        assert_eq!(body["accepted"], false);

        let (_, queue) = call(&app, Method::GET, "/queue", None).await;
        assert_eq!(queue.as_array().unwrap().len(), 1);

        let (_, body) = call(&app, Method::DELETE, "/queue/alice", None).await;
        assert_eq!(body["removed"], 1);
    }

    #[tokio::test]
    async fn rejects_out_of_range_volume() {
        let (app, _) = app().await;
        let (status, _) = call(&app, Method::PUT, "/volume", Some(json!({"volume": 1.5}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&app, Method::PUT, "/volume", Some(json!({"volume": 0.25}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["volume"], 0.25);
    }

    #[tokio::test]
    async fn listener_settings_require_presence() {
        let (app, _) = app().await;
        let (status, _) = call(
            &app,
            Method::PUT,
            "/listeners/alice/neutral",
            Some(json!({"neutral": true})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &app,
            Method::POST,
            "/presence",
            Some(json!({"user_id": "alice", "presence": "active"})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = call(
            &app,
            Method::PUT,
            "/listeners/alice/neutral",
            Some(json!({"neutral": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["neutral"], true);
    }

    #[tokio::test]
    async fn preferences_round_trip_through_the_api() {
        let (app, _) = app().await;

        let (status, _) = call(
            &app,
            Method::POST,
            "/users/alice/curators",
            Some(json!({"curator": "alice", "polarity": "positive"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            Method::POST,
            "/users/alice/keywords",
            Some(json!({"keyword": " Jazz ", "rating": 0.5})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(
            &app,
            Method::POST,
            "/users/alice/keywords",
            Some(json!({"keyword": "metal", "rating": 3})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, profile) = call(&app, Method::GET, "/users/alice/preferences", None).await;
        assert!(profile["keywords"].get("jazz").is_some());
        assert!(profile["keywords"].get("metal").is_none());
    }

    #[tokio::test]
    async fn curator_lists_are_checked_entry_by_entry() {
        let (app, _) = app().await;

        let (status, _) = call(
            &app,
            Method::PUT,
            "/users/alice/curators",
            Some(json!({"curators": [{"curator": "bob"}, {"curator": ""}]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, profile) = call(
            &app,
            Method::PUT,
            "/users/alice/curators",
            Some(json!({"curators": [
                {"curator": "bob"},
                {"curator": "carol", "polarity": "negative"}
            ]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["curators"]["bob"], "positive");
        assert_eq!(profile["curators"]["carol"], "negative");
    }

    #[tokio::test]
    async fn trace_lists_every_step() {
        let (app, library) = app().await;
        assert!(library.metadata(&"a".into(), STATS_KEY).await.is_none());

        let (status, body) = call(&app, Method::GET, "/trace/a", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hash"], "a");
        assert_eq!(body["steps"][0]["step"], "base");

        let (status, _) = call(&app, Method::GET, "/trace/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

mod api;
mod config;
mod error;
mod models;
mod services;

use crate::api::AppState;
use crate::config::Config;
use crate::services::{
    BroadcastVoice, CatalogLibrary, Library, MemoryPreferenceRepository, PgPreferenceRepository,
    PreferenceRepository, PreferenceStore, PriorityEngine, Ranking, Sampler, Scheduler,
    StaticRanking,
};
use axum::{
    http::{header, Method},
    Router,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,voice_radio=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Preferences live in Postgres when a database is configured
    let repository: Arc<dyn PreferenceRepository> = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await?;
            tracing::info!("Connected to database");

            sqlx::migrate!("./migrations").run(&db).await?;
            tracing::info!("Database migrations completed");

            Arc::new(PgPreferenceRepository::new(db))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, preferences are kept in memory only");
            Arc::new(MemoryPreferenceRepository::default())
        }
    };
    let preferences = Arc::new(PreferenceStore::new(
        repository,
        config.preference_limits.clone(),
    ));

    let library: Arc<dyn Library> = Arc::new(
        CatalogLibrary::open(&config.catalog_path, config.metadata_path.clone()).await?,
    );

    let ranking: Option<Arc<dyn Ranking>> = match &config.ranking_path {
        Some(path) => {
            let ranking: Arc<dyn Ranking> = Arc::new(StaticRanking::load(path).await?);
            Some(ranking)
        }
        None => {
            tracing::info!("No ranking table configured, curator terms score zero");
            None
        }
    };

    let voice = Arc::new(BroadcastVoice::new(256));
    let sampler = Sampler::new(
        PriorityEngine::new(config.priority.clone(), ranking),
        library.clone(),
        preferences.clone(),
        config.sampler.clone(),
    );
    let rng = match config.rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let scheduler = Scheduler::spawn(
        config.scheduler.clone(),
        sampler,
        library,
        voice.clone(),
        rng,
    );

    let app_state = Arc::new(AppState {
        scheduler: scheduler.clone(),
        preferences,
        voice,
    });

    // Build router
    let app = Router::new()
        .nest("/api/v1", api::api_routes(app_state))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE]),
        );

    // Start server
    let addr = format!("{}:{}", config.server_host, config.server_port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!("Scheduler did not shut down cleanly: {}", e);
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

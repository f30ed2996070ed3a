//! Now Playing Back binary entrypoint wiring REST, WebSocket, SSE, audio streaming and storage.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use now_playing_back::{
    config::{AppConfig, StorageBackend},
    dao::{catalog::StaticCatalog, playback_store::memory::MemoryPlaybackStore},
    routes,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let catalog = Arc::new(StaticCatalog::new(config.library().to_vec()));
    info!(tracks = catalog.len(), backend = %config.storage_backend(), "configuration loaded");

    let app_state = AppState::new(&config, catalog);
    start_storage(&app_state, config.storage_backend()).await;

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Install the configured playback store, supervising remote backends in the background.
async fn start_storage(state: &SharedState, backend: StorageBackend) {
    match backend {
        StorageBackend::Memory => install_memory(state).await,
        StorageBackend::Mongo => {
            #[cfg(feature = "mongo-store")]
            {
                tokio::spawn(now_playing_back::services::storage_supervisor::run(
                    state.clone(),
                    remote::connect_mongo,
                ));
            }
            #[cfg(not(feature = "mongo-store"))]
            {
                error!("built without the mongo-store feature; falling back to in-memory storage");
                install_memory(state).await;
            }
        }
        StorageBackend::Couch => {
            #[cfg(feature = "couch-store")]
            {
                tokio::spawn(now_playing_back::services::storage_supervisor::run(
                    state.clone(),
                    remote::connect_couch,
                ));
            }
            #[cfg(not(feature = "couch-store"))]
            {
                error!("built without the couch-store feature; falling back to in-memory storage");
                install_memory(state).await;
            }
        }
    }
}

async fn install_memory(state: &SharedState) {
    if let Err(err) = state
        .install_store(Arc::new(MemoryPlaybackStore::new()))
        .await
    {
        error!(error = %err, "failed to install in-memory playback store");
    }
}

#[cfg(any(feature = "mongo-store", feature = "couch-store"))]
mod remote {
    use std::sync::Arc;

    use now_playing_back::dao::{playback_store::PlaybackStore, storage::StorageError};

    #[cfg(feature = "mongo-store")]
    pub async fn connect_mongo() -> Result<Arc<dyn PlaybackStore>, StorageError> {
        use now_playing_back::dao::playback_store::mongodb::{MongoConfig, MongoPlaybackStore};

        let config = MongoConfig::from_env().await?;
        let store = MongoPlaybackStore::connect(config).await?;
        Ok(Arc::new(store))
    }

    #[cfg(feature = "couch-store")]
    pub async fn connect_couch() -> Result<Arc<dyn PlaybackStore>, StorageError> {
        use now_playing_back::dao::playback_store::couchdb::{CouchConfig, CouchPlaybackStore};

        let config = CouchConfig::from_env()?;
        let store = CouchPlaybackStore::connect(config).await?;
        Ok(Arc::new(store))
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
}

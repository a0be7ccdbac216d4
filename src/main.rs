mod config;
mod db;
mod error;
mod models;
mod routes;
mod services;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, StoreBackend};
use crate::db::{create_pool, run_migrations, MemoryStore, PgStore, Store};
use crate::services::{
    clock::{Clock, SystemClock},
    engine::Engine,
    fetcher::HttpFetcher,
    scheduler::{start_scheduler_task, SchedulerConfig},
};

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub engine: Arc<Engine>,
    pub start_time: Instant,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "iptv_hub=info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Open the configured store; PostgreSQL is migrated before use
async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let pool = create_pool(config).await?;
            run_migrations(&pool).await?;
            tracing::info!("Store: PostgreSQL (migrations applied)");
            Ok(Arc::new(PgStore::new(pool)))
        }
        StoreBackend::Memory => {
            tracing::warn!("Store: in-memory, nothing survives a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env();
    tracing::info!("Starting IPTV Hub v{}", env!("CARGO_PKG_VERSION"));

    let store = open_store(&config).await?;
    let fetcher = Arc::new(HttpFetcher::new(
        &config.user_agent,
        config.fetch_timeout_ms,
        config.max_playlist_size_mb,
    )?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = Arc::new(
        Engine::new(store, fetcher, clock.clone(), config.epg_retention_hours)
            .with_file_sources(config.allow_file_sources),
    );
    if config.allow_file_sources {
        tracing::warn!("file:// sources enabled; API callers can read local files");
    }

    tokio::spawn(start_scheduler_task(
        engine.clone(),
        clock,
        SchedulerConfig::from_config(&config),
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = Arc::new(AppState {
        config,
        engine,
        start_time: Instant::now(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors);

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

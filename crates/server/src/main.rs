//! Stockroom server - order-taking HTTP service.
//!
//! # Architecture
//!
//! - Axum JSON API backed by a write-through product cache
//! - `PostgreSQL` (or an in-memory store for local runs) as the source of truth
//! - Sentry error tracking and `tracing` structured logs
//!
//! Migrations are NOT run on startup. Apply them with:
//! `cargo run -p stockroom-cli -- migrate`

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockroom_server::config::{ServerConfig, StoreBackend};
use stockroom_server::db::{self, InMemoryStore, OrderStore, PgStore, ProductStore, seed};
use stockroom_server::{AppState, app};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ServerConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry.dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry
                .environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry.sample_rate,
            traces_sample_rate: config.sentry.traces_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        tracing::Level::TRACE => sentry_tracing::EventFilter::Ignore,
    }
}

/// Open the configured store. Both traits are served by the same backend.
async fn open_store(config: &ServerConfig) -> (Arc<dyn ProductStore>, Arc<dyn OrderStore>) {
    match config.store {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_ref()
                .expect("STOCKROOM_DATABASE_URL is required for the postgres store");
            let pool = db::create_pool(url)
                .await
                .expect("Failed to create database pool");
            tracing::info!("Database pool created");

            let store = Arc::new(PgStore::new(pool));
            let products: Arc<dyn ProductStore> = store.clone();
            let orders: Arc<dyn OrderStore> = store;
            (products, orders)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on exit");
            let store = Arc::new(InMemoryStore::new());
            let products: Arc<dyn ProductStore> = store.clone();
            let orders: Arc<dyn OrderStore> = store;
            (products, orders)
        }
    }
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = ServerConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "stockroom_server=info,tower_http=debug".into());

    let json_layer = config
        .log_json
        .then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!config.log_json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let (products, orders) = open_store(&config).await;

    if config.seed_on_startup {
        seed::seed_if_empty(products.as_ref())
            .await
            .expect("Failed to seed catalog");
    }

    let state = AppState::new(config.inventory, products, orders);

    // Warm the cache; a failure here is retried lazily on first request
    if let Err(e) = state.cache().hydrate().await {
        tracing::warn!(error = %e, "Initial cache hydration failed");
    }

    let addr = config.socket_addr();
    tracing::info!("stockroom-server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

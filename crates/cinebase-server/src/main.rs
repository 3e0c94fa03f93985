//! Cinebase Server - Main entry point

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use cinebase_common::logging::{init_logging, LogConfig};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{signal, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tower_http::compression::CompressionLayer;
use tracing::{error, info, warn};

use cinebase_server::{
    config::Config,
    db, features,
    ingest::{backfill, Dispatcher, Services},
    middleware,
    notify::BroadcastNotifier,
    progress::PgProgressStore,
    queue::{runner::QueueRunner, PgJobQueue},
    sources::{ImdbEventClient, OmdbClient, TmdbClient, TmdbExportUniverse},
    store::PgMovieStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::new("cinebase-server")
        .with_directives("cinebase_server=debug,tower_http=debug,sqlx=warn")
        .overlay_env()?;
    init_logging(&log_config)?;

    info!("Starting Cinebase Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let pool = db::create_pool(&config.database).await?;

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

    info!("Database migrations completed");

    let notifier = BroadcastNotifier::new(config.server.event_capacity);
    let tmdb = Arc::new(TmdbClient::new(config.sources.tmdb.clone())?);
    let services = Services {
        queue: Arc::new(PgJobQueue::new(pool.clone())),
        progress: Arc::new(PgProgressStore::new(pool.clone())),
        store: Arc::new(PgMovieStore::new(pool.clone())),
        movies: tmdb.clone(),
        lists: tmdb,
        ratings: Arc::new(OmdbClient::new(config.sources.omdb.clone())?),
        ceremonies: Arc::new(ImdbEventClient::new(config.sources.events.clone())?),
        universe: Arc::new(TmdbExportUniverse::new(config.sources.export.clone())?),
        notifier: Arc::new(notifier.clone()),
        config: Arc::new(config.ingest.clone()),
    };

    let cancel = CancellationToken::new();
    let mut background: Vec<JoinHandle<()>> = Vec::new();

    if config.ingest.enabled {
        let runner = Arc::new(QueueRunner::new(
            services.queue.clone(),
            Arc::new(Dispatcher::new(services.clone())),
            config.ingest.runner_config(),
        ));
        background.extend(runner.spawn(cancel.clone()));
        info!("Job runner started");

        if let Some(interval) = config.ingest.backfill.health_check_interval() {
            background.push(spawn_backfill_health(services.clone(), interval, cancel.clone()));
        }
    } else {
        info!("Ingestion is disabled (INGEST_ENABLED=false), jobs will queue but not run");
    }

    let feature_state = features::FeatureState {
        services,
        events: notifier,
    };
    let app = create_router(feature_state, pool, &config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    // Executing jobs finish their current attempt; nothing new is claimed
    cancel.cancel();
    let drain = futures::future::join_all(background);
    if tokio::time::timeout(Duration::from_secs(config.server.shutdown_timeout_secs), drain)
        .await
        .is_err()
    {
        warn!("Background tasks did not stop in time");
    }

    info!("Server shut down gracefully");

    Ok(())
}

fn create_router(state: features::FeatureState, pool: sqlx::PgPool, config: &Config) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(pool)
        .nest("/api/v1", features::router(state))
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

async fn health_check(State(pool): State<sqlx::PgPool>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").execute(&pool).await {
        Ok(_) => (StatusCode::OK, Json(json!({"status": "healthy", "database": "connected"}))),
        Err(e) => {
            error!("Database health check failed: {:?}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unhealthy", "database": "unreachable"})),
            )
        },
    }
}

/// Periodically re-seed a running backfill whose job chain was lost.
fn spawn_backfill_health(services: Services, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match backfill::health_check(&services).await {
                        Ok(report) if report.repaired => info!(live_jobs = report.live_jobs, "Backfill re-seeded"),
                        Ok(_) => {},
                        Err(e) => error!(error = %e, "Backfill health check failed"),
                    }
                },
            }
        }
    })
}

async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    info!("Waiting up to {} seconds for connections to close", timeout_secs);
}

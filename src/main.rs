use axum::{extract::State, routing::get, Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rental_system::{config::Config, controllers, services::lifecycle::LifecycleService, AppState};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.app.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting car rental API ({})", config.app.environment);

    let app_state = AppState::new(config.clone()).await?;
    info!("Database and Redis connected");

    // --- Background tasks ---

    // Lifecycle sweep: start due rentals, close ended ones
    let sweep_state = app_state.clone();
    let sweep_interval = Duration::from_secs(config.fleet.sweep_interval_secs);
    task::spawn(async move {
        let lifecycle = LifecycleService::new(sweep_state);
        loop {
            let stats = lifecycle.get_sweep_stats().await;
            if stats.total_pending_transitions() > 0 {
                info!(
                    "Sweep backlog: {} pickups, {} returns",
                    stats.due_pickups, stats.due_returns
                );
            }
            lifecycle.run_status_sweep().await;
            tokio::time::sleep(sweep_interval).await;
        }
    });

    // --- Web server ---

    let app = Router::new()
        .route("/", get(|| async { "Car Rental API v1.0" }))
        .route("/health", get(health))
        .nest("/api", controllers::routes(app_state.clone()))
        .with_state(app_state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.app.port));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let database = state.db.ping().await;
    let redis = state.redis.ping().await;
    let status = if database && redis { "ok" } else { "degraded" };

    Json(serde_json::json!({
        "status": status,
        "database": database,
        "redis": redis,
    }))
}

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::{get, post, put};
use axum::Router;
use compose_module::GeminiClient;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

use crate::delivery::{DeliveryAdapter, DiscordDelivery};
use crate::scheduler::{Scheduler, SqliteTaskStore};

use super::config::ServiceConfig;
use super::handlers::{
    create_schedule, delete_schedule, generate, health, list_channels, list_schedules, send_now,
    update_schedule,
};
use super::state::AppState;
use super::BoxError;

pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/api/schedules", get(list_schedules))
        .route("/api/schedule", post(create_schedule))
        .route(
            "/api/schedule/:id",
            put(update_schedule).delete(delete_schedule),
        )
        .route("/api/channels", get(list_channels))
        .route("/api/send-now", post(send_now))
        .route("/api/generate", post(generate))
        .nest_service("/uploads", ServeDir::new(&config.uploads_dir))
        .with_state(state);

    if config.dashboard_dir.is_dir() {
        app = app.fallback_service(ServeDir::new(&config.dashboard_dir));
    } else {
        app = app.route("/", get(health));
    }

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .allow_origin(Any);

    app.layer(DefaultBodyLimit::max(config.upload_max_bytes))
        .layer(cors)
}

pub async fn run_server(
    config: ServiceConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), BoxError> {
    let config = Arc::new(config);
    std::fs::create_dir_all(&config.uploads_dir)?;

    let store = SqliteTaskStore::new(&config.schedules_db_path)?;

    let delivery: Arc<dyn DeliveryAdapter> = match &config.discord_bot_token {
        Some(token) => Arc::new(DiscordDelivery::connect(token, config.discord_guild_id).await?),
        None => {
            warn!("No DISCORD_TOKEN set; scheduled messages stay pending until a token is configured");
            Arc::new(DiscordDelivery::disconnected())
        }
    };
    let scheduler = Arc::new(
        Scheduler::new(store, delivery)
            .with_max_send_attempts(config.scheduler_max_send_attempts)
            .with_stale_claim_recovery(Some(config.stale_claim_after)),
    );
    let composer = config
        .compose
        .clone()
        .map(|compose| Arc::new(GeminiClient::new(compose)));
    match &composer {
        Some(client) => info!("/api/generate enabled with model {}", client.model()),
        None => info!("GEMINI_API_KEY not set; /api/generate is disabled"),
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let scheduler_loop = tokio::spawn(
        scheduler
            .clone()
            .run_loop(config.scheduler_poll_interval, stop_rx),
    );

    let state = AppState {
        config: config.clone(),
        scheduler,
        composer,
    };

    let host: IpAddr = config
        .host
        .parse()
        .map_err(|_| format!("invalid host: {}", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    info!("Dashboard running on http://{}", addr);

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;
    let _ = stop_tx.send(true);
    if let Err(err) = scheduler_loop.await {
        error!("scheduler loop join error: {}", err);
    }
    serve_result?;
    Ok(())
}

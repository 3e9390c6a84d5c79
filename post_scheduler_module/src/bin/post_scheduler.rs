use post_scheduler_module::service::{run_server, ServiceConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = ServiceConfig::from_env()?;
    info!(
        "post scheduler starting: db={} uploads={}",
        config.schedules_db_path.display(),
        config.uploads_dir.display()
    );

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for shutdown signal: {}", err);
        }
        info!("shutdown requested");
    };

    run_server(config, shutdown).await
}

use std::env;

use fedserve_gateway::config::CONFIG_PATH_ENV;
use fedserve_gateway::{Gateway, config_path, init_metrics, init_tracing, load_config};

#[tokio::main]
async fn main() {
    let path = config_path(env::args().skip(1), env::var(CONFIG_PATH_ENV).ok());
    let cfg = match load_config(Some(&path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error in {}: {e}", path.display());
            std::process::exit(2);
        }
    };

    let filter_source = init_tracing(&cfg.logging);
    tracing::info!(
        path = %path.display(),
        log_filter = ?filter_source,
        "Configuration loaded"
    );
    init_metrics();

    let gateway = match Gateway::start(cfg).await {
        Ok(g) => g,
        Err(e) => {
            tracing::error!(error = %e, "Gateway failed to start");
            std::process::exit(1);
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
    gateway.shutdown().await;
}

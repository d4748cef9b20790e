//! Placement REST server.
//!
//! Environment:
//! - `SOLAR_PLACEMENT_CONFIG`: optional TOML config file
//! - `HOST`, `PORT`: bind address (default 0.0.0.0:5000)
//! - `DETECTOR_ENDPOINT`, `GEMINI_API_KEY`, `DEFAULT_TIMEZONE`
//! - `RUST_LOG`: log filter (default `info`)

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use solar_placement::http::{create_router, AppState};
use solar_placement::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let config = Config::load().context("Failed to load configuration")?;

    let worker_threads = config.analysis.worker_threads;
    info!("Setting up Rayon thread pool with {} threads", worker_threads);
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(worker_threads)
        .build_global()
    {
        warn!("Failed to configure Rayon thread pool, using defaults: {}", e);
    }

    let state = AppState::from_config(&config).context("Failed to initialise services")?;
    if state.detectors.is_empty() {
        warn!("No detector endpoint configured; /analyze requires a detections field");
    } else {
        info!(labels = ?state.detectors.labels(), "Detectors configured");
    }
    if state.advisor.is_none() {
        warn!("GEMINI_API_KEY not set; /recommend is disabled");
    }
    if let Some(dir) = &state.export_dir {
        info!("Exporting analyses to {}", dir.display());
    }

    let app = create_router(state);

    let addr = config.socket_addr()?;
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! Time Study Timer - A state-managed timer service for process time studies
//!
//! This is the main entry point for the time-study-timer service.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use time_study_timer::{
    api::create_router,
    config::Config,
    services::HttpRemoteSync,
    state::AppState,
    tasks::event_log_task,
    utils::shutdown_signal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("time_study_timer={},tower_http=info", config.log_level()))
        .init();

    info!("Starting time-study-timer v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration: host={}, port={}, backend={}, timeout={}s",
        config.host, config.port, config.backend_url, config.remote_timeout().as_secs()
    );

    let remote = HttpRemoteSync::new(config.backend_url.clone(), config.remote_timeout())?;
    let state = Arc::new(AppState::new(
        Arc::new(remote),
        config.remote_timeout(),
        config.port,
        config.host.clone(),
    ));

    // Log session events in the background
    let log_state = Arc::clone(&state);
    tokio::spawn(async move {
        event_log_task(log_state).await;
    });

    let app = create_router(state);

    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  POST /studies/:id/open                  - Fetch a study and open its session");
    info!("  GET  /studies/:id                       - Session state");
    info!("  POST /studies/:id/start                 - Start the study and process timer");
    info!("  POST /studies/:id/stop                  - Stop the process timer and save");
    info!("  POST /studies/:id/reset                 - Reset the process timer locally");
    info!("  POST /studies/:id/scrap                 - Scrap the study");
    info!("  POST /studies/:id/steps/:step_id/start  - Start a step timer");
    info!("  POST /studies/:id/steps/:step_id/stop   - Stop and save a step timer");
    info!("  GET  /studies/:id/export.csv            - Export the study as CSV");
    info!("  GET  /status                            - Service status");
    info!("  GET  /health                            - Health check");

    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

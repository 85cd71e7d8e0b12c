use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use ride_dispatch::api;
use ride_dispatch::config::{Config, LogFormat};
use ride_dispatch::error::AppError;
use ride_dispatch::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;
    init_tracing(&config);

    let app_state = AppState::new(config.dispatch_settings(), config.event_buffer_size);
    match config.admin_token.as_deref() {
        Some(token) => {
            app_state.provision_admin(token);
        }
        None => tracing::warn!("ADMIN_TOKEN not set; driver verification is unavailable"),
    }
    let app = api::rest::router(Arc::new(app_state));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        search_radius_m = config.search_radius_m,
        "dispatch server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::new(config.log_level.clone());

    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init(),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}

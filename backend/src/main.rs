use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

// Use modules from the library crate
use greenlight_backend::config::Config;
use greenlight_backend::logging::init_subscriber;
use greenlight_backend::routes::api_routes;
use greenlight_backend::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_subscriber();

    tracing::info!("Starting Greenlight backend server...");

    let config = Config::load().context("failed to load configuration")?;
    let port = config.port;

    // Providers and the handler registry are wired here, before any request
    // is served; a missing credential or duplicate registration aborts.
    let app_state = AppState::new(config).context("failed to build application state")?;
    tracing::info!(
        operations = app_state.registry.len(),
        "orchestration layer initialized"
    );

    let app = Router::new()
        .merge(api_routes())
        .with_state(app_state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        );

    let addr: SocketAddr = format!("0.0.0.0:{port}")
        .parse()
        .context("invalid listen address")?;
    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

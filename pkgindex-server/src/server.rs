//! HTTP server setup and routing

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use pkgindex_core::db::{create_pool, run_migrations};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{auth::auth_middleware, config::Config, distutils, packages, state::AppState};

/// Build the router for `state`.
pub fn create_app(state: AppState) -> Router {
    let body_limit = state.config.max_upload_size_bytes();

    let publisher_routes = Router::new()
        .route("/packages/{package}/{version}/hide", post(packages::hide_release))
        .route(
            "/packages/{package}/{version}/unhide",
            post(packages::unhide_release),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/", get(distutils::index).post(distutils::action))
        .route("/pypi", get(distutils::index).post(distutils::action))
        .route("/pypi/", get(distutils::index).post(distutils::action))
        .route("/packages/{package}/document", get(packages::search_document))
        .route(
            "/packages/{package}/{version}/{filename}",
            get(packages::download_file),
        )
        .merge(publisher_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the index in `data_dir` and serve it on `host:port` until the
/// process is stopped.
pub async fn run_server(host: String, port: u16, data_dir: PathBuf, config: Config) -> Result<()> {
    std::fs::create_dir_all(&data_dir)?;
    let data_dir = std::fs::canonicalize(&data_dir)?;
    info!(data_dir = %data_dir.display(), "Using data directory");

    let pool = create_pool(&config.database_path(&data_dir)).await?;
    run_migrations(&pool).await?;
    info!("Migrations complete");

    if config.security.users.is_empty() {
        tracing::warn!("No users configured; uploads will be rejected");
    }

    let app = create_app(AppState::new(pool, config, data_dir));

    let addr: SocketAddr = format!("{}:{}", host, port).parse().map_err(|e| {
        error!(host = %host, port = %port, error = %e, "Invalid socket address");
        anyhow::anyhow!("Invalid socket address {}:{}: {}", host, port, e)
    })?;

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        error!(addr = %addr, error = %e, "Failed to bind to address");
        anyhow::anyhow!("Failed to bind to {}:{}: {}", host, port, e)
    })?;

    info!("Server listening on {}", addr);
    axum::serve(listener, app).await.map_err(|e| {
        error!(error = %e, "Server error");
        anyhow::anyhow!("Server error: {}", e)
    })?;

    Ok(())
}

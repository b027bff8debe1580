pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

use std::path::Path;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use relsync_core::config::Config;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let guarded = Router::new()
        .route(
            "/api/releases/{id}/errors",
            get(routes::releases::list_errors),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::require_api_token,
        ));

    Router::new()
        .route("/api/releases", get(routes::releases::list_releases))
        .route(
            "/api/releases/create",
            post(routes::releases::create_releases),
        )
        .route(
            "/api/releases/refresh",
            post(routes::releases::refresh_release),
        )
        .route(
            "/api/releases/modify",
            post(routes::releases::modify_release),
        )
        .route(
            "/api/releases/delete",
            post(routes::releases::delete_release),
        )
        .route("/api/webhook", post(routes::webhook::receive))
        .merge(guarded)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the server for the config found in `base`.
pub async fn serve(config: &Config, base: &Path, port: u16) -> anyhow::Result<()> {
    let app_state = AppState::from_config(config, base)?;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    serve_on(app_state, listener).await
}

/// Start the server on a pre-bound listener.
pub async fn serve_on(
    app_state: AppState,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let port = listener.local_addr()?.port();
    if app_state.webhook_secret.is_none() {
        tracing::warn!("no webhook secret set; webhook deliveries will be rejected");
    }
    if app_state.api_token.is_none() {
        tracing::warn!("no api token set; the error log route will reject every request");
    }
    let app = build_router(app_state);

    tracing::info!("relsync server listening on http://localhost:{port}");

    axum::serve(listener, app).await?;
    Ok(())
}

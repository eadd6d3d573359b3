pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

/// The full control API, mounted under `/api`.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/peers", get(handlers::handle_peers))
        .route("/peers/{name}/connect", post(handlers::handle_connect))
        .route("/publish", post(handlers::handle_publish))
        .route("/subscribe", post(handlers::handle_subscribe))
        .route("/teardown", post(handlers::handle_teardown))
        .route("/connections", get(handlers::handle_connections))
        .route("/connections/{id}", get(handlers::handle_connection_inspect))
        .route("/connections/{id}/cancel", post(handlers::handle_cancel))
        .route("/daemon/shutdown", post(handlers::handle_shutdown))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "API listening on 127.0.0.1");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

//! Read-only query API.
//!
//! Axum JSON server exposing the ledger, reflections, and performance
//! windows to external consumers (dashboards, CLIs). No mutation
//! endpoints — every write path stays inside the core.

pub mod routes;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

use routes::AppState;

/// Start the API server as a background task — it doesn't block.
pub fn spawn_api(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);

    tokio::spawn(async move {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        info!(port, "Query API starting on http://localhost:{port}");

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .expect("Failed to bind API port");

        axum::serve(listener, app)
            .await
            .expect("API server error");
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin("*".parse::<HeaderValue>().expect("static origin"))
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/ledger", get(routes::get_ledger))
        .route("/api/reflections", get(routes::get_reflections))
        .route("/api/windows", get(routes::get_windows))
        .route("/api/insights", get(routes::get_insights))
        .route("/api/improvements", get(routes::get_improvements))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

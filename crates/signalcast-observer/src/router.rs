//! Axum router construction for the dashboard server.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for cross-origin dashboard access.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the dashboard server.
///
/// The router includes:
/// - `GET /` -- minimal HTML status page
/// - `GET /ws` -- `WebSocket` traffic stream and command channel
/// - `GET /api/state` -- current traffic state
/// - `GET /api/logs` -- event log tail
/// - `GET /api/status` -- relay status
/// - `POST /api/command` -- command submission
///
/// CORS allows any origin; dashboards are served from elsewhere.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Status page
        .route("/", get(handlers::index))
        // WebSocket
        .route("/ws", get(ws::ws_stream))
        // REST API
        .route("/api/state", get(handlers::get_state))
        .route("/api/logs", get(handlers::get_logs))
        .route("/api/status", get(handlers::get_status))
        .route("/api/command", post(handlers::post_command))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! REST endpoint handlers for the dashboard server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/api/state` | Current traffic state as a wire payload |
//! | `GET` | `/api/logs` | Event log tail (`?limit=N`) |
//! | `GET` | `/api/status` | Relay status and broadcast counters |
//! | `POST` | `/api/command` | Submit a command, same routing as `WebSocket` |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use signalcast_core::hub::MessageOutcome;
use signalcast_types::TrafficPayload;

use crate::error::ObserverError;
use crate::state::AppState;

/// Default number of log lines for `GET /api/logs`.
const DEFAULT_LOG_LIMIT: usize = 10;

/// Query parameters for the `GET /api/logs` endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct LogsQuery {
    /// Maximum number of lines to return (default 10, capped at the log
    /// capacity).
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page showing relay status and API links.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.store.read();
    let road_a = snapshot.road_a_count;
    let road_b = snapshot.road_b_count;
    let signal = snapshot.current_signal;
    let time_left = snapshot.time_left;
    let sessions = state.hub.session_count();
    let uptime = state.uptime_secs();
    let ticks = state.stats.view().ticks;

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Signalcast Relay</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #58a6ff; margin-bottom: 0.25rem; }}
        .subtitle {{ color: #8b949e; margin-top: 0; }}
        .metric {{
            display: inline-block;
            background: #161b22;
            border: 1px solid #30363d;
            border-radius: 6px;
            padding: 1rem 1.5rem;
            margin: 0.5rem 0.5rem 0.5rem 0;
            min-width: 120px;
        }}
        .metric .label {{ color: #8b949e; font-size: 0.85rem; }}
        .metric .value {{ color: #58a6ff; font-size: 1.5rem; font-weight: bold; }}
        a {{ color: #58a6ff; text-decoration: none; }}
        ul {{ list-style: none; padding: 0; }}
        li {{ padding: 0.3rem 0; }}
        .status {{ color: #3fb950; font-weight: bold; }}
    </style>
</head>
<body>
    <h1>Signalcast Relay</h1>
    <p class="subtitle">Traffic telemetry stream</p>

    <p>Status: <span class="status">RUNNING</span></p>

    <div>
        <div class="metric"><div class="label">Road A</div><div class="value">{road_a}</div></div>
        <div class="metric"><div class="label">Road B</div><div class="value">{road_b}</div></div>
        <div class="metric"><div class="label">Green</div><div class="value">{signal}</div></div>
        <div class="metric"><div class="label">Time left</div><div class="value">{time_left}s</div></div>
        <div class="metric"><div class="label">Dashboards</div><div class="value">{sessions}</div></div>
        <div class="metric"><div class="label">Ticks</div><div class="value">{ticks}</div></div>
        <div class="metric"><div class="label">Uptime</div><div class="value">{uptime}s</div></div>
    </div>

    <h2>API Endpoints</h2>
    <ul>
        <li>GET <a href="/api/state">/api/state</a> -- Current traffic state</li>
        <li>GET <a href="/api/logs">/api/logs</a> -- Event log (?limit=N)</li>
        <li>GET <a href="/api/status">/api/status</a> -- Relay status</li>
        <li>POST /api/command -- Submit {{"command": "..."}}</li>
    </ul>

    <h2>WebSocket</h2>
    <ul>
        <li><code>ws://host:port/ws</code> -- Live traffic stream and command channel</li>
    </ul>
</body>
</html>"#
    ))
}

// ---------------------------------------------------------------------------
// GET /api/state -- current traffic state
// ---------------------------------------------------------------------------

/// Return the current state in wire payload form.
///
/// The camera frame is omitted and host metrics read 0; those are only
/// produced by the broadcast loop.
pub async fn get_state(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let snapshot = state.store.read();
    let mut payload = TrafficPayload::from_snapshot(&snapshot);
    payload.system_uptime = state.uptime_secs();
    payload.logs = state.logs.tail_rendered(state.log_tail);
    Ok(Json(serde_json::to_value(payload)?))
}

// ---------------------------------------------------------------------------
// GET /api/logs -- event log tail
// ---------------------------------------------------------------------------

/// Return the most recent log lines, oldest first.
pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogsQuery>,
) -> impl IntoResponse {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .min(state.logs.capacity());
    let logs = state.logs.tail_rendered(limit);

    Json(serde_json::json!({
        "count": logs.len(),
        "logs": logs,
    }))
}

// ---------------------------------------------------------------------------
// GET /api/status -- relay status
// ---------------------------------------------------------------------------

/// Report session and socket counts, broadcast counters, and uptime.
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.stats.view();
    Json(serde_json::json!({
        "status": "running",
        "uptime_seconds": state.uptime_secs(),
        "sessions": state.hub.session_count(),
        "sockets": state.open_sockets(),
        "ticks": stats.ticks,
        "failed_ticks": stats.failed_ticks,
        "last_delivered": stats.last_delivered,
        "log_entries": state.logs.len(),
    }))
}

// ---------------------------------------------------------------------------
// POST /api/command -- submit a command
// ---------------------------------------------------------------------------

/// Route a command exactly as if a dashboard had sent it over the
/// `WebSocket`. Accepts `{"command": "NAME"}` or a bare JSON string.
///
/// Recognised commands answer `202 Accepted`; unknown names are logged
/// and answer `200` with `accepted: false`.
pub async fn post_command(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<impl IntoResponse, ObserverError> {
    match state.hub.handle_message(None, &body) {
        MessageOutcome::Accepted { kind, forwarded } => Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "accepted": true,
                "command": kind,
                "forwarded": forwarded,
                "message": kind.describe(),
            })),
        )),
        MessageOutcome::Unrecognized(name) => Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "accepted": false,
                "command": name,
                "forwarded": false,
                "message": "Unrecognized command ignored",
            })),
        )),
        MessageOutcome::Malformed => Err(ObserverError::BadRequest(
            "expected {\"command\": \"NAME\"}".to_owned(),
        )),
    }
}

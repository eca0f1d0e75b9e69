//! Dashboard transport for the Signalcast relay.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws`) binding each dashboard to a
//!   [`ConnectionHub`] session: payloads flow out at broadcast cadence,
//!   commands flow back in
//! - **REST endpoints** for the current state, the event log, relay
//!   status, and command submission over plain HTTP
//! - **Minimal HTML status page** (`GET /`)
//!
//! # Architecture
//!
//! The server holds no state of its own. Every handler reads from the
//! shared [`AppState`], which points at the relay's store, log, hub, and
//! broadcast counters. Slow sockets only ever stall their own session
//! task; the hub decides when a session is too far behind to keep.
//!
//! [`ConnectionHub`]: signalcast_core::hub::ConnectionHub

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use startup::{ObserverHandle, spawn_observer};
pub use state::AppState;

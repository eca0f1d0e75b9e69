//! Shared type definitions for the Signalcast telemetry relay.
//!
//! This crate is the single source of truth for the traffic state held by
//! the relay and for the JSON payload pushed to dashboards. Wire types
//! flow downstream to `TypeScript` via `ts-rs` for the dashboard client.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrapper for observer sessions
//! - [`traffic`] -- Traffic state: roads, vehicle categories, history, snapshot
//! - [`command`] -- Observer-issued control commands
//! - [`payload`] -- The per-tick wire payload

pub mod command;
pub mod ids;
pub mod payload;
pub mod traffic;

// Re-export all public types at crate root for convenience.
pub use command::{Command, CommandKind};
pub use ids::SessionId;
pub use payload::TrafficPayload;
pub use traffic::{
    FrameRef, HISTORY_CAPACITY, HistoryEntry, Road, TrafficSnapshot, VehicleKind,
    VehicleTypeCounts,
};

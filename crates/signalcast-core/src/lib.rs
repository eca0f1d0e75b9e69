//! Relay core for the Signalcast traffic telemetry stream.
//!
//! The producer writes traffic state into a [`StateStore`]; a
//! [`BroadcastLoop`] turns that state into a JSON payload ten times a
//! second and fans it out through the [`ConnectionHub`] to every connected
//! dashboard. Dashboards send commands back through the hub, which routes
//! them to the producer over a bounded queue.
//!
//! # Modules
//!
//! - [`broadcast`] -- The periodic snapshot-and-publish task.
//! - [`commands`] -- Inbound command parsing and the producer command queue.
//! - [`config`] -- Configuration loading from `signalcast-config.yaml`.
//! - [`frame`] -- Camera frame encoding for the wire payload.
//! - [`hub`] -- Observer session registry and fan-out.
//! - [`logs`] -- Bounded event log shown on dashboards.
//! - [`metrics`] -- CPU and GPU utilisation sampling.
//! - [`producer`] -- The producer-facing update API.
//! - [`relay`] -- Assembly of the shared components.
//! - [`store`] -- The locked traffic snapshot.
//!
//! [`StateStore`]: store::StateStore
//! [`BroadcastLoop`]: broadcast::BroadcastLoop
//! [`ConnectionHub`]: hub::ConnectionHub

pub mod broadcast;
pub mod commands;
pub mod config;
pub mod frame;
pub mod hub;
pub mod logs;
pub mod metrics;
pub mod producer;
pub mod relay;
pub mod store;

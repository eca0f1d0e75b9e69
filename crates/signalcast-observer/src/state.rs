//! Shared application state for the dashboard server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use signalcast_core::broadcast::BroadcastStats;
use signalcast_core::hub::ConnectionHub;
use signalcast_core::logs::LogRing;
use signalcast_core::relay::Relay;
use signalcast_core::store::StateStore;

/// Handles to the relay components the HTTP layer reads.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Traffic state.
    pub store: Arc<StateStore>,
    /// Event log.
    pub logs: Arc<LogRing>,
    /// Observer sessions and command routing.
    pub hub: Arc<ConnectionHub>,
    /// Broadcast loop counters.
    pub stats: Arc<BroadcastStats>,
    /// Relay start time.
    pub started: Instant,
    /// Log lines included in state responses.
    pub log_tail: usize,
    /// Longest a single socket write may take before the connection is
    /// dropped.
    pub send_timeout: Duration,
    /// Live `WebSocket` tasks, including ones the hub has already evicted
    /// but which have not yet shut their socket.
    pub open_sockets: Arc<AtomicUsize>,
}

impl AppState {
    /// Point the HTTP layer at `relay`'s components.
    pub fn from_relay(relay: &Relay) -> Self {
        Self {
            store: Arc::clone(relay.store()),
            logs: Arc::clone(relay.logs()),
            hub: Arc::clone(relay.hub()),
            stats: Arc::clone(relay.stats()),
            started: relay.started(),
            log_tail: relay.config().broadcast.log_tail,
            send_timeout: relay.config().hub.send_timeout(),
            open_sockets: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of `WebSocket` connections still held open.
    pub fn open_sockets(&self) -> usize {
        self.open_sockets.load(Ordering::Relaxed)
    }

    /// Whole seconds since the relay started.
    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

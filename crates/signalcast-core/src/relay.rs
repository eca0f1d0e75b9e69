//! Assembly of the shared relay components.
//!
//! [`Relay`] owns one of each shared component and hands out handles. The
//! binary builds a relay, spawns its broadcast loop and transport, and
//! gives the [`Producer`] and [`CommandReceiver`] to the detection side.

use std::sync::Arc;
use std::time::Instant;

use crate::broadcast::{BroadcastLoop, BroadcastParts, BroadcastStats};
use crate::commands::{CommandReceiver, command_channel};
use crate::config::RelayConfig;
use crate::frame::Base64FrameEncoder;
use crate::hub::ConnectionHub;
use crate::logs::LogRing;
use crate::metrics::MetricsSampler;
use crate::producer::Producer;
use crate::store::StateStore;

/// The relay's shared state and its wiring.
#[derive(Debug, Clone)]
pub struct Relay {
    store: Arc<StateStore>,
    logs: Arc<LogRing>,
    hub: Arc<ConnectionHub>,
    stats: Arc<BroadcastStats>,
    started: Instant,
    config: Arc<RelayConfig>,
}

impl Relay {
    /// Build every shared component from `config`.
    ///
    /// Returns the relay together with the receiving end of the command
    /// queue, which belongs to the producer.
    pub fn new(config: RelayConfig) -> (Self, CommandReceiver) {
        let store = Arc::new(StateStore::new());
        let logs = Arc::new(LogRing::new());
        let (commands, receiver) = command_channel(config.commands.capacity);
        let hub = Arc::new(ConnectionHub::new(
            Arc::clone(&store),
            Arc::clone(&logs),
            commands,
            &config.hub,
        ));

        let relay = Self {
            store,
            logs,
            hub,
            stats: Arc::new(BroadcastStats::default()),
            started: Instant::now(),
            config: Arc::new(config),
        };
        (relay, receiver)
    }

    /// A producer handle over this relay's state.
    pub fn producer(&self) -> Producer {
        Producer::new(Arc::clone(&self.store), Arc::clone(&self.logs))
    }

    /// Build the broadcast loop, sampling metrics from `sampler`.
    pub fn broadcast_loop(&self, sampler: Arc<dyn MetricsSampler>) -> BroadcastLoop {
        BroadcastLoop::new(
            BroadcastParts {
                store: Arc::clone(&self.store),
                logs: Arc::clone(&self.logs),
                hub: Arc::clone(&self.hub),
                sampler,
                encoder: Arc::new(Base64FrameEncoder::new(self.config.frames.max_frame_bytes)),
                stats: Arc::clone(&self.stats),
                started: self.started,
            },
            self.config.broadcast.clone(),
        )
    }

    /// Disconnect every observer.
    pub fn shutdown(&self) {
        self.hub.close_all();
    }

    /// Traffic state.
    pub const fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Event log.
    pub const fn logs(&self) -> &Arc<LogRing> {
        &self.logs
    }

    /// Observer registry.
    pub const fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    /// Broadcast counters.
    pub const fn stats(&self) -> &Arc<BroadcastStats> {
        &self.stats
    }

    /// When the relay was built.
    pub const fn started(&self) -> Instant {
        self.started
    }

    /// The configuration the relay was built with.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use signalcast_types::{CommandKind, Road};

    use super::*;
    use crate::metrics::FixedSampler;

    #[tokio::test]
    async fn producer_updates_reach_observers() {
        let (relay, _commands) = Relay::new(RelayConfig::default());
        let mut session = relay.hub().connect();
        relay.producer().update_state(6, 2, Road::A, 7, None);

        let report = relay
            .broadcast_loop(Arc::new(FixedSampler::default()))
            .tick()
            .await
            .unwrap();
        assert_eq!(report.delivered, 1);

        let raw = session.rx.recv().await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json.get("roadA").and_then(serde_json::Value::as_i64), Some(6));
        assert_eq!(json.get("framesProcessed").and_then(serde_json::Value::as_u64), Some(1));
    }

    #[tokio::test]
    async fn observer_commands_reach_producer() {
        let (relay, mut commands) = Relay::new(RelayConfig::default());
        let session = relay.hub().connect();
        let _ = relay
            .hub()
            .handle_message(Some(session.id), r#"{"command":"FORCE_GREEN_B"}"#);
        assert_eq!(commands.recv().await.unwrap().kind, CommandKind::ForceGreenB);
    }

    #[tokio::test]
    async fn reconnecting_keeps_global_history_and_logs() {
        let (relay, _commands) = Relay::new(RelayConfig::default());
        let broadcast = relay.broadcast_loop(Arc::new(FixedSampler::default()));
        relay.producer().update_state_at("08:00", 3, 4, Road::A, 9, None);

        let first = relay.hub().connect();
        let _ = broadcast.tick_at("08:00").await.unwrap();
        assert!(relay.hub().disconnect(first.id));
        let history_before = relay.store().read().vehicle_history;
        let logs_before = relay.logs().len();

        let _second = relay.hub().connect();
        let _ = broadcast.tick_at("08:00").await.unwrap();

        assert_eq!(relay.store().read().vehicle_history, history_before);
        assert_eq!(relay.logs().len(), logs_before.saturating_add(1));
        let last = relay.logs().tail(1);
        assert_eq!(last.first().unwrap().message, "Dashboard connected");
    }

    #[test]
    fn shutdown_closes_sessions() {
        let (relay, _commands) = Relay::new(RelayConfig::default());
        let _a = relay.hub().connect();
        let _b = relay.hub().connect();
        relay.shutdown();
        assert_eq!(relay.hub().session_count(), 0);
    }
}

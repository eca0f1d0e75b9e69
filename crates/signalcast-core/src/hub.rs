//! Observer session registry, payload fan-out, and inbound command routing.
//!
//! Each session owns a small bounded queue. The transport task for a
//! session drains its queue onto the socket; [`ConnectionHub::publish`]
//! only ever pushes into queues. A session whose queue stays full for the
//! send timeout is considered unresponsive and is dropped from the
//! registry, which closes its queue and lets the transport task shut the
//! socket. One slow observer therefore costs the others at most one
//! timeout, and only on the tick where it is evicted.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use signalcast_types::{Command, CommandKind, SessionId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, trace, warn};

use crate::commands::{CommandSender, parse_command_name};
use crate::config::HubConfig;
use crate::logs::LogRing;
use crate::store::StateStore;

/// A serialized payload shared by every session's queue.
pub type Payload = Arc<str>;

/// Outcome of one [`ConnectionHub::publish`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishReport {
    /// Sessions that accepted the payload.
    pub delivered: usize,
    /// Sessions evicted during this publish.
    pub evicted: usize,
}

/// What the hub did with an inbound observer message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// A recognised command. `forwarded` is false when the producer's
    /// queue could not take it.
    Accepted {
        /// The command.
        kind: CommandKind,
        /// Whether it reached the command queue.
        forwarded: bool,
    },
    /// A well-formed message naming an unknown command.
    Unrecognized(String),
    /// The message could not be decoded.
    Malformed,
}

/// The receiving half of a session, handed to the transport task.
#[derive(Debug)]
pub struct SessionHandle {
    /// Identifier to pass back on disconnect and inbound messages.
    pub id: SessionId,
    /// Payloads queued for this session. Yields `None` once the hub has
    /// dropped the session.
    pub rx: mpsc::Receiver<Payload>,
}

/// Tracks connected observers and routes traffic in both directions.
#[derive(Debug)]
pub struct ConnectionHub {
    sessions: Mutex<BTreeMap<SessionId, mpsc::Sender<Payload>>>,
    store: Arc<StateStore>,
    logs: Arc<LogRing>,
    commands: CommandSender,
    send_timeout: Duration,
    session_buffer: usize,
}

impl ConnectionHub {
    /// Create a hub with no sessions.
    pub fn new(
        store: Arc<StateStore>,
        logs: Arc<LogRing>,
        commands: CommandSender,
        config: &HubConfig,
    ) -> Self {
        Self {
            sessions: Mutex::new(BTreeMap::new()),
            store,
            logs,
            commands,
            send_timeout: config.send_timeout(),
            session_buffer: config.session_buffer.max(1),
        }
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// Register a new observer session.
    pub fn connect(&self) -> SessionHandle {
        let id = SessionId::new();
        let (tx, rx) = mpsc::channel(self.session_buffer);
        self.lock_sessions().insert(id, tx);
        debug!(session = %id, "observer session registered");
        self.logs.append("Dashboard connected");
        SessionHandle { id, rx }
    }

    /// Remove a session. Returns `false` if it was already gone, in which
    /// case nothing is logged.
    pub fn disconnect(&self, id: SessionId) -> bool {
        let removed = self.lock_sessions().remove(&id).is_some();
        if removed {
            debug!(session = %id, "observer session removed");
            self.logs.append("Dashboard disconnected");
        }
        removed
    }

    /// Drop every session. Transport tasks observe their queue closing
    /// and shut their sockets.
    pub fn close_all(&self) {
        let closed = std::mem::take(&mut *self.lock_sessions());
        if !closed.is_empty() {
            debug!(sessions = closed.len(), "closing all observer sessions");
        }
    }

    /// Number of connected sessions.
    pub fn session_count(&self) -> usize {
        self.lock_sessions().len()
    }

    /// Whether `id` is currently registered.
    pub fn is_connected(&self, id: SessionId) -> bool {
        self.lock_sessions().contains_key(&id)
    }

    fn lock_sessions(
        &self,
    ) -> std::sync::MutexGuard<'_, BTreeMap<SessionId, mpsc::Sender<Payload>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Fan-out
    // -----------------------------------------------------------------------

    /// Offer `payload` to every session concurrently.
    ///
    /// Each session gets at most the send timeout to make room in its
    /// queue. Sessions that time out or whose transport has gone away are
    /// evicted. Never fails.
    pub async fn publish(&self, payload: Payload) -> PublishReport {
        let targets: Vec<(SessionId, mpsc::Sender<Payload>)> = self
            .lock_sessions()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        if targets.is_empty() {
            return PublishReport::default();
        }

        let timeout = self.send_timeout;
        let sends = targets.iter().map(|(id, tx)| {
            let payload = Arc::clone(&payload);
            async move { (*id, tx.send_timeout(payload, timeout).await) }
        });
        let results = join_all(sends).await;

        let mut report = PublishReport::default();
        for (id, result) in results {
            match result {
                Ok(()) => report.delivered = report.delivered.saturating_add(1),
                Err(SendTimeoutError::Timeout(_)) => {
                    warn!(session = %id, timeout_ms = timeout.as_millis(), "observer unresponsive, disconnecting");
                    if self.evict(id, "Dashboard disconnected (unresponsive)") {
                        report.evicted = report.evicted.saturating_add(1);
                    }
                }
                Err(SendTimeoutError::Closed(_)) => {
                    if self.evict(id, "Dashboard disconnected") {
                        report.evicted = report.evicted.saturating_add(1);
                    }
                }
            }
        }

        trace!(delivered = report.delivered, evicted = report.evicted, "payload published");
        report
    }

    fn evict(&self, id: SessionId, message: &str) -> bool {
        let removed = self.lock_sessions().remove(&id).is_some();
        if removed {
            self.logs.append(message);
        }
        removed
    }

    // -----------------------------------------------------------------------
    // Inbound commands
    // -----------------------------------------------------------------------

    /// Decode and act on a raw message from `session`.
    ///
    /// Malformed messages are logged and dropped.
    pub fn handle_message(&self, session: Option<SessionId>, raw: &str) -> MessageOutcome {
        match parse_command_name(raw) {
            Ok(name) => self.dispatch(session, &name),
            Err(e) => {
                warn!(session = ?session, error = %e, "dropping malformed observer message");
                MessageOutcome::Malformed
            }
        }
    }

    /// Act on a command by name.
    ///
    /// Every named command is logged. Recognised commands are forwarded to
    /// the producer; `TRIGGER_EMERGENCY` also bumps the override counter.
    pub fn dispatch(&self, session: Option<SessionId>, name: &str) -> MessageOutcome {
        debug!(session = ?session, command = name, "command received");
        self.logs.append(format!("Command received: {name}"));

        let Some(kind) = CommandKind::from_name(name) else {
            warn!(session = ?session, command = name, "unrecognised command ignored");
            return MessageOutcome::Unrecognized(name.to_owned());
        };

        self.logs.append(kind.describe());
        if kind == CommandKind::TriggerEmergency {
            let total = self.store.increment_emergency_overrides();
            debug!(total, "emergency override counted");
        }

        let forwarded = match self.commands.forward(Command::now(kind)) {
            Ok(()) => true,
            Err(e) => {
                warn!(command = %kind, error = %e, "command not forwarded to producer");
                false
            }
        };

        MessageOutcome::Accepted { kind, forwarded }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::commands::{CommandReceiver, command_channel};

    fn make_hub(send_timeout_ms: u64, session_buffer: usize) -> (ConnectionHub, CommandReceiver) {
        let (tx, rx) = command_channel(8);
        let config = HubConfig {
            send_timeout_ms,
            session_buffer,
        };
        let hub = ConnectionHub::new(
            Arc::new(StateStore::new()),
            Arc::new(LogRing::new()),
            tx,
            &config,
        );
        (hub, rx)
    }

    fn log_messages(hub: &ConnectionHub) -> Vec<String> {
        hub.logs.tail(50).into_iter().map(|e| e.message).collect()
    }

    #[test]
    fn connect_and_disconnect_are_logged_once() {
        let (hub, _rx) = make_hub(50, 2);
        let session = hub.connect();
        assert_eq!(hub.session_count(), 1);
        assert!(hub.disconnect(session.id));
        assert!(!hub.disconnect(session.id));
        assert_eq!(hub.session_count(), 0);
        assert_eq!(
            log_messages(&hub),
            vec!["Dashboard connected", "Dashboard disconnected"]
        );
    }

    #[test]
    fn emergency_command_counts_once_and_logs_once() {
        let (hub, mut rx) = make_hub(50, 2);
        let outcome = hub.handle_message(None, r#"{"command":"TRIGGER_EMERGENCY"}"#);
        assert_eq!(
            outcome,
            MessageOutcome::Accepted {
                kind: CommandKind::TriggerEmergency,
                forwarded: true
            }
        );
        assert_eq!(hub.store.read().emergency_overrides, 1);
        let emergency_lines = log_messages(&hub)
            .into_iter()
            .filter(|m| m.contains("Emergency"))
            .count();
        assert_eq!(emergency_lines, 1);
        assert_eq!(rx.try_recv().unwrap().kind, CommandKind::TriggerEmergency);
    }

    #[test]
    fn other_commands_only_forward() {
        let (hub, mut rx) = make_hub(50, 2);
        for kind in [CommandKind::ForceGreenA, CommandKind::Pause, CommandKind::Reset] {
            let raw = format!(r#"{{"command":"{kind}"}}"#);
            let _ = hub.handle_message(None, &raw);
            assert_eq!(rx.try_recv().unwrap().kind, kind);
        }
        assert_eq!(hub.store.read(), signalcast_types::TrafficSnapshot::default());
        assert!(log_messages(&hub).contains(&"Forcing Road A to GREEN".to_owned()));
    }

    #[test]
    fn unknown_command_is_logged_not_forwarded() {
        let (hub, mut rx) = make_hub(50, 2);
        let outcome = hub.handle_message(None, r#"{"command":"DANCE"}"#);
        assert_eq!(outcome, MessageOutcome::Unrecognized("DANCE".to_owned()));
        assert!(rx.try_recv().is_none());
        assert_eq!(log_messages(&hub), vec!["Command received: DANCE"]);
    }

    #[test]
    fn malformed_message_is_dropped_silently() {
        let (hub, mut rx) = make_hub(50, 2);
        assert_eq!(hub.handle_message(None, "{oops"), MessageOutcome::Malformed);
        assert!(rx.try_recv().is_none());
        assert!(log_messages(&hub).is_empty());
    }

    #[test]
    fn full_command_queue_still_counts_emergency() {
        let (tx, _rx) = command_channel(1);
        let hub = ConnectionHub::new(
            Arc::new(StateStore::new()),
            Arc::new(LogRing::new()),
            tx,
            &HubConfig::default(),
        );
        let _ = hub.dispatch(None, "PAUSE");
        let outcome = hub.dispatch(None, "TRIGGER_EMERGENCY");
        assert_eq!(
            outcome,
            MessageOutcome::Accepted {
                kind: CommandKind::TriggerEmergency,
                forwarded: false
            }
        );
        assert_eq!(hub.store.read().emergency_overrides, 1);
    }

    #[tokio::test]
    async fn publish_with_no_sessions_is_a_no_op() {
        let (hub, _rx) = make_hub(50, 2);
        assert_eq!(hub.publish(Arc::from("{}")).await, PublishReport::default());
    }

    #[tokio::test]
    async fn unresponsive_session_is_evicted_without_blocking_others() {
        let (hub, _rx) = make_hub(100, 1);
        let mut sessions: Vec<SessionHandle> = (0..5).map(|_| hub.connect()).collect();
        let stuck_id = sessions.first().unwrap().id;

        // First publish fills every single-slot queue.
        let report = hub.publish(Arc::from("tick-1")).await;
        assert_eq!(report.delivered, 5);

        // Four observers keep up; the first never reads.
        for session in sessions.iter_mut().skip(1) {
            assert_eq!(session.rx.recv().await.as_deref(), Some("tick-1"));
        }

        let started = Instant::now();
        let report = hub.publish(Arc::from("tick-2")).await;
        let elapsed = started.elapsed();

        assert_eq!(report.delivered, 4);
        assert_eq!(report.evicted, 1);
        assert!(elapsed < Duration::from_millis(1000), "publish took {elapsed:?}");
        assert!(!hub.is_connected(stuck_id));
        assert_eq!(hub.session_count(), 4);
        for session in sessions.iter_mut().skip(1) {
            assert_eq!(session.rx.recv().await.as_deref(), Some("tick-2"));
        }

        // The evicted session's queue is closed after its backlog.
        let stuck = sessions.first_mut().unwrap();
        assert_eq!(stuck.rx.recv().await.as_deref(), Some("tick-1"));
        assert!(stuck.rx.recv().await.is_none());
        assert!(log_messages(&hub).contains(&"Dashboard disconnected (unresponsive)".to_owned()));
    }

    #[tokio::test]
    async fn dropped_transport_is_evicted_on_next_publish() {
        let (hub, _rx) = make_hub(50, 2);
        let kept = hub.connect();
        let gone = hub.connect();
        let gone_id = gone.id;
        drop(gone);

        let report = hub.publish(Arc::from("x")).await;
        assert_eq!(report, PublishReport { delivered: 1, evicted: 1 });
        assert!(hub.is_connected(kept.id));
        assert!(!hub.is_connected(gone_id));
    }

    #[tokio::test]
    async fn close_all_ends_every_session_queue() {
        let (hub, _rx) = make_hub(50, 2);
        let mut a = hub.connect();
        let mut b = hub.connect();
        hub.close_all();
        assert_eq!(hub.session_count(), 0);
        assert!(a.rx.recv().await.is_none());
        assert!(b.rx.recv().await.is_none());
    }
}

//! Live `WebSocket` round trips against a loopback dashboard server.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, Stream, StreamExt};
use serde_json::Value;
use signalcast_core::config::RelayConfig;
use signalcast_core::metrics::{FixedSampler, SystemMetrics};
use signalcast_core::relay::Relay;
use signalcast_observer::server::ServerConfig;
use signalcast_observer::startup::spawn_observer;
use signalcast_observer::state::AppState;
use signalcast_types::{CommandKind, FrameRef, Road};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

fn loopback() -> ServerConfig {
    ServerConfig {
        host: String::from("127.0.0.1"),
        port: 0,
    }
}

async fn next_payload<S>(stream: &mut S) -> Value
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn wait_for_sessions(relay: &Relay, expected: usize) {
    timeout(WAIT, async {
        while relay.hub().session_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_stream_and_command_round_trip() {
    let (relay, mut commands) = Relay::new(RelayConfig::default());
    relay.producer().update_state(12, 4, Road::A, 8, None);

    let shutdown = CancellationToken::new();
    let sampler = Arc::new(FixedSampler(SystemMetrics {
        cpu_percent: 33,
        gpu_percent: 0,
    }));
    let broadcast = tokio::spawn(relay.broadcast_loop(sampler).run(shutdown.clone()));
    let server = spawn_observer(
        &loopback(),
        Arc::new(AppState::from_relay(&relay)),
        shutdown.clone(),
    )
    .await
    .unwrap();

    let (mut socket, _) = connect_async(format!("ws://{}/ws", server.addr))
        .await
        .unwrap();

    let payload = next_payload(&mut socket).await;
    assert_eq!(payload["roadA"], 12);
    assert_eq!(payload["currentSignal"], "A");
    assert_eq!(payload["cpuUsage"], 33);

    socket
        .send(Message::Text(r#"{"command":"TRIGGER_EMERGENCY"}"#.to_owned().into()))
        .await
        .unwrap();
    let command = timeout(WAIT, commands.recv()).await.unwrap().unwrap();
    assert_eq!(command.kind, CommandKind::TriggerEmergency);

    // The counter shows up in a later payload.
    let mut overrides = 0;
    for _ in 0..20 {
        let payload = next_payload(&mut socket).await;
        overrides = payload["emergencyOverrides"].as_u64().unwrap();
        if overrides == 1 {
            break;
        }
    }
    assert_eq!(overrides, 1);

    socket.close(None).await.unwrap();
    wait_for_sessions(&relay, 0).await;
    let messages: Vec<String> = relay.logs().tail(50).into_iter().map(|e| e.message).collect();
    assert!(messages.contains(&"Dashboard connected".to_owned()));
    assert!(messages.contains(&"Dashboard disconnected".to_owned()));

    shutdown.cancel();
    relay.shutdown();
    timeout(WAIT, broadcast).await.unwrap().unwrap();
    timeout(WAIT, server.task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_open_sockets() {
    let (relay, _commands) = Relay::new(RelayConfig::default());
    let shutdown = CancellationToken::new();
    let server = spawn_observer(
        &loopback(),
        Arc::new(AppState::from_relay(&relay)),
        shutdown.clone(),
    )
    .await
    .unwrap();

    let (mut socket, _) = connect_async(format!("ws://{}/ws", server.addr))
        .await
        .unwrap();
    wait_for_sessions(&relay, 1).await;

    shutdown.cancel();
    relay.shutdown();

    // The session task sends a close frame once the hub drops it.
    let closed = timeout(WAIT, async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    timeout(WAIT, server.task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_client_that_stops_reading_is_dropped() {
    let (relay, _commands) = Relay::new(RelayConfig::default());
    // Large frames fill the socket buffers within a few ticks.
    relay
        .producer()
        .update_state(3, 2, Road::B, 6, Some(FrameRef::from(vec![7_u8; 2_000_000])));

    let shutdown = CancellationToken::new();
    let sampler = Arc::new(FixedSampler(SystemMetrics::default()));
    let broadcast = tokio::spawn(relay.broadcast_loop(sampler).run(shutdown.clone()));
    let state = Arc::new(AppState::from_relay(&relay));
    let server = spawn_observer(&loopback(), Arc::clone(&state), shutdown.clone())
        .await
        .unwrap();

    // Connect and never read.
    let (mut socket, _) = connect_async(format!("ws://{}/ws", server.addr))
        .await
        .unwrap();
    wait_for_sessions(&relay, 1).await;

    timeout(Duration::from_secs(20), async {
        while state.open_sockets() != 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(relay.hub().session_count(), 0);
    let messages: Vec<String> = relay.logs().tail(50).into_iter().map(|e| e.message).collect();
    assert!(messages.iter().any(|m| m.starts_with("Dashboard disconnected")));

    // Whatever was buffered drains, then the stream ends.
    let ended = timeout(Duration::from_secs(20), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok());

    shutdown.cancel();
    relay.shutdown();
    timeout(WAIT, broadcast).await.unwrap().unwrap();
    timeout(WAIT, server.task).await.unwrap().unwrap();
}

//! One-way queue carrying observer commands toward the producer.
//!
//! The queue is bounded. When the producer falls behind, new commands are
//! rejected at the relay rather than buffered without limit; the hub logs
//! the rejection and carries on.

use serde::Deserialize;
use signalcast_types::Command;
use tokio::sync::mpsc;

/// Errors from decoding an inbound observer message.
#[derive(Debug, thiserror::Error)]
pub enum CommandParseError {
    /// The message was not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The JSON object had no string `command` field.
    #[error("missing \"command\" field")]
    MissingCommand,
}

/// Errors from forwarding a command to the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ForwardError {
    /// The queue is at capacity.
    #[error("command queue full")]
    Full,

    /// The producer dropped its receiver.
    #[error("command receiver closed")]
    Closed,
}

/// Inbound wire shape: either `{"command": "..."}` or a bare JSON string.
#[derive(Deserialize)]
#[serde(untagged)]
enum Inbound {
    Object { command: Option<serde_json::Value> },
    Bare(String),
}

/// Extract the command name from a raw observer message.
///
/// Unrecognised names are returned as-is; deciding what they mean is the
/// caller's concern.
///
/// # Errors
///
/// Returns [`CommandParseError::Json`] for non-JSON input and
/// [`CommandParseError::MissingCommand`] when no string command is present.
pub fn parse_command_name(raw: &str) -> Result<String, CommandParseError> {
    match serde_json::from_str::<Inbound>(raw)? {
        Inbound::Object {
            command: Some(serde_json::Value::String(name)),
        } => Ok(name.trim().to_owned()),
        Inbound::Object { .. } => Err(CommandParseError::MissingCommand),
        Inbound::Bare(name) => Ok(name.trim().to_owned()),
    }
}

/// Create a bounded command channel. A capacity of zero is raised to one.
pub fn command_channel(capacity: usize) -> (CommandSender, CommandReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (CommandSender { tx }, CommandReceiver { rx })
}

/// Relay-side handle that enqueues commands.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<Command>,
}

impl CommandSender {
    /// Enqueue without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`ForwardError::Full`] when the producer is behind, or
    /// [`ForwardError::Closed`] when nothing is consuming commands.
    pub fn forward(&self, command: Command) -> Result<(), ForwardError> {
        self.tx.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ForwardError::Full,
            mpsc::error::TrySendError::Closed(_) => ForwardError::Closed,
        })
    }
}

/// Producer-side handle that drains commands.
#[derive(Debug)]
pub struct CommandReceiver {
    rx: mpsc::Receiver<Command>,
}

impl CommandReceiver {
    /// Wait for the next command. Returns `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Command> {
        self.rx.recv().await
    }

    /// Take a command if one is queued.
    pub fn try_recv(&mut self) -> Option<Command> {
        self.rx.try_recv().ok()
    }

    /// Blocking receive for producers running on a plain thread.
    ///
    /// Must not be called from inside an async runtime.
    pub fn blocking_recv(&mut self) -> Option<Command> {
        self.rx.blocking_recv()
    }
}

//! Observer-issued control commands.
//!
//! Dashboards send `{"command": "<NAME>"}`. Recognised names map to a
//! [`CommandKind`]; the relay forwards them to the producer as a
//! timestamped [`Command`]. The relay itself only acts on
//! [`CommandKind::TriggerEmergency`] (by counting it); every other effect
//! is the producer's policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A recognised control command name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum CommandKind {
    /// Give right-of-way to road A.
    ForceGreenA,
    /// Give right-of-way to road B.
    ForceGreenB,
    /// Emergency vehicle override.
    TriggerEmergency,
    /// Reset the controller.
    Reset,
    /// Pause the controller.
    Pause,
    /// Resume a paused controller.
    Resume,
}

impl CommandKind {
    /// All recognised commands.
    pub const ALL: [Self; 6] = [
        Self::ForceGreenA,
        Self::ForceGreenB,
        Self::TriggerEmergency,
        Self::Reset,
        Self::Pause,
        Self::Resume,
    ];

    /// Wire name of the command.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ForceGreenA => "FORCE_GREEN_A",
            Self::ForceGreenB => "FORCE_GREEN_B",
            Self::TriggerEmergency => "TRIGGER_EMERGENCY",
            Self::Reset => "RESET",
            Self::Pause => "PAUSE",
            Self::Resume => "RESUME",
        }
    }

    /// Look up a command by its exact wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Human-readable log line describing the command's intent.
    pub const fn describe(self) -> &'static str {
        match self {
            Self::ForceGreenA => "Forcing Road A to GREEN",
            Self::ForceGreenB => "Forcing Road B to GREEN",
            Self::TriggerEmergency => "Emergency override triggered",
            Self::Reset => "System reset initiated",
            Self::Pause => "System paused",
            Self::Resume => "System resumed",
        }
    }
}

impl core::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command forwarded to the producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Which command was issued.
    pub kind: CommandKind,
    /// When the relay received it.
    pub issued_at: DateTime<Utc>,
}

impl Command {
    /// Stamp `kind` with the current time.
    pub fn now(kind: CommandKind) -> Self {
        Self {
            kind,
            issued_at: Utc::now(),
        }
    }
}

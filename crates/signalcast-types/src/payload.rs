//! The JSON payload pushed to every observer once per broadcast tick.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::traffic::{HistoryEntry, Road, TrafficSnapshot, VehicleTypeCounts};

/// Per-tick wire payload.
///
/// Field names are `camelCase` on the wire to match the dashboard's
/// `TrafficData` interface. Counters export as `number` since JSON carries
/// them as plain numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct TrafficPayload {
    /// Vehicles on road A.
    #[ts(type = "number")]
    pub road_a: i64,
    /// Vehicles on road B.
    #[ts(type = "number")]
    pub road_b: i64,
    /// Road currently holding right-of-way.
    pub current_signal: Road,
    /// Seconds left in the current phase.
    #[ts(type = "number")]
    pub time_left: i64,
    /// Whole seconds since the relay started.
    #[ts(type = "number")]
    pub system_uptime: u64,
    /// Host CPU utilisation, 0-100.
    pub cpu_usage: u8,
    /// GPU utilisation, 0-100 (0 when unavailable).
    pub gpu_usage: u8,
    /// Detector frame rate, rounded.
    pub fps: u32,
    /// Average frame time in milliseconds, rounded.
    pub avg_frame_time: u32,
    /// Frames processed.
    #[ts(type = "number")]
    pub frames_processed: u64,
    /// Vehicles detected.
    #[ts(type = "number")]
    pub vehicles_detected: u64,
    /// Completed signal cycles.
    #[ts(type = "number")]
    pub signal_cycles: u64,
    /// Emergency overrides.
    #[ts(type = "number")]
    pub emergency_overrides: u64,
    /// Signal controller link status.
    pub arduino_connected: bool,
    /// Signal controller serial port.
    pub arduino_port: String,
    /// Base64-encoded current frame, or `null`.
    pub video_frame: Option<String>,
    /// Most recent log lines, oldest first.
    pub logs: Vec<String>,
    /// Minute-granularity count history, oldest first.
    pub vehicle_history: Vec<HistoryEntry>,
    /// Per-category vehicle counts.
    pub vehicle_types: VehicleTypeCounts,
}

impl TrafficPayload {
    /// Project the state fields of `snapshot` into a payload.
    ///
    /// System metrics, uptime, the encoded frame and the log tail are left
    /// empty for the caller to fill in.
    pub fn from_snapshot(snapshot: &TrafficSnapshot) -> Self {
        Self {
            road_a: snapshot.road_a_count,
            road_b: snapshot.road_b_count,
            current_signal: snapshot.current_signal,
            time_left: snapshot.time_left,
            system_uptime: 0,
            cpu_usage: 0,
            gpu_usage: 0,
            fps: whole(snapshot.fps),
            avg_frame_time: whole(snapshot.avg_frame_time_ms),
            frames_processed: snapshot.frames_processed,
            vehicles_detected: snapshot.vehicles_detected,
            signal_cycles: snapshot.signal_cycles,
            emergency_overrides: snapshot.emergency_overrides,
            arduino_connected: snapshot.arduino_connected,
            arduino_port: snapshot.arduino_port.clone(),
            video_frame: None,
            logs: Vec::new(),
            vehicle_history: snapshot.vehicle_history.iter().cloned().collect(),
            vehicle_types: snapshot.vehicle_types,
        }
    }
}

/// Round a measurement to a non-negative integer. NaN maps to 0 and
/// out-of-range values saturate.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole(value: f64) -> u32 {
    value.round() as u32
}

//! Traffic state types shared by the relay core and the wire payload.
//!
//! [`TrafficSnapshot`] is the single mutable record the producer updates
//! and the broadcast loop reads. Everything in it is cheap to clone: the
//! only potentially large field, the current camera frame, is held behind
//! a reference-counted [`FrameRef`].

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Maximum number of entries retained in [`TrafficSnapshot::vehicle_history`].
pub const HISTORY_CAPACITY: usize = 20;

// ---------------------------------------------------------------------------
// Road / signal
// ---------------------------------------------------------------------------

/// A monitored lane. The signal grants right-of-way to exactly one road.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum Road {
    /// Road A (the default green road at startup).
    #[default]
    A,
    /// Road B.
    B,
}

impl Road {
    /// The road that does not currently hold right-of-way.
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

impl core::fmt::Display for Road {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::A => f.write_str("A"),
            Self::B => f.write_str("B"),
        }
    }
}

// ---------------------------------------------------------------------------
// Vehicle categories
// ---------------------------------------------------------------------------

/// A vehicle category recognised by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleKind {
    /// Passenger car.
    Car,
    /// Bus.
    Bus,
    /// Truck.
    Truck,
    /// Bicycle or motorbike.
    Bike,
}

impl VehicleKind {
    /// All categories in wire order.
    pub const ALL: [Self; 4] = [Self::Car, Self::Bus, Self::Truck, Self::Bike];
}

/// Per-category vehicle counts. Serialized as `{car, bus, truck, bike}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct VehicleTypeCounts {
    /// Cars.
    pub car: u32,
    /// Buses.
    pub bus: u32,
    /// Trucks.
    pub truck: u32,
    /// Bikes.
    pub bike: u32,
}

impl VehicleTypeCounts {
    /// Count for a single category.
    pub const fn get(&self, kind: VehicleKind) -> u32 {
        match kind {
            VehicleKind::Car => self.car,
            VehicleKind::Bus => self.bus,
            VehicleKind::Truck => self.truck,
            VehicleKind::Bike => self.bike,
        }
    }

    /// Overwrite the count for a single category.
    pub const fn set(&mut self, kind: VehicleKind, count: u32) {
        match kind {
            VehicleKind::Car => self.car = count,
            VehicleKind::Bus => self.bus = count,
            VehicleKind::Truck => self.truck = count,
            VehicleKind::Bike => self.bike = count,
        }
    }

    /// Sum over all categories, saturating.
    pub fn total(&self) -> u32 {
        VehicleKind::ALL
            .iter()
            .fold(0u32, |acc, kind| acc.saturating_add(self.get(*kind)))
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// One minute-granularity sample of the per-road counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct HistoryEntry {
    /// Local wall-clock label, `HH:MM`.
    pub time: String,
    /// Road A count at the time of the sample.
    #[ts(type = "number")]
    pub road_a: i64,
    /// Road B count at the time of the sample.
    #[ts(type = "number")]
    pub road_b: i64,
}

// ---------------------------------------------------------------------------
// Frame reference
// ---------------------------------------------------------------------------

/// Opaque handle to the most recent camera frame.
///
/// The bytes are whatever image artifact the producer hands over (in
/// practice an already-compressed JPEG). Cloning is a reference-count bump.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameRef(Arc<[u8]>);

impl FrameRef {
    /// Borrow the raw frame bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length of the frame in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the frame holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for FrameRef {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Arc::from(bytes))
    }
}

impl From<&[u8]> for FrameRef {
    fn from(bytes: &[u8]) -> Self {
        Self(Arc::from(bytes))
    }
}

impl core::fmt::Debug for FrameRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FrameRef").field("len", &self.0.len()).finish()
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Point-in-time traffic and system state.
///
/// Created once at startup with zero values and mutated in place for the
/// lifetime of the process. Road counts and `time_left` are producer
/// supplied and stored as given; the four event counters only grow.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrafficSnapshot {
    /// Vehicles currently counted on road A.
    pub road_a_count: i64,
    /// Vehicles currently counted on road B.
    pub road_b_count: i64,
    /// Road that currently holds right-of-way.
    pub current_signal: Road,
    /// Seconds remaining in the current signal phase.
    pub time_left: i64,
    /// Frames processed by the detector.
    pub frames_processed: u64,
    /// Vehicles detected since startup.
    pub vehicles_detected: u64,
    /// Completed signal cycles.
    pub signal_cycles: u64,
    /// Emergency overrides triggered by observers.
    pub emergency_overrides: u64,
    /// Latest detector frame rate.
    pub fps: f64,
    /// Latest average frame processing time in milliseconds.
    pub avg_frame_time_ms: f64,
    /// Whether the signal controller peripheral is connected.
    pub arduino_connected: bool,
    /// Serial port of the signal controller peripheral.
    pub arduino_port: String,
    /// Most recent camera frame, if any.
    pub current_frame: Option<FrameRef>,
    /// Per-category vehicle counts.
    pub vehicle_types: VehicleTypeCounts,
    /// Minute-granularity count history, oldest first.
    pub vehicle_history: VecDeque<HistoryEntry>,
}

impl TrafficSnapshot {
    /// Record the current road counts under `label`.
    ///
    /// A new entry is appended only when `label` differs from the last
    /// recorded label; otherwise the last entry takes the current counts.
    /// The history never grows beyond [`HISTORY_CAPACITY`].
    pub fn record_history(&mut self, label: &str) {
        if let Some(last) = self.vehicle_history.back_mut() {
            if last.time == label {
                last.road_a = self.road_a_count;
                last.road_b = self.road_b_count;
                return;
            }
        }

        self.vehicle_history.push_back(HistoryEntry {
            time: label.to_owned(),
            road_a: self.road_a_count,
            road_b: self.road_b_count,
        });
        while self.vehicle_history.len() > HISTORY_CAPACITY {
            self.vehicle_history.pop_front();
        }
    }
}

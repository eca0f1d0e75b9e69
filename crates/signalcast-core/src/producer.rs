//! The handle through which the detection process feeds the relay.
//!
//! Every setter is a single [`StateStore::update`], so a dashboard never
//! sees half of a producer call. Values are stored as given.

use std::sync::Arc;

use chrono::Local;
use signalcast_types::{FrameRef, Road, TrafficSnapshot, VehicleTypeCounts};

use crate::logs::LogRing;
use crate::store::StateStore;

/// Cloneable producer-facing API over the shared state and log.
#[derive(Debug, Clone)]
pub struct Producer {
    store: Arc<StateStore>,
    logs: Arc<LogRing>,
}

impl Producer {
    /// Create a handle over `store` and `logs`.
    pub const fn new(store: Arc<StateStore>, logs: Arc<LogRing>) -> Self {
        Self { store, logs }
    }

    /// Publish the latest detection result.
    ///
    /// Counts one processed frame and records the vehicle history for the
    /// current minute. `frame` always replaces the current frame, so `None`
    /// clears it and the next payload carries `videoFrame: null`.
    pub fn update_state(
        &self,
        road_a: i64,
        road_b: i64,
        signal: Road,
        time_left: i64,
        frame: Option<FrameRef>,
    ) {
        let label = Local::now().format("%H:%M").to_string();
        self.update_state_at(&label, road_a, road_b, signal, time_left, frame);
    }

    /// [`update_state`](Self::update_state) with an explicit minute label.
    pub fn update_state_at(
        &self,
        label: &str,
        road_a: i64,
        road_b: i64,
        signal: Road,
        time_left: i64,
        frame: Option<FrameRef>,
    ) {
        self.store.update(|snap| {
            snap.road_a_count = road_a;
            snap.road_b_count = road_b;
            snap.current_signal = signal;
            snap.time_left = time_left;
            snap.current_frame = frame;
            snap.frames_processed = snap.frames_processed.saturating_add(1);
            snap.record_history(label);
        });
    }

    /// Append a line to the event log.
    pub fn log(&self, message: impl Into<String>) {
        self.logs.append(message);
    }

    /// Report the signal controller link.
    pub fn set_peripheral_status(&self, connected: bool, port: impl Into<String>) {
        let port = port.into();
        self.store.update(|snap| {
            snap.arduino_connected = connected;
            snap.arduino_port = port;
        });
    }

    /// Report detector throughput.
    pub fn set_performance(&self, fps: f64, avg_frame_time_ms: f64) {
        self.store.update(|snap| {
            snap.fps = fps;
            snap.avg_frame_time_ms = avg_frame_time_ms;
        });
    }

    /// Replace the per-category vehicle counts.
    pub fn set_vehicle_types(&self, counts: VehicleTypeCounts) {
        self.store.update(|snap| snap.vehicle_types = counts);
    }

    /// Count frames processed outside of [`update_state`](Self::update_state).
    pub fn increment_frames_processed(&self) {
        self.store
            .update(|snap| snap.frames_processed = snap.frames_processed.saturating_add(1));
    }

    /// Add `count` newly detected vehicles.
    pub fn add_vehicles_detected(&self, count: u64) {
        self.store.update(|snap| {
            snap.vehicles_detected = snap.vehicles_detected.saturating_add(count);
        });
    }

    /// Count one completed signal cycle.
    pub fn increment_signal_cycles(&self) {
        self.store
            .update(|snap| snap.signal_cycles = snap.signal_cycles.saturating_add(1));
    }

    /// Current state, as a dashboard would see it.
    pub fn read(&self) -> TrafficSnapshot {
        self.store.read()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use signalcast_types::VehicleKind;

    use super::*;

    fn producer() -> Producer {
        Producer::new(Arc::new(StateStore::new()), Arc::new(LogRing::new()))
    }

    #[test]
    fn same_minute_updates_keep_last_value() {
        let producer = producer();
        for count in [5, 7, 9] {
            producer.update_state_at("14:02", count, 1, Road::A, 10, None);
        }
        let snap = producer.read();
        assert_eq!(snap.vehicle_history.len(), 1);
        assert_eq!(snap.vehicle_history.front().unwrap().road_a, 9);
        assert_eq!(snap.frames_processed, 3);
    }

    #[test]
    fn new_minute_appends() {
        let producer = producer();
        producer.update_state_at("14:02", 5, 1, Road::A, 10, None);
        producer.update_state_at("14:03", 6, 2, Road::B, 9, None);
        let labels: Vec<String> = producer
            .read()
            .vehicle_history
            .into_iter()
            .map(|e| e.time)
            .collect();
        assert_eq!(labels, vec!["14:02", "14:03"]);
    }

    #[test]
    fn missing_frame_clears_the_previous_one() {
        let producer = producer();
        producer.update_state(1, 1, Road::A, 5, Some(FrameRef::from(b"jpeg".as_slice())));
        let frame = producer.read().current_frame.unwrap();
        assert_eq!(frame.as_bytes(), b"jpeg");

        producer.update_state(2, 2, Road::A, 4, None);
        assert!(producer.read().current_frame.is_none());
    }

    #[test]
    fn setters_write_their_fields() {
        let producer = producer();
        producer.set_peripheral_status(true, "/dev/ttyUSB0");
        producer.set_performance(27.5, 41.0);
        let mut counts = VehicleTypeCounts::default();
        counts.set(VehicleKind::Bus, 3);
        producer.set_vehicle_types(counts);
        producer.add_vehicles_detected(12);
        producer.increment_signal_cycles();
        producer.increment_frames_processed();

        let snap = producer.read();
        assert!(snap.arduino_connected);
        assert_eq!(snap.arduino_port, "/dev/ttyUSB0");
        assert!((snap.fps - 27.5).abs() < f64::EPSILON);
        assert_eq!(snap.vehicle_types.bus, 3);
        assert_eq!(snap.vehicles_detected, 12);
        assert_eq!(snap.signal_cycles, 1);
        assert_eq!(snap.frames_processed, 1);
    }

    #[test]
    fn log_reaches_the_ring() {
        let logs = Arc::new(LogRing::new());
        let producer = Producer::new(Arc::new(StateStore::new()), Arc::clone(&logs));
        producer.log("Detected 9 vehicles on Road A");
        assert_eq!(logs.tail(1).first().unwrap().message, "Detected 9 vehicles on Road A");
    }
}

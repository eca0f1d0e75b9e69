//! Random traffic producer for running the relay without a detector.
//!
//! Road A holds the green for the first ten seconds of every twenty, road
//! B for the rest. Counts, throughput, and the vehicle mix are random.
//! `PAUSE` suspends updates until `RESUME`; other commands are only
//! acknowledged in the debug log.

use std::time::{Duration, Instant};

use rand::Rng;
use signalcast_core::commands::CommandReceiver;
use signalcast_core::producer::Producer;
use signalcast_types::{CommandKind, Road, VehicleKind, VehicleTypeCounts};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Length of one signal phase in seconds.
const PHASE_SECS: u64 = 10;

/// Length of a full A-then-B cycle in seconds.
const CYCLE_SECS: u64 = 20;

/// One generated detector reading.
#[derive(Debug, Clone, PartialEq)]
pub struct DemoReading {
    /// Vehicles on road A.
    pub road_a: i64,
    /// Vehicles on road B.
    pub road_b: i64,
    /// Road holding the green.
    pub signal: Road,
    /// Seconds left in the phase.
    pub time_left: i64,
    /// Detector frame rate.
    pub fps: f64,
    /// Average frame time in milliseconds.
    pub avg_frame_time_ms: f64,
    /// Vehicle mix across both roads.
    pub vehicle_types: VehicleTypeCounts,
}

/// Generate the reading for `elapsed_secs` into the run.
pub fn reading(elapsed_secs: u64, rng: &mut impl Rng) -> DemoReading {
    let road_a: i64 = rng.random_range(5..=15);
    let road_b: i64 = rng.random_range(5..=15);

    let signal = if elapsed_secs % CYCLE_SECS < PHASE_SECS {
        Road::A
    } else {
        Road::B
    };
    let time_left = i64::try_from(PHASE_SECS.saturating_sub(elapsed_secs % PHASE_SECS))
        .unwrap_or_default();

    let total = u32::try_from(road_a.saturating_add(road_b)).unwrap_or_default();
    let mut vehicle_types = VehicleTypeCounts::default();
    let mut remaining = total;
    for kind in [VehicleKind::Bus, VehicleKind::Truck, VehicleKind::Bike] {
        let count = rng.random_range(0..=remaining.min(4));
        vehicle_types.set(kind, count);
        remaining = remaining.saturating_sub(count);
    }
    vehicle_types.set(VehicleKind::Car, remaining);

    DemoReading {
        road_a,
        road_b,
        signal,
        time_left,
        fps: rng.random_range(25.0..30.0),
        avg_frame_time_ms: rng.random_range(35.0..45.0),
        vehicle_types,
    }
}

/// Push `reading` through the producer API.
pub fn apply(producer: &Producer, reading: &DemoReading) {
    producer.update_state(
        reading.road_a,
        reading.road_b,
        reading.signal,
        reading.time_left,
        None,
    );
    producer.set_performance(reading.fps, reading.avg_frame_time_ms);
    producer.set_vehicle_types(reading.vehicle_types);
    producer.add_vehicles_detected(u64::from(reading.vehicle_types.total()));
    if reading.time_left == 10 {
        producer.increment_signal_cycles();
    }
    producer.log(format!("Detected {} vehicles on Road A", reading.road_a));
}

/// Produce a reading every `interval` until `cancel` fires.
pub async fn run(
    producer: Producer,
    mut commands: CommandReceiver,
    interval: Duration,
    cancel: CancellationToken,
) {
    let started = Instant::now();
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut paused = false;
    let mut commands_open = true;

    info!(interval_ms = interval.as_millis(), "Demo producer started");

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            command = commands.recv(), if commands_open => {
                match command.map(|c| c.kind) {
                    Some(CommandKind::Pause) => paused = true,
                    Some(CommandKind::Resume) => paused = false,
                    Some(other) => debug!(command = %other, "Demo producer ignoring command"),
                    None => commands_open = false,
                }
            }
            _ = ticker.tick() => {
                if !paused {
                    let next = reading(started.elapsed().as_secs(), &mut rand::rng());
                    apply(&producer, &next);
                }
            }
        }
    }

    debug!("Demo producer stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use signalcast_core::commands::command_channel;
    use signalcast_core::logs::LogRing;
    use signalcast_core::store::StateStore;
    use signalcast_types::Command;

    use super::*;

    #[test]
    fn readings_stay_in_range() {
        let mut rng = SmallRng::seed_from_u64(7);
        for t in 0..200 {
            let r = reading(t, &mut rng);
            assert!((5..=15).contains(&r.road_a));
            assert!((5..=15).contains(&r.road_b));
            assert!((1..=10).contains(&r.time_left));
            assert!((25.0..30.0).contains(&r.fps));
            assert!((35.0..45.0).contains(&r.avg_frame_time_ms));
            assert_eq!(
                i64::from(r.vehicle_types.total()),
                r.road_a.saturating_add(r.road_b)
            );
        }
    }

    #[test]
    fn signal_alternates_every_ten_seconds() {
        let mut rng = SmallRng::seed_from_u64(1);
        assert_eq!(reading(0, &mut rng).signal, Road::A);
        assert_eq!(reading(9, &mut rng).signal, Road::A);
        assert_eq!(reading(10, &mut rng).signal, Road::B);
        assert_eq!(reading(19, &mut rng).signal, Road::B);
        assert_eq!(reading(20, &mut rng).signal, Road::A);
        assert_eq!(reading(3, &mut rng).time_left, 7);
    }

    #[test]
    fn apply_writes_through_producer() {
        let logs = Arc::new(LogRing::new());
        let producer = Producer::new(Arc::new(StateStore::new()), Arc::clone(&logs));
        let r = reading(0, &mut SmallRng::seed_from_u64(3));
        apply(&producer, &r);

        let snap = producer.read();
        assert_eq!(snap.road_a_count, r.road_a);
        assert_eq!(snap.frames_processed, 1);
        assert_eq!(snap.signal_cycles, 1);
        let line = format!("Detected {} vehicles on Road A", r.road_a);
        assert_eq!(logs.tail(1).first().unwrap().message, line);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_suspends_updates_until_resume() {
        let producer = Producer::new(Arc::new(StateStore::new()), Arc::new(LogRing::new()));
        let (tx, rx) = command_channel(4);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            producer.clone(),
            rx,
            Duration::from_millis(100),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(250)).await;
        let before_pause = producer.read().frames_processed;
        assert!(before_pause >= 1);

        tx.forward(Command::now(CommandKind::Pause)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let paused_at = producer.read().frames_processed;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(producer.read().frames_processed, paused_at);

        tx.forward(Command::now(CommandKind::Resume)).unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(producer.read().frames_processed > paused_at);

        cancel.cancel();
        task.await.unwrap();
    }
}

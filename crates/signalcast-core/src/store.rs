//! The relay's single source of truth for traffic state.
//!
//! [`StateStore`] guards one [`TrafficSnapshot`] behind a read-write lock.
//! Every mutation runs as one closure under the write lock, so a reader
//! sees either all of an update or none of it. Reads clone the snapshot
//! out and release the lock immediately; nothing holds the lock across an
//! await point or I/O.

use std::sync::{PoisonError, RwLock};

use signalcast_types::TrafficSnapshot;

/// Exclusive-write, shared-read holder of the current [`TrafficSnapshot`].
#[derive(Debug, Default)]
pub struct StateStore {
    snapshot: RwLock<TrafficSnapshot>,
}

impl StateStore {
    /// Create a store holding a zeroed snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `mutate` to the snapshot atomically with respect to readers.
    ///
    /// Values are stored as given; range checks are the producer's job.
    pub fn update<F, R>(&self, mutate: F) -> R
    where
        F: FnOnce(&mut TrafficSnapshot) -> R,
    {
        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        mutate(&mut guard)
    }

    /// Point-in-time copy of the snapshot.
    pub fn read(&self) -> TrafficSnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record the current counts under the minute label `label` and
    /// return the resulting snapshot, both under one write lock.
    pub fn record_history(&self, label: &str) -> TrafficSnapshot {
        self.update(|snap| {
            snap.record_history(label);
            snap.clone()
        })
    }

    /// Count one emergency override. Returns the new total.
    pub fn increment_emergency_overrides(&self) -> u64 {
        self.update(|snap| {
            snap.emergency_overrides = snap.emergency_overrides.saturating_add(1);
            snap.emergency_overrides
        })
    }
}

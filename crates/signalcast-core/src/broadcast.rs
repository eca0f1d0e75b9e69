//! The periodic broadcast task.
//!
//! Once per tick the loop samples host metrics, records the vehicle
//! history for the current minute, composes a [`TrafficPayload`] and hands
//! the serialized JSON to the [`ConnectionHub`]. Sampling gets a fixed
//! budget; a sampler that overruns it reads as 0 for that tick. A tick
//! that fails is
//! reported as a [`TickError`] to [`BroadcastLoop::run`], which logs it,
//! backs off, and carries on. Only cancellation ends the loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use chrono::Local;
use serde::Serialize;
use signalcast_types::TrafficPayload;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::BroadcastConfig;
use crate::frame::FrameEncoder;
use crate::hub::{ConnectionHub, PublishReport};
use crate::logs::LogRing;
use crate::metrics::{MetricsSampler, SystemMetrics};
use crate::store::StateStore;

/// Errors that end a single tick.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// The blocking metrics task panicked or was cancelled.
    #[error("metrics sampler task failed: {0}")]
    Sampler(String),

    /// The payload could not be serialized.
    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Running totals for the broadcast loop, shared with the status API.
#[derive(Debug, Default)]
pub struct BroadcastStats {
    ticks: AtomicU64,
    failed_ticks: AtomicU64,
    last_delivered: AtomicUsize,
}

/// Point-in-time copy of [`BroadcastStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BroadcastStatsView {
    /// Ticks that published a payload.
    pub ticks: u64,
    /// Ticks that failed.
    pub failed_ticks: u64,
    /// Sessions reached by the most recent successful tick.
    pub last_delivered: usize,
}

impl BroadcastStats {
    /// Read all counters.
    pub fn view(&self) -> BroadcastStatsView {
        BroadcastStatsView {
            ticks: self.ticks.load(Ordering::Relaxed),
            failed_ticks: self.failed_ticks.load(Ordering::Relaxed),
            last_delivered: self.last_delivered.load(Ordering::Relaxed),
        }
    }

    fn record_success(&self, report: PublishReport) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.last_delivered.store(report.delivered, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failed_ticks.fetch_add(1, Ordering::Relaxed);
    }
}

/// Everything [`BroadcastLoop`] reads from or publishes to.
pub struct BroadcastParts {
    /// Traffic state.
    pub store: Arc<StateStore>,
    /// Event log.
    pub logs: Arc<LogRing>,
    /// Publish target.
    pub hub: Arc<ConnectionHub>,
    /// Host metrics source.
    pub sampler: Arc<dyn MetricsSampler>,
    /// Frame encoder for `videoFrame`.
    pub encoder: Arc<dyn FrameEncoder>,
    /// Counters shared with the status API.
    pub stats: Arc<BroadcastStats>,
    /// Process start, for `systemUptime`.
    pub started: Instant,
}

/// The periodic snapshot-and-publish task.
pub struct BroadcastLoop {
    parts: BroadcastParts,
    config: BroadcastConfig,
}

impl BroadcastLoop {
    /// Create a loop over `parts` with the given cadence.
    pub const fn new(parts: BroadcastParts, config: BroadcastConfig) -> Self {
        Self { parts, config }
    }

    /// Shared counters for this loop.
    pub fn stats(&self) -> Arc<BroadcastStats> {
        Arc::clone(&self.parts.stats)
    }

    /// Run one tick using the current local minute as the history label.
    ///
    /// # Errors
    ///
    /// Returns [`TickError`] when the payload could not be built.
    pub async fn tick(&self) -> Result<PublishReport, TickError> {
        let label = Local::now().format("%H:%M").to_string();
        self.tick_at(&label).await
    }

    /// Run one tick recording history under `label`.
    ///
    /// # Errors
    ///
    /// Returns [`TickError`] when the payload could not be built.
    pub async fn tick_at(&self, label: &str) -> Result<PublishReport, TickError> {
        let payload = self.compose(label).await?;
        let json = serde_json::to_string(&payload)?;
        let report = self.parts.hub.publish(Arc::from(json)).await;
        trace!(
            delivered = report.delivered,
            evicted = report.evicted,
            "tick published"
        );
        Ok(report)
    }

    /// Build the payload for one tick without publishing it.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::Sampler`] when the metrics task fails.
    pub async fn compose(&self, label: &str) -> Result<TrafficPayload, TickError> {
        let sampler = Arc::clone(&self.parts.sampler);
        let sampling = tokio::task::spawn_blocking(move || sampler.sample());
        let budget = self.config.sample_timeout();
        let metrics = match tokio::time::timeout(budget, sampling).await {
            Ok(joined) => joined.map_err(|e| TickError::Sampler(e.to_string()))?,
            Err(_) => {
                warn!(timeout_ms = budget.as_millis(), "metrics sampling overran, reporting 0");
                SystemMetrics::default()
            }
        };

        let snapshot = self.parts.store.record_history(label);

        let mut payload = TrafficPayload::from_snapshot(&snapshot);
        payload.system_uptime = self.parts.started.elapsed().as_secs();
        payload.cpu_usage = metrics.cpu_percent;
        payload.gpu_usage = metrics.gpu_percent;
        payload.video_frame = snapshot.current_frame.as_ref().and_then(|frame| {
            self.parts
                .encoder
                .encode(frame)
                .inspect_err(|e| warn!(error = %e, "frame dropped from payload"))
                .ok()
        });
        payload.logs = self.parts.logs.tail_rendered(self.config.log_tail);
        Ok(payload)
    }

    /// Tick at the configured cadence until `cancel` fires.
    ///
    /// A tick that overruns its period is followed immediately by the
    /// next one; missed ticks are not replayed. A failed tick is logged
    /// and followed by the error backoff before normal cadence resumes.
    pub async fn run(self, cancel: CancellationToken) {
        let period = self.config.tick_interval();
        let backoff = self.config.error_backoff();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            tick_interval_ms = period.as_millis(),
            error_backoff_ms = backoff.as_millis(),
            "Broadcast loop started"
        );

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.tick().await {
                Ok(report) => self.parts.stats.record_success(report),
                Err(e) => {
                    self.parts.stats.record_failure();
                    error!(error = %e, backoff_ms = backoff.as_millis(), "broadcast tick failed");
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(backoff) => {}
                    }
                    interval.reset();
                }
            }
        }

        debug!(ticks = self.parts.stats.view().ticks, "Broadcast loop stopped");
    }
}

impl core::fmt::Debug for BroadcastLoop {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BroadcastLoop")
            .field("config", &self.config)
            .field("stats", &self.parts.stats)
            .finish_non_exhaustive()
    }
}

//! On-demand host metrics for the broadcast payload.
//!
//! CPU utilisation comes from `sysinfo`, measured over a short blocking
//! window. GPU utilisation comes from an optional vendor probe and
//! degrades to 0 whenever the probe cannot answer; the failure is never
//! surfaced to the caller. The probe subprocess is killed when it runs
//! past its timeout, and only one probe runs at a time.

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use sysinfo::System;
use tracing::{debug, info};
use wait_timeout::ChildExt;

use crate::config::MetricsConfig;

/// CPU and GPU utilisation, each 0-100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SystemMetrics {
    /// Host CPU utilisation across all cores.
    pub cpu_percent: u8,
    /// GPU utilisation, 0 when unavailable.
    pub gpu_percent: u8,
}

/// Source of [`SystemMetrics`].
///
/// `sample` may block for its measurement window, so async callers should
/// run it on a blocking thread.
pub trait MetricsSampler: Send + Sync {
    /// Take one measurement. Never fails.
    fn sample(&self) -> SystemMetrics;
}

/// A sampler that always reports the same values.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSampler(pub SystemMetrics);

impl MetricsSampler for FixedSampler {
    fn sample(&self) -> SystemMetrics {
        self.0
    }
}

// ---------------------------------------------------------------------------
// GPU probing
// ---------------------------------------------------------------------------

/// Why a GPU probe produced no reading.
#[derive(Debug, thiserror::Error)]
pub enum GpuProbeError {
    /// No supported GPU tooling on this host. Not worth asking again.
    #[error("GPU query unsupported on this host")]
    Unsupported,

    /// The query ran but gave no usable answer this time.
    #[error("GPU query unavailable: {0}")]
    Unavailable(String),
}

/// A vendor-specific GPU utilisation query.
pub trait GpuProbe: Send + Sync {
    /// Current utilisation of the first GPU, in percent.
    ///
    /// # Errors
    ///
    /// Returns [`GpuProbeError`] when no reading is available.
    fn utilization(&self) -> Result<f32, GpuProbeError>;
}

/// Probe that never has a GPU.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGpu;

impl GpuProbe for NoGpu {
    fn utilization(&self) -> Result<f32, GpuProbeError> {
        Err(GpuProbeError::Unsupported)
    }
}

/// Queries NVIDIA GPUs through `nvidia-smi`.
#[derive(Debug, Clone, Copy)]
pub struct NvidiaSmiProbe {
    timeout: Duration,
}

impl NvidiaSmiProbe {
    /// Probe that gives `nvidia-smi` at most `timeout` to answer.
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl GpuProbe for NvidiaSmiProbe {
    fn utilization(&self) -> Result<f32, GpuProbeError> {
        let mut command = Command::new("nvidia-smi");
        command.args([
            "--query-gpu=utilization.gpu",
            "--format=csv,noheader,nounits",
        ]);
        let text = run_bounded(&mut command, self.timeout)?;
        parse_nvidia_smi(&text)
            .ok_or_else(|| GpuProbeError::Unavailable("unparseable nvidia-smi output".to_owned()))
    }
}

/// Run `command` and return its stdout, killing it if it has not exited
/// within `timeout`.
///
/// A program that cannot be found or executed is
/// [`GpuProbeError::Unsupported`]; everything else is
/// [`GpuProbeError::Unavailable`].
fn run_bounded(command: &mut Command, timeout: Duration) -> Result<String, GpuProbeError> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                GpuProbeError::Unsupported
            }
            _ => GpuProbeError::Unavailable(format!("spawn failed: {e}")),
        })?;

    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(GpuProbeError::Unavailable(format!(
                "no answer within {}ms",
                timeout.as_millis()
            )));
        }
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(GpuProbeError::Unavailable(format!("wait failed: {e}")));
        }
    };
    if !status.success() {
        return Err(GpuProbeError::Unavailable(format!("exited with {status}")));
    }

    let mut stdout = String::new();
    if let Some(mut pipe) = child.stdout.take() {
        pipe.read_to_string(&mut stdout)
            .map_err(|e| GpuProbeError::Unavailable(format!("read failed: {e}")))?;
    }
    Ok(stdout)
}

/// Parse the first GPU's utilisation from `nvidia-smi` CSV output.
pub fn parse_nvidia_smi(output: &str) -> Option<f32> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.split(',').next())
        .and_then(|field| field.trim().parse::<f32>().ok())
}

// ---------------------------------------------------------------------------
// Host sampler
// ---------------------------------------------------------------------------

/// [`MetricsSampler`] backed by `sysinfo` and a [`GpuProbe`].
pub struct SystemSampler {
    system: Mutex<System>,
    window: Duration,
    gpu: Box<dyn GpuProbe>,
    gpu_unsupported: AtomicBool,
    gpu_busy: AtomicBool,
}

/// Clears the in-flight flag when a probe call returns or unwinds.
struct ProbeSlot<'a>(&'a AtomicBool);

impl Drop for ProbeSlot<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SystemSampler {
    /// Build a sampler from configuration. When `gpu_probe` is off the
    /// GPU always reads 0.
    pub fn from_config(config: &MetricsConfig) -> Self {
        let gpu: Box<dyn GpuProbe> = if config.gpu_probe {
            Box::new(NvidiaSmiProbe::new(Duration::from_millis(
                config.gpu_timeout_ms,
            )))
        } else {
            Box::new(NoGpu)
        };
        Self::new(Duration::from_millis(config.cpu_sample_ms), gpu)
    }

    /// Build a sampler with an explicit CPU window and GPU probe.
    pub fn new(window: Duration, gpu: Box<dyn GpuProbe>) -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self {
            system: Mutex::new(system),
            window,
            gpu,
            gpu_unsupported: AtomicBool::new(false),
            gpu_busy: AtomicBool::new(false),
        }
    }

    fn cpu_percent(&self) -> u8 {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_cpu_usage();
        std::thread::sleep(self.window);
        system.refresh_cpu_usage();
        to_percent(system.global_cpu_usage())
    }

    fn gpu_percent(&self) -> u8 {
        if self.gpu_unsupported.load(Ordering::Relaxed) {
            return 0;
        }
        if self.gpu_busy.swap(true, Ordering::Acquire) {
            debug!("previous GPU probe still running, reporting 0");
            return 0;
        }
        let _slot = ProbeSlot(&self.gpu_busy);
        match self.gpu.utilization() {
            Ok(value) => to_percent(value),
            Err(GpuProbeError::Unsupported) => {
                if !self.gpu_unsupported.swap(true, Ordering::Relaxed) {
                    info!("GPU utilisation unsupported on this host, reporting 0");
                }
                0
            }
            Err(e) => {
                debug!(error = %e, "GPU probe failed, reporting 0");
                0
            }
        }
    }
}

impl MetricsSampler for SystemSampler {
    fn sample(&self) -> SystemMetrics {
        SystemMetrics {
            cpu_percent: self.cpu_percent(),
            gpu_percent: self.gpu_percent(),
        }
    }
}

impl core::fmt::Debug for SystemSampler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SystemSampler")
            .field("window", &self.window)
            .field("gpu_unsupported", &self.gpu_unsupported.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Clamp a utilisation reading to 0-100. NaN reads as 0.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_percent(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, 100.0).round() as u8
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Instant;

    use super::*;

    struct CountingProbe {
        calls: Arc<AtomicUsize>,
        result: fn() -> Result<f32, GpuProbeError>,
    }

    impl GpuProbe for CountingProbe {
        fn utilization(&self) -> Result<f32, GpuProbeError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            (self.result)()
        }
    }

    /// Blocks each call until released or the sender is dropped.
    struct GatedProbe {
        calls: Arc<AtomicUsize>,
        gate: Mutex<mpsc::Receiver<()>>,
    }

    impl GpuProbe for GatedProbe {
        fn utilization(&self) -> Result<f32, GpuProbeError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let _ = self
                .gate
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(10));
            Ok(55.0)
        }
    }

    fn sampler_with(result: fn() -> Result<f32, GpuProbeError>) -> (SystemSampler, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = CountingProbe {
            calls: Arc::clone(&calls),
            result,
        };
        (SystemSampler::new(Duration::ZERO, Box::new(probe)), calls)
    }

    #[test]
    fn unsupported_gpu_reads_zero_every_time() {
        let sampler = SystemSampler::new(Duration::ZERO, Box::new(NoGpu));
        for _ in 0..3 {
            let metrics = sampler.sample();
            assert_eq!(metrics.gpu_percent, 0);
            assert!(metrics.cpu_percent <= 100);
        }
    }

    #[test]
    fn unsupported_probe_is_not_retried() {
        let (sampler, calls) = sampler_with(|| Err(GpuProbeError::Unsupported));
        assert_eq!(sampler.gpu_percent(), 0);
        assert_eq!(sampler.gpu_percent(), 0);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn transient_failure_is_retried() {
        let (sampler, calls) =
            sampler_with(|| Err(GpuProbeError::Unavailable("busy".to_owned())));
        assert_eq!(sampler.gpu_percent(), 0);
        assert_eq!(sampler.gpu_percent(), 0);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn overlapping_probe_calls_report_zero() {
        let (release, gate) = mpsc::channel();
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = GatedProbe {
            calls: Arc::clone(&calls),
            gate: Mutex::new(gate),
        };
        let sampler = SystemSampler::new(Duration::ZERO, Box::new(probe));

        std::thread::scope(|scope| {
            let first = scope.spawn(|| sampler.gpu_percent());
            while calls.load(Ordering::Relaxed) == 0 {
                std::thread::yield_now();
            }
            assert_eq!(sampler.gpu_percent(), 0);
            assert_eq!(calls.load(Ordering::Relaxed), 1);
            release.send(()).unwrap();
            assert_eq!(first.join().unwrap(), 55);
        });

        // The slot frees up once the stuck call returns.
        drop(release);
        assert_eq!(sampler.gpu_percent(), 55);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[cfg(unix)]
    #[test]
    fn hung_command_is_killed_at_timeout() {
        let started = Instant::now();
        let mut command = Command::new("sleep");
        command.arg("5");
        let result = run_bounded(&mut command, Duration::from_millis(100));
        assert!(matches!(result, Err(GpuProbeError::Unavailable(_))));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[test]
    fn bounded_command_returns_stdout() {
        let mut command = Command::new("echo");
        command.arg("42");
        let text = run_bounded(&mut command, Duration::from_secs(5)).unwrap();
        assert_eq!(parse_nvidia_smi(&text), Some(42.0));
    }

    #[test]
    fn missing_tool_is_unsupported() {
        let mut command = Command::new("signalcast-no-such-gpu-tool");
        let result = run_bounded(&mut command, Duration::from_secs(1));
        assert!(matches!(result, Err(GpuProbeError::Unsupported)));
    }

    #[test]
    fn probe_reading_is_clamped() {
        let (sampler, _) = sampler_with(|| Ok(140.0));
        assert_eq!(sampler.gpu_percent(), 100);
        let (sampler, _) = sampler_with(|| Ok(37.4));
        assert_eq!(sampler.gpu_percent(), 37);
    }

    #[test]
    fn parses_first_gpu_line() {
        assert_eq!(parse_nvidia_smi("42\n7\n"), Some(42.0));
        assert_eq!(parse_nvidia_smi("  \n 13 \n"), Some(13.0));
        assert_eq!(parse_nvidia_smi("[N/A]\n"), None);
        assert_eq!(parse_nvidia_smi(""), None);
    }

    #[test]
    fn percent_conversion_handles_edges() {
        assert_eq!(to_percent(f32::NAN), 0);
        assert_eq!(to_percent(-5.0), 0);
        assert_eq!(to_percent(99.6), 100);
    }
}

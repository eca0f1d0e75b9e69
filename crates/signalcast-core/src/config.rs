//! Configuration loading and typed config structures for the relay.
//!
//! The configuration lives in `signalcast-config.yaml` in the working
//! directory (or the path named by `SIGNALCAST_CONFIG`). Every field has a
//! default, so a missing file or an empty document yields a runnable relay.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "signalcast-config.yaml";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override held a value of the wrong shape.
    #[error("invalid value for {var}: {message}")]
    Override {
        /// Name of the offending environment variable.
        var: &'static str,
        /// What was wrong with it.
        message: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level relay configuration.
///
/// Mirrors the structure of `signalcast-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RelayConfig {
    /// Listener address.
    #[serde(default)]
    pub server: ServerSection,

    /// Broadcast cadence and payload shape.
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Per-session delivery limits.
    #[serde(default)]
    pub hub: HubConfig,

    /// System metrics sampling.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Frame encoding limits.
    #[serde(default)]
    pub frames: FrameConfig,

    /// Command queue sizing.
    #[serde(default)]
    pub commands: CommandConfig,

    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Built-in demo producer.
    #[serde(default)]
    pub demo: DemoConfig,
}

impl RelayConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `SIGNALCAST_HOST` overrides `server.host`
    /// - `SIGNALCAST_PORT` overrides `server.port`
    /// - `SIGNALCAST_DEMO` overrides `demo.enabled`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Override`] if an override cannot be parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string and apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Resolve and load the configuration for the relay binary.
    ///
    /// Uses `SIGNALCAST_CONFIG` when set, otherwise [`DEFAULT_CONFIG_FILE`].
    /// A missing file is not an error: defaults plus environment overrides
    /// are returned.
    ///
    /// # Errors
    ///
    /// Propagates any [`ConfigError`] from reading or parsing.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("SIGNALCAST_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_owned());
        let path = Path::new(&path);
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            let mut config = Self::default();
            config.apply_overrides(|name| std::env::var(name).ok())?;
            Ok(config)
        }
    }

    /// Apply overrides from `lookup`, which maps a variable name to its
    /// value if set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Override`] if a numeric or boolean override
    /// does not parse.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SIGNALCAST_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("SIGNALCAST_PORT") {
            self.server.port = port.trim().parse().map_err(|e| ConfigError::Override {
                var: "SIGNALCAST_PORT",
                message: format!("{e}"),
            })?;
        }
        if let Some(demo) = lookup("SIGNALCAST_DEMO") {
            self.demo.enabled = demo.trim().parse().map_err(|e| ConfigError::Override {
                var: "SIGNALCAST_DEMO",
                message: format!("{e}"),
            })?;
        }
        Ok(())
    }
}

/// Listener address.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSection {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Broadcast loop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BroadcastConfig {
    /// Milliseconds between ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Milliseconds to wait after a failed tick before resuming.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,

    /// Number of log lines included in each payload.
    #[serde(default = "default_log_tail")]
    pub log_tail: usize,

    /// Longest a tick waits on the metrics sampler before reporting 0.
    #[serde(default = "default_sample_timeout_ms")]
    pub sample_timeout_ms: u64,
}

impl BroadcastConfig {
    /// Tick period as a [`Duration`], never zero.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Failed-tick backoff as a [`Duration`].
    pub const fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    /// Metrics sampling budget as a [`Duration`].
    pub const fn sample_timeout(&self) -> Duration {
        Duration::from_millis(self.sample_timeout_ms)
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            log_tail: default_log_tail(),
            sample_timeout_ms: default_sample_timeout_ms(),
        }
    }
}

/// Per-session delivery configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HubConfig {
    /// Longest a publish waits on one session before disconnecting it.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Payloads buffered per session ahead of its socket writer.
    #[serde(default = "default_session_buffer")]
    pub session_buffer: usize,
}

impl HubConfig {
    /// Send timeout as a [`Duration`].
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: default_send_timeout_ms(),
            session_buffer: default_session_buffer(),
        }
    }
}

/// System metrics configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MetricsConfig {
    /// Whether to query `nvidia-smi` for GPU utilisation.
    #[serde(default = "default_true")]
    pub gpu_probe: bool,

    /// CPU sampling window in milliseconds.
    #[serde(default = "default_cpu_sample_ms")]
    pub cpu_sample_ms: u64,

    /// `nvidia-smi` is killed if it has not answered within this many
    /// milliseconds.
    #[serde(default = "default_gpu_timeout_ms")]
    pub gpu_timeout_ms: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            gpu_probe: true,
            cpu_sample_ms: default_cpu_sample_ms(),
            gpu_timeout_ms: default_gpu_timeout_ms(),
        }
    }
}

/// Frame encoding configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FrameConfig {
    /// Frames larger than this are dropped from the payload.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

/// Command queue configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandConfig {
    /// Commands buffered for the producer before new ones are dropped.
    #[serde(default = "default_command_capacity")]
    pub capacity: usize,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            capacity: default_command_capacity(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Pretty,
        }
    }
}

/// Demo producer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DemoConfig {
    /// Run the built-in random producer.
    #[serde(default)]
    pub enabled: bool,

    /// Milliseconds between demo updates.
    #[serde(default = "default_demo_interval_ms")]
    pub interval_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: default_demo_interval_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_port() -> u16 {
    5000
}

const fn default_tick_interval_ms() -> u64 {
    100
}

const fn default_error_backoff_ms() -> u64 {
    1000
}

const fn default_log_tail() -> usize {
    10
}

const fn default_sample_timeout_ms() -> u64 {
    500
}

const fn default_send_timeout_ms() -> u64 {
    250
}

const fn default_session_buffer() -> usize {
    4
}

const fn default_true() -> bool {
    true
}

const fn default_cpu_sample_ms() -> u64 {
    100
}

const fn default_gpu_timeout_ms() -> u64 {
    200
}

const fn default_max_frame_bytes() -> usize {
    4_194_304
}

const fn default_command_capacity() -> usize {
    64
}

fn default_log_level() -> String {
    String::from("info")
}

const fn default_demo_interval_ms() -> u64 {
    2000
}

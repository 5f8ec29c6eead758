//! Configuration for custodiand.

use std::path::PathBuf;

use custodian_types::EnginePolicy;
use serde::{Deserialize, Serialize};

/// Main daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Workspace root holding records, locks, spool, checkpoints,
    /// archive, and the audit log.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Path whose filesystem the disk monitor samples. Defaults to the
    /// workspace root.
    #[serde(default)]
    pub disk_path: Option<PathBuf>,

    /// Scheduler tick intervals.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Engine policy (timeouts, thresholds, scoring weights).
    #[serde(default)]
    pub policy: EnginePolicy,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            disk_path: None,
            scheduler: SchedulerConfig::default(),
            policy: EnginePolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Tick intervals for the trigger loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Spool consumption and time-policy scan interval, seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Disk sampling interval, seconds.
    #[serde(default = "default_disk_interval")]
    pub disk_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            disk_interval_secs: default_disk_interval(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers

fn default_root() -> PathBuf {
    PathBuf::from(".custodian")
}

fn default_poll_interval() -> u64 {
    30
}

fn default_disk_interval() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then an optional file, then
    /// environment variables with the CUSTODIAN_ prefix.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CUSTODIAN")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Path the disk monitor samples.
    pub fn disk_path(&self) -> PathBuf {
        self.disk_path.clone().unwrap_or_else(|| self.root.clone())
    }
}

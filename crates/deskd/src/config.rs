//! Daemon configuration.
//!
//! Loaded from an optional TOML file plus `DESKD_`-prefixed environment
//! overrides. Every option has a compiled-in default so the daemon runs
//! with no config file at all.

use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{LifecycleError, LifecycleResult};
use crate::schedule::resolve_timezone;
use crate::session::OsFamily;

/// Idle/retention policy for one OS family.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OsPolicy {
    /// CPU average below which a desktop counts as quiet, in percent.
    pub idle_cpu_threshold_pct: f64,
    /// Hours of zero connections + quiet CPU before a stop candidate may
    /// actually be stopped.
    pub idle_timeout_hours: i64,
    /// Hours a stopped desktop may stay stopped before auto-termination.
    /// 0 disables the sweeper for this family.
    pub retention_hours: i64,
}

impl Default for OsPolicy {
    fn default() -> Self {
        Self {
            idle_cpu_threshold_pct: 15.0,
            idle_timeout_hours: 1,
            retention_hours: 0,
        }
    }
}

/// AWS CLI client settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AwsSettings {
    pub binary: Option<String>,
    pub region: Option<String>,
    pub profile: Option<String>,
}

/// Daemon settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// IANA time zone schedules are evaluated in. Unknown names fall back
    /// to UTC with a logged warning.
    pub timezone: String,
    /// Minimum hours since a session's last state change before the
    /// controller acts on it again.
    pub grace_period_hours: i64,
    /// Sessions per fleet-API batch.
    pub chunk_size: usize,
    /// Seconds between controller passes in daemon mode.
    pub pass_interval_secs: u64,
    /// Seconds between auto-termination sweeps in daemon mode.
    pub sweep_interval_secs: u64,
    /// Seconds between telemetry status polls.
    pub poll_interval_secs: u64,
    /// Telemetry status poll attempts before giving up.
    pub poll_max_attempts: u32,
    /// Session database path. Defaults under the platform data directory.
    pub database_path: Option<PathBuf>,
    pub aws: AwsSettings,
    pub linux: OsPolicy,
    pub windows: OsPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            grace_period_hours: 1,
            chunk_size: crate::chunk::DEFAULT_CHUNK_SIZE,
            pass_interval_secs: 300,
            sweep_interval_secs: 3600,
            poll_interval_secs: 5,
            poll_max_attempts: 10,
            database_path: None,
            aws: AwsSettings::default(),
            linux: OsPolicy::default(),
            windows: OsPolicy::default(),
        }
    }
}

impl Settings {
    /// Load settings from an optional config file and the environment.
    /// A malformed file or value (for example a non-integer retention) is
    /// a configuration error; the caller aborts the run and retries on
    /// the next scheduled invocation.
    pub fn load(path: Option<&Path>) -> LifecycleResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder
            .add_source(Environment::with_prefix("DESKD").separator("__"))
            .build()
            .map_err(|e| LifecycleError::Configuration(e.to_string()))?
            .try_deserialize()
            .map_err(|e| LifecycleError::Configuration(e.to_string()))
    }

    /// Policy block for an OS family.
    pub fn policy(&self, os_family: OsFamily) -> &OsPolicy {
        match os_family {
            OsFamily::Linux => &self.linux,
            OsFamily::Windows => &self.windows,
        }
    }

    /// Resolved schedule time zone (UTC fallback on unknown names).
    pub fn resolved_timezone(&self) -> Tz {
        resolve_timezone(&self.timezone)
    }

    /// Session database path, defaulting under the platform data dir.
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("deskd")
                .join("sessions.db")
        })
    }
}

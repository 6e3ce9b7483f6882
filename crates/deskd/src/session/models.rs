//! Session data models.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Minutes in a day. `start == stop == 1440` means "running all day",
/// `start == stop == 0` means "stopped all day".
pub const MINUTES_PER_DAY: u32 = 1440;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Instance start was issued; waiting for the desktop to come up.
    Pending,
    /// Desktop is up and reachable.
    Running,
    /// Instance is stopped (or hibernated).
    Stopped,
    /// Infrastructure was deleted. Absorbing state.
    Terminated,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Pending => write!(f, "pending"),
            SessionState::Running => write!(f, "running"),
            SessionState::Stopped => write!(f, "stopped"),
            SessionState::Terminated => write!(f, "terminated"),
        }
    }
}

impl std::str::FromStr for SessionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SessionState::Pending),
            "running" => Ok(SessionState::Running),
            "stopped" => Ok(SessionState::Stopped),
            "terminated" => Ok(SessionState::Terminated),
            _ => Err(format!("unknown session state: {}", s)),
        }
    }
}

impl TryFrom<String> for SessionState {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Guest operating system family. Selects the telemetry command template
/// and the idle/retention policy block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Linux,
    Windows,
}

impl OsFamily {
    /// All supported families, in processing order.
    pub const ALL: [OsFamily; 2] = [OsFamily::Linux, OsFamily::Windows];
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OsFamily::Linux => write!(f, "linux"),
            OsFamily::Windows => write!(f, "windows"),
        }
    }
}

impl std::str::FromStr for OsFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linux" => Ok(OsFamily::Linux),
            "windows" => Ok(OsFamily::Windows),
            _ => Err(format!("os_family must be linux or windows, got: {}", s)),
        }
    }
}

impl TryFrom<String> for OsFamily {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One weekday's start/stop window, in minutes since local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayWindow {
    pub start: u32,
    pub stop: u32,
}

impl DayWindow {
    pub fn new(start: u32, stop: u32) -> Self {
        Self { start, stop }
    }

    /// Sentinel: desktop should run all day regardless of the clock.
    pub fn is_all_day_running(&self) -> bool {
        self.start == MINUTES_PER_DAY && self.stop == MINUTES_PER_DAY
    }

    /// Sentinel: desktop should be stopped all day.
    pub fn is_all_day_stopped(&self) -> bool {
        self.start == 0 && self.stop == 0
    }
}

/// Weekly schedule keyed by lowercase weekday name ("monday".."sunday").
/// Stored as a JSON TEXT column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekSchedule(pub HashMap<String, DayWindow>);

impl WeekSchedule {
    /// Look up the window for a lowercase weekday name. A missing day means
    /// no schedule policy applies for that day.
    pub fn window_for(&self, day: &str) -> Option<DayWindow> {
        self.0.get(day).copied()
    }

    /// Serialize for storage.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }

    /// Convenience constructor for a schedule that applies the same window
    /// every day of the week.
    pub fn same_every_day(window: DayWindow) -> Self {
        let days = [
            "monday",
            "tuesday",
            "wednesday",
            "thursday",
            "friday",
            "saturday",
            "sunday",
        ];
        Self(days.iter().map(|d| (d.to_string(), window)).collect())
    }
}

impl TryFrom<String> for WeekSchedule {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        serde_json::from_str(&value).map_err(|e| format!("invalid schedule JSON: {}", e))
    }
}

/// A managed virtual desktop session.
///
/// The controller only ever transitions `state`/`state_changed_at` and the
/// deactivation fields. Identity, schedule, and fleet handles are owned by
/// the provisioning subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    /// Primary key.
    pub id: i64,
    /// Stable external identifier.
    pub uuid: String,
    /// Human-readable session name.
    pub name: String,
    /// User who owns this desktop.
    pub owner: String,
    /// Guest OS family.
    #[sqlx(try_from = "String")]
    pub os_family: OsFamily,
    /// Compute instance handle. Set while the stack is provisioned.
    pub instance_id: Option<String>,
    /// Infrastructure stack handle. Set while the stack is provisioned.
    pub stack_name: Option<String>,
    /// Whether "stop" may hibernate instead of a plain stop.
    pub hibernation_supported: bool,
    /// Weekly start/stop schedule.
    #[sqlx(try_from = "String")]
    pub schedule: WeekSchedule,
    /// Current lifecycle state.
    #[sqlx(try_from = "String")]
    pub state: SessionState,
    /// When `state` last changed. Sole basis for grace-period and
    /// retention-window computations.
    pub state_changed_at: DateTime<Utc>,
    /// False once terminated; the controller never sees inactive sessions.
    pub is_active: bool,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was deactivated.
    pub deactivated_at: Option<DateTime<Utc>>,
    /// What deactivated the session (user action or the sweeper).
    pub deactivated_by: Option<String>,
}

impl Session {
    /// Check if the desktop is currently running.
    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }
}

//! Idle-usage telemetry collection over a remote command protocol.

pub mod collector;
pub mod strategy;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::LifecycleResult;

pub use collector::TelemetryCollector;
pub use strategy::{TelemetryStrategy, strategy_for};

/// Per-instance idle snapshot parsed from the diagnostic command output.
#[derive(Debug, Clone, PartialEq)]
pub struct IdleSnapshot {
    /// Active remote-display connections.
    pub connections: i64,
    /// CPU average over the last sampling window, in percent.
    pub cpu_avg_pct: f64,
    /// When the last viewer disconnected. For a desktop that was never
    /// accessed this is the desktop's creation time, so an unused desktop
    /// ages toward idle eligibility from boot.
    pub last_disconnect: DateTime<Utc>,
}

/// Status of a batched remote-command invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

/// Output of a remote command on a single instance.
#[derive(Debug, Clone)]
pub struct InstanceOutput {
    pub status: InvocationStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Remote command protocol seam (dispatch, poll, fetch output).
#[async_trait]
pub trait RemoteCommandApi: Send + Sync {
    /// Dispatch one batched command invocation covering all instance IDs.
    /// Returns the invocation ID to poll.
    async fn dispatch(
        &self,
        document_name: &str,
        commands: &[String],
        instance_ids: &[String],
    ) -> LifecycleResult<String>;

    /// Batch-level status of an invocation.
    async fn poll_status(&self, invocation_id: &str) -> LifecycleResult<InvocationStatus>;

    /// Per-instance output of a completed invocation.
    async fn fetch_output(
        &self,
        invocation_id: &str,
        instance_id: &str,
    ) -> LifecycleResult<InstanceOutput>;
}

/// Bounded polling policy for invocation status.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 10,
        }
    }
}

//! Fleet control-plane seam.

pub mod aws_cli;

use async_trait::async_trait;

use crate::error::LifecycleResult;

pub use aws_cli::AwsCli;

/// Compute fleet control plane (instance power actions and stack deletion).
///
/// The fleet is eventually consistent: start/stop calls on an instance
/// already in the requested state must be harmless no-ops, and the caller
/// assumes at-least-once delivery.
#[async_trait]
pub trait FleetApi: Send + Sync {
    /// Start a batch of instances (at most one chunk's worth of IDs).
    async fn start_instances(&self, instance_ids: &[String]) -> LifecycleResult<()>;

    /// Stop a batch of instances, hibernating them when requested.
    async fn stop_instances(&self, instance_ids: &[String], hibernate: bool)
    -> LifecycleResult<()>;

    /// Delete a session's provisioned infrastructure stack.
    async fn delete_stack(&self, stack_name: &str) -> LifecycleResult<()>;
}

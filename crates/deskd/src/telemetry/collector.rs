//! Batched telemetry collection with bounded status polling.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::error::{LifecycleError, LifecycleResult};
use crate::session::{OsFamily, Session};

use super::strategy::strategy_for;
use super::{IdleSnapshot, InvocationStatus, RemoteCommandApi, RetryPolicy};

/// Collects per-instance idle snapshots for one OS family at a time.
#[derive(Clone)]
pub struct TelemetryCollector {
    remote: Arc<dyn RemoteCommandApi>,
    retry: RetryPolicy,
}

impl TelemetryCollector {
    pub fn new(remote: Arc<dyn RemoteCommandApi>, retry: RetryPolicy) -> Self {
        Self { remote, retry }
    }

    /// Run the family's diagnostic command on every instance and parse the
    /// results. Returns a snapshot per instance that answered successfully.
    ///
    /// A batch-level timeout or failure is an error: the caller must skip
    /// all candidate sessions of this family for the current pass. An
    /// individual instance that failed or produced garbage only loses its
    /// own snapshot.
    pub async fn collect(
        &self,
        os_family: OsFamily,
        sessions: &[Session],
    ) -> LifecycleResult<HashMap<String, IdleSnapshot>> {
        let instance_ids: Vec<String> = sessions
            .iter()
            .filter_map(|session| match &session.instance_id {
                Some(id) => Some(id.clone()),
                None => {
                    warn!(
                        "session {} has no instance id, cannot probe it",
                        session.uuid
                    );
                    None
                }
            })
            .collect();

        if instance_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let strategy = strategy_for(os_family);
        info!(
            "probing {} {os_family} instance(s) for idle activity",
            instance_ids.len()
        );

        let invocation_id = self
            .remote
            .dispatch(strategy.document_name(), &strategy.commands(), &instance_ids)
            .await?;

        self.wait_for_completion(&invocation_id).await?;

        let mut snapshots = HashMap::with_capacity(instance_ids.len());
        for instance_id in &instance_ids {
            let output = match self.remote.fetch_output(&invocation_id, instance_id).await {
                Ok(output) => output,
                Err(e) => {
                    warn!("could not fetch invocation output for {instance_id}: {e}");
                    continue;
                }
            };
            if output.status != InvocationStatus::Succeeded {
                warn!(
                    "invocation {invocation_id} on {instance_id} failed: {}",
                    output.stderr
                );
                continue;
            }
            match strategy.parse_output(&output.stdout) {
                Ok(snapshot) => {
                    debug!("idle snapshot for {instance_id}: {snapshot:?}");
                    snapshots.insert(instance_id.clone(), snapshot);
                }
                Err(e) => {
                    warn!("could not parse telemetry from {instance_id}: {e}");
                }
            }
        }

        Ok(snapshots)
    }

    /// Poll the batch status at a fixed interval until terminal or the
    /// attempt budget runs out.
    async fn wait_for_completion(&self, invocation_id: &str) -> LifecycleResult<()> {
        let mut attempt = 1u32;
        loop {
            let status = self.remote.poll_status(invocation_id).await?;
            debug!("invocation {invocation_id} status: {status:?} (attempt {attempt})");
            match status {
                InvocationStatus::Succeeded => return Ok(()),
                InvocationStatus::Failed => {
                    return Err(LifecycleError::CollectorFailure {
                        invocation_id: invocation_id.to_string(),
                        message: "invocation reported terminal failure".to_string(),
                    });
                }
                InvocationStatus::Pending | InvocationStatus::InProgress => {
                    if attempt >= self.retry.max_attempts {
                        return Err(LifecycleError::CollectorTimeout {
                            invocation_id: invocation_id.to_string(),
                            attempts: attempt,
                        });
                    }
                    tokio::time::sleep(self.retry.interval).await;
                    attempt += 1;
                }
            }
        }
    }
}

//! Fleet action execution and store reconciliation.
//!
//! Every action here confirms the fleet call before touching the store,
//! and compensates with a best-effort opposite fleet call when the store
//! write fails afterwards. The store and the fleet share no transaction,
//! so a failed compensation is logged as an inconsistency for operators
//! and left for the next pass to re-evaluate.

use std::sync::Arc;

use chrono::Utc;
use log::{error, info, warn};

use crate::error::{LifecycleError, LifecycleResult};
use crate::fleet::FleetApi;
use crate::session::{Session, SessionState, SessionStore};

/// Executes start/stop/terminate actions and writes outcomes back.
#[derive(Clone)]
pub struct ActionExecutor {
    fleet: Arc<dyn FleetApi>,
    store: Arc<dyn SessionStore>,
}

impl ActionExecutor {
    pub fn new(fleet: Arc<dyn FleetApi>, store: Arc<dyn SessionStore>) -> Self {
        Self { fleet, store }
    }

    /// Start a batch of sessions. One batched fleet call first; if that
    /// fails, each instance is retried individually and the ones that
    /// still fail are dropped (partial success is expected). Returns the
    /// number of sessions whose record moved to `pending`.
    pub async fn start_sessions(&self, sessions: &[Session]) -> usize {
        let candidates: Vec<&Session> = sessions
            .iter()
            .filter(|session| {
                if session.instance_id.is_none() {
                    warn!("session {} has no instance id, cannot start it", session.uuid);
                }
                session.instance_id.is_some()
            })
            .collect();

        if candidates.is_empty() {
            return 0;
        }

        let instance_ids: Vec<String> = candidates
            .iter()
            .filter_map(|s| s.instance_id.clone())
            .collect();

        info!("starting {} instance(s): {instance_ids:?}", instance_ids.len());

        let succeeded: Vec<&Session> = match self.fleet.start_instances(&instance_ids).await {
            Ok(()) => candidates,
            Err(e) => {
                warn!("batch start failed ({e}), retrying instances one by one");
                let mut fresh = Vec::with_capacity(candidates.len());
                for session in candidates {
                    let Some(instance_id) = &session.instance_id else {
                        continue;
                    };
                    match self
                        .fleet
                        .start_instances(std::slice::from_ref(instance_id))
                        .await
                    {
                        Ok(()) => fresh.push(session),
                        Err(e) => {
                            error!("unable to start instance {instance_id}: {e}");
                        }
                    }
                }
                fresh
            }
        };

        let mut started = 0;
        for session in succeeded {
            let Some(instance_id) = &session.instance_id else {
                continue;
            };
            // The fleet treats a start on a running instance as a no-op;
            // the record already holds the right state, so leave it alone.
            if session.is_running() {
                info!(
                    "session {} ({instance_id}) was already running",
                    session.uuid
                );
                continue;
            }
            match self
                .store
                .set_state(session.id, SessionState::Pending, Utc::now())
                .await
            {
                Ok(()) => {
                    info!("started session {} ({instance_id})", session.uuid);
                    started += 1;
                }
                Err(e) => {
                    error!(
                        "instance {instance_id} started but the store update failed ({e}), \
                         stopping it again"
                    );
                    if let Err(stop_err) = self
                        .fleet
                        .stop_instances(std::slice::from_ref(instance_id), false)
                        .await
                    {
                        error!(
                            "compensating stop of {instance_id} also failed: {stop_err}; \
                             fleet and store now disagree for session {}",
                            session.uuid
                        );
                    }
                }
            }
        }
        started
    }

    /// Stop (or hibernate) one confirmed-idle session.
    pub async fn stop_session(&self, session: &Session) -> LifecycleResult<()> {
        let Some(instance_id) = &session.instance_id else {
            return Err(LifecycleError::FleetAction(format!(
                "session {} has no instance id to stop",
                session.uuid
            )));
        };

        let hibernate = session.hibernation_supported;
        info!("stopping instance {instance_id} (hibernate={hibernate})");

        self.fleet
            .stop_instances(std::slice::from_ref(instance_id), hibernate)
            .await?;

        match self
            .store
            .set_state(session.id, SessionState::Stopped, Utc::now())
            .await
        {
            Ok(()) => {
                info!("session {} stopped", session.uuid);
                Ok(())
            }
            Err(e) => {
                error!(
                    "instance {instance_id} stopped but the store update failed ({e}), \
                     starting it back up"
                );
                if let Err(start_err) = self
                    .fleet
                    .start_instances(std::slice::from_ref(instance_id))
                    .await
                {
                    error!(
                        "compensating start of {instance_id} also failed: {start_err}; \
                         fleet and store now disagree for session {}",
                        session.uuid
                    );
                }
                Err(e)
            }
        }
    }

    /// Permanently decommission one session: delete its infrastructure
    /// stack, then hide the record from the controller. A stack-deletion
    /// failure leaves the store untouched so the next sweep retries.
    pub async fn terminate_session(
        &self,
        session: &Session,
        deactivated_by: &str,
    ) -> LifecycleResult<()> {
        let Some(stack_name) = &session.stack_name else {
            return Err(LifecycleError::FleetAction(format!(
                "session {} has no stack to delete",
                session.uuid
            )));
        };

        info!("deleting stack {stack_name} for session {}", session.uuid);
        self.fleet.delete_stack(stack_name).await?;

        match self
            .store
            .deactivate(session.id, deactivated_by, Utc::now())
            .await
        {
            Ok(()) => {
                info!("session {} terminated by {deactivated_by}", session.uuid);
                Ok(())
            }
            Err(e) => {
                error!(
                    "stack {stack_name} deleted but the store update failed ({e}); \
                     session {} will be retried next sweep",
                    session.uuid
                );
                Err(e)
            }
        }
    }
}

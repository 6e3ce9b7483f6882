//! Shared fakes for exercising executor, controller, and sweeper logic
//! without a real fleet or database.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{LifecycleError, LifecycleResult};
use crate::fleet::FleetApi;
use crate::session::{
    DayWindow, OsFamily, Session, SessionState, SessionStore, WeekSchedule,
};
use crate::telemetry::{InstanceOutput, InvocationStatus, RemoteCommandApi};

pub fn make_session(
    id: i64,
    state: SessionState,
    os_family: OsFamily,
    window: DayWindow,
    state_changed_at: DateTime<Utc>,
) -> Session {
    Session {
        id,
        uuid: format!("u-{id}"),
        name: format!("desktop-{id}"),
        owner: "alice".to_string(),
        os_family,
        instance_id: Some(format!("i-{id}")),
        stack_name: Some(format!("stack-{id}")),
        hibernation_supported: false,
        schedule: WeekSchedule::same_every_day(window),
        state,
        state_changed_at,
        is_active: true,
        created_at: state_changed_at,
        deactivated_at: None,
        deactivated_by: None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetCall {
    Start(Vec<String>),
    Stop(Vec<String>, bool),
    DeleteStack(String),
}

/// Recording fleet fake with programmable failures.
#[derive(Default)]
pub struct FakeFleet {
    pub calls: Mutex<Vec<FleetCall>>,
    /// Fail the first (batched) start call.
    pub fail_batch_start: bool,
    /// Instance IDs whose individual start fails.
    pub fail_instances: HashSet<String>,
    pub fail_stop: bool,
    pub fail_delete: bool,
    pub batch_start_seen: Mutex<bool>,
}

impl FakeFleet {
    pub fn calls(&self) -> Vec<FleetCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FleetApi for FakeFleet {
    async fn start_instances(&self, instance_ids: &[String]) -> LifecycleResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(FleetCall::Start(instance_ids.to_vec()));

        let mut seen = self.batch_start_seen.lock().unwrap();
        if self.fail_batch_start && !*seen {
            *seen = true;
            return Err(LifecycleError::FleetAction("batch start failed".to_string()));
        }
        if instance_ids.iter().any(|id| self.fail_instances.contains(id)) {
            return Err(LifecycleError::FleetAction(format!(
                "start failed for {instance_ids:?}"
            )));
        }
        Ok(())
    }

    async fn stop_instances(
        &self,
        instance_ids: &[String],
        hibernate: bool,
    ) -> LifecycleResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(FleetCall::Stop(instance_ids.to_vec(), hibernate));
        if self.fail_stop {
            return Err(LifecycleError::FleetAction("stop failed".to_string()));
        }
        Ok(())
    }

    async fn delete_stack(&self, stack_name: &str) -> LifecycleResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(FleetCall::DeleteStack(stack_name.to_string()));
        if self.fail_delete {
            return Err(LifecycleError::FleetAction("delete-stack failed".to_string()));
        }
        Ok(())
    }
}

/// In-memory session store fake.
#[derive(Default)]
pub struct FakeStore {
    pub sessions: Mutex<Vec<Session>>,
    /// Make every write fail to exercise compensation paths.
    pub fail_writes: bool,
    pub state_writes: Mutex<Vec<(i64, SessionState)>>,
    pub deactivations: Mutex<Vec<(i64, String)>>,
}

impl FakeStore {
    pub fn with_sessions(sessions: Vec<Session>) -> Self {
        Self {
            sessions: Mutex::new(sessions),
            ..Default::default()
        }
    }

    pub fn state_of(&self, id: i64) -> SessionState {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.state)
            .expect("unknown session id")
    }
}

#[async_trait]
impl SessionStore for FakeStore {
    async fn list_active(&self) -> LifecycleResult<Vec<Session>> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.is_active)
            .cloned()
            .collect())
    }

    async fn list_stopped(&self, os_family: OsFamily) -> LifecycleResult<Vec<Session>> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.is_active && s.state == SessionState::Stopped && s.os_family == os_family)
            .cloned()
            .collect())
    }

    async fn set_state(
        &self,
        id: i64,
        state: SessionState,
        changed_at: DateTime<Utc>,
    ) -> LifecycleResult<()> {
        if self.fail_writes {
            return Err(LifecycleError::Persistence(sqlx::Error::PoolClosed));
        }
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.iter_mut().find(|s| s.id == id) {
            session.state = state;
            session.state_changed_at = changed_at;
        }
        self.state_writes.lock().unwrap().push((id, state));
        Ok(())
    }

    async fn deactivate(
        &self,
        id: i64,
        deactivated_by: &str,
        at: DateTime<Utc>,
    ) -> LifecycleResult<()> {
        if self.fail_writes {
            return Err(LifecycleError::Persistence(sqlx::Error::PoolClosed));
        }
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.iter_mut().find(|s| s.id == id) {
            session.is_active = false;
            session.state = SessionState::Terminated;
            session.state_changed_at = at;
            session.deactivated_at = Some(at);
            session.deactivated_by = Some(deactivated_by.to_string());
        }
        self.deactivations
            .lock()
            .unwrap()
            .push((id, deactivated_by.to_string()));
        Ok(())
    }
}

/// Remote command fake that hands out a canned idle payload per instance.
pub struct FakeRemote {
    pub payloads: Mutex<HashMap<String, String>>,
}

impl FakeRemote {
    pub fn new(payloads: HashMap<String, String>) -> Self {
        Self {
            payloads: Mutex::new(payloads),
        }
    }
}

#[async_trait]
impl RemoteCommandApi for FakeRemote {
    async fn dispatch(
        &self,
        _document_name: &str,
        _commands: &[String],
        _instance_ids: &[String],
    ) -> LifecycleResult<String> {
        Ok("cmd-1".to_string())
    }

    async fn poll_status(&self, _invocation_id: &str) -> LifecycleResult<InvocationStatus> {
        Ok(InvocationStatus::Succeeded)
    }

    async fn fetch_output(
        &self,
        _invocation_id: &str,
        instance_id: &str,
    ) -> LifecycleResult<InstanceOutput> {
        match self.payloads.lock().unwrap().get(instance_id) {
            Some(payload) => Ok(InstanceOutput {
                status: InvocationStatus::Succeeded,
                stdout: payload.clone(),
                stderr: String::new(),
            }),
            None => Ok(InstanceOutput {
                status: InvocationStatus::Failed,
                stdout: String::new(),
                stderr: "no payload".to_string(),
            }),
        }
    }
}

/// An idle payload: quiet CPU, nobody connected, disconnected long ago.
pub fn idle_payload(last_disconnect: DateTime<Utc>) -> String {
    format!(
        r#"{{"DCVCurrentConnections": 0, "DCVCreationTime": "2026-01-01T00:00:00Z", "DCVLastDisconnectTime": "{}", "CPUAveragePerformanceLast10Secs": 1.5}}"#,
        last_disconnect.to_rfc3339()
    )
}

/// A busy payload: a viewer is connected.
pub fn busy_payload() -> String {
    r#"{"DCVCurrentConnections": 1, "DCVCreationTime": "2026-01-01T00:00:00Z", "DCVLastDisconnectTime": "", "CPUAveragePerformanceLast10Secs": 45.0}"#
        .to_string()
}

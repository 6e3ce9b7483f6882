//! Session store trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::LifecycleResult;

use super::models::{OsFamily, Session, SessionState};

/// Persistence seam for session records.
///
/// The production implementation is [`super::SessionRepository`]; tests
/// substitute fakes to exercise partial-failure paths.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// All sessions still visible to the controller.
    async fn list_active(&self) -> LifecycleResult<Vec<Session>>;

    /// Active, stopped sessions of one OS family (sweeper input).
    async fn list_stopped(&self, os_family: OsFamily) -> LifecycleResult<Vec<Session>>;

    /// Transition a session's state. `state` and `state_changed_at` are
    /// written atomically in a single statement.
    async fn set_state(
        &self,
        id: i64,
        state: SessionState,
        changed_at: DateTime<Utc>,
    ) -> LifecycleResult<()>;

    /// Mark a session terminated and permanently hide it from the
    /// controller.
    async fn deactivate(
        &self,
        id: i64,
        deactivated_by: &str,
        at: DateTime<Utc>,
    ) -> LifecycleResult<()>;
}

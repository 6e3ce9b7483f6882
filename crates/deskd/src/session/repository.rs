//! Session database repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::LifecycleResult;

use super::models::{OsFamily, Session, SessionState};
use super::store::SessionStore;

const SESSION_COLUMNS: &str = "id, uuid, name, owner, os_family, instance_id, stack_name, \
     hibernation_supported, schedule, state, state_changed_at, is_active, \
     created_at, deactivated_at, deactivated_by";

/// Repository for session persistence.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    /// Create a new repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new session record. Sessions are normally created by the
    /// provisioning flow; the controller only reads and transitions them.
    pub async fn create(&self, session: &Session) -> LifecycleResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO sessions (
                uuid, name, owner, os_family, instance_id, stack_name,
                hibernation_supported, schedule, state, state_changed_at,
                is_active, created_at, deactivated_at, deactivated_by
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.uuid)
        .bind(&session.name)
        .bind(&session.owner)
        .bind(session.os_family.to_string())
        .bind(&session.instance_id)
        .bind(&session.stack_name)
        .bind(session.hibernation_supported)
        .bind(session.schedule.to_json())
        .bind(session.state.to_string())
        .bind(session.state_changed_at)
        .bind(session.is_active)
        .bind(session.created_at)
        .bind(session.deactivated_at)
        .bind(&session.deactivated_by)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Get a session by ID.
    pub async fn get(&self, id: i64) -> LifecycleResult<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }
}

#[async_trait]
impl SessionStore for SessionRepository {
    async fn list_active(&self) -> LifecycleResult<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE is_active = TRUE ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    async fn list_stopped(&self, os_family: OsFamily) -> LifecycleResult<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE is_active = TRUE AND state = 'stopped' AND os_family = ? ORDER BY id"
        ))
        .bind(os_family.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    async fn set_state(
        &self,
        id: i64,
        state: SessionState,
        changed_at: DateTime<Utc>,
    ) -> LifecycleResult<()> {
        sqlx::query("UPDATE sessions SET state = ?, state_changed_at = ? WHERE id = ?")
            .bind(state.to_string())
            .bind(changed_at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn deactivate(
        &self,
        id: i64,
        deactivated_by: &str,
        at: DateTime<Utc>,
    ) -> LifecycleResult<()> {
        sqlx::query(
            r#"
            UPDATE sessions
            SET is_active = FALSE, state = 'terminated', state_changed_at = ?,
                deactivated_at = ?, deactivated_by = ?
            WHERE id = ?
            "#,
        )
        .bind(at)
        .bind(at)
        .bind(deactivated_by)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

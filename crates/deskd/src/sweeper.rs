//! Auto-termination sweeper.
//!
//! A second, independent periodic pass that permanently decommissions
//! sessions left stopped longer than their OS family's retention window.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{error, info};

use crate::config::Settings;
use crate::error::LifecycleResult;
use crate::executor::ActionExecutor;
use crate::session::{OsFamily, SessionStore};

/// Identifier recorded as `deactivated_by` on swept sessions.
pub const SWEEPER_ID: &str = "auto_terminate_stopped_sessions";

/// Sweeps long-stopped sessions into termination.
#[derive(Clone)]
pub struct TerminationSweeper {
    store: Arc<dyn SessionStore>,
    executor: ActionExecutor,
    settings: Settings,
}

impl TerminationSweeper {
    pub fn new(store: Arc<dyn SessionStore>, executor: ActionExecutor, settings: Settings) -> Self {
        Self {
            store,
            executor,
            settings,
        }
    }

    /// Run one sweep at the current instant.
    pub async fn run_sweep(&self) -> LifecycleResult<usize> {
        self.run_sweep_at(Utc::now()).await
    }

    /// Run one sweep, measuring retention windows against `now`.
    /// Returns the number of sessions terminated.
    pub async fn run_sweep_at(&self, now: DateTime<Utc>) -> LifecycleResult<usize> {
        let mut terminated = 0;

        for os_family in OsFamily::ALL {
            let retention_hours = self.settings.policy(os_family).retention_hours;
            if retention_hours <= 0 {
                info!("auto-termination is disabled for {os_family} desktops");
                continue;
            }
            info!(
                "{os_family} desktops are terminated after {retention_hours}h stopped"
            );

            let stopped = self.store.list_stopped(os_family).await?;
            for session in stopped {
                info!(
                    "checking stopped session {} owned by {}",
                    session.name, session.owner
                );

                if now < session.state_changed_at + Duration::hours(retention_hours) {
                    continue;
                }

                info!(
                    "session {} stopped since {}, past the {retention_hours}h retention window",
                    session.uuid, session.state_changed_at
                );
                match self.executor.terminate_session(&session, SWEEPER_ID).await {
                    Ok(()) => terminated += 1,
                    Err(e) => {
                        // Stack deletion failures leave the record intact;
                        // the session is retried on the next sweep.
                        error!("unable to terminate session {}: {e}", session.uuid);
                    }
                }
            }
        }

        if terminated > 0 {
            info!("terminated {terminated} stopped session(s)");
        }
        Ok(terminated)
    }

    /// Start a background task running sweeps on an interval.
    pub fn start_sweep_task(self: Arc<Self>, interval_secs: u64) -> tokio::task::JoinHandle<()> {
        info!("starting auto-termination task (every {interval_secs}s)");

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));

            loop {
                interval.tick().await;

                if let Err(e) = self.run_sweep().await {
                    error!("auto-termination sweep failed: {e}");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::OsPolicy;
    use crate::session::{DayWindow, SessionState};
    use crate::testutil::{FakeFleet, FakeStore, FleetCall, make_session};

    fn settings(linux_retention: i64, windows_retention: i64) -> Settings {
        Settings {
            linux: OsPolicy {
                retention_hours: linux_retention,
                ..Default::default()
            },
            windows: OsPolicy {
                retention_hours: windows_retention,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn stopped_since(id: i64, os_family: OsFamily, hours_ago: i64, now: DateTime<Utc>) -> crate::session::Session {
        make_session(
            id,
            SessionState::Stopped,
            os_family,
            DayWindow::new(480, 1080),
            now - Duration::hours(hours_ago),
        )
    }

    fn sweeper(
        sessions: Vec<crate::session::Session>,
        fleet: FakeFleet,
        settings: Settings,
    ) -> (Arc<FakeFleet>, Arc<FakeStore>, TerminationSweeper) {
        let fleet = Arc::new(fleet);
        let store = Arc::new(FakeStore::with_sessions(sessions));
        let executor = ActionExecutor::new(fleet.clone(), store.clone());
        let sweeper = TerminationSweeper::new(store.clone(), executor, settings);
        (fleet, store, sweeper)
    }

    #[tokio::test]
    async fn terminates_sessions_past_their_retention_window() {
        let now = Utc::now();
        let old = stopped_since(1, OsFamily::Linux, 100, now);
        let fresh = stopped_since(2, OsFamily::Linux, 10, now);
        let (fleet, store, sweeper) = sweeper(vec![old, fresh], FakeFleet::default(), settings(72, 0));

        let terminated = sweeper.run_sweep_at(now).await.unwrap();

        assert_eq!(terminated, 1);
        assert_eq!(
            fleet.calls(),
            vec![FleetCall::DeleteStack("stack-1".to_string())]
        );
        assert_eq!(
            store.deactivations.lock().unwrap().as_slice(),
            &[(1, SWEEPER_ID.to_string())]
        );
        assert_eq!(store.state_of(2), SessionState::Stopped);
    }

    #[tokio::test]
    async fn zero_retention_disables_the_family() {
        let now = Utc::now();
        let linux = stopped_since(1, OsFamily::Linux, 1000, now);
        let windows = stopped_since(2, OsFamily::Windows, 1000, now);
        let (fleet, _store, sweeper) =
            sweeper(vec![linux, windows], FakeFleet::default(), settings(0, 72));

        let terminated = sweeper.run_sweep_at(now).await.unwrap();

        // Only the Windows desktop is swept.
        assert_eq!(terminated, 1);
        assert_eq!(
            fleet.calls(),
            vec![FleetCall::DeleteStack("stack-2".to_string())]
        );
    }

    #[tokio::test]
    async fn failed_stack_deletion_keeps_the_session_for_the_next_sweep() {
        let now = Utc::now();
        let old = stopped_since(1, OsFamily::Linux, 100, now);
        let fleet = FakeFleet {
            fail_delete: true,
            ..Default::default()
        };
        let (_fleet, store, sweeper) = sweeper(vec![old], fleet, settings(72, 0));

        let terminated = sweeper.run_sweep_at(now).await.unwrap();

        assert_eq!(terminated, 0);
        assert!(store.deactivations.lock().unwrap().is_empty());
        assert_eq!(store.state_of(1), SessionState::Stopped);
    }

    #[tokio::test]
    async fn retention_boundary_is_inclusive() {
        let now = Utc::now();
        let exactly = stopped_since(1, OsFamily::Linux, 72, now);
        let (fleet, _store, sweeper) = sweeper(vec![exactly], FakeFleet::default(), settings(72, 0));

        let terminated = sweeper.run_sweep_at(now).await.unwrap();

        assert_eq!(terminated, 1);
        assert_eq!(fleet.calls().len(), 1);
    }
}

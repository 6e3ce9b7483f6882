//! Lifecycle controller - the periodic schedule-management pass.
//!
//! One pass loads every active session, chunks the list to respect fleet
//! batch limits, and reconciles each chunk: sessions due to run are
//! batch-started unconditionally; sessions due to stop are probed for
//! idle activity first and only stopped once confirmed quiet. A failure
//! anywhere is absorbed at the session or family boundary so siblings in
//! the same chunk still get evaluated.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{error, info, warn};

use crate::chunk::chunked;
use crate::config::Settings;
use crate::error::LifecycleResult;
use crate::executor::ActionExecutor;
use crate::idle::is_stop_eligible;
use crate::schedule::{ScheduleDecision, ScheduleEvaluator};
use crate::session::{OsFamily, Session, SessionStore};
use crate::telemetry::TelemetryCollector;

/// Periodic schedule-management controller.
#[derive(Clone)]
pub struct LifecycleController {
    store: Arc<dyn SessionStore>,
    executor: ActionExecutor,
    collector: TelemetryCollector,
    evaluator: ScheduleEvaluator,
    settings: Settings,
}

impl LifecycleController {
    pub fn new(
        store: Arc<dyn SessionStore>,
        executor: ActionExecutor,
        collector: TelemetryCollector,
        settings: Settings,
    ) -> Self {
        let evaluator = ScheduleEvaluator::new(
            settings.resolved_timezone(),
            settings.grace_period_hours,
        );
        Self {
            store,
            executor,
            collector,
            evaluator,
            settings,
        }
    }

    /// Run one controller pass at the current instant.
    pub async fn run_pass(&self) -> LifecycleResult<()> {
        self.run_pass_at(Utc::now()).await
    }

    /// Run one controller pass, evaluating schedules at `now`.
    pub async fn run_pass_at(&self, now: DateTime<Utc>) -> LifecycleResult<()> {
        let started = std::time::Instant::now();

        let sessions = self.store.list_active().await?;
        if sessions.is_empty() {
            info!("no active virtual desktops found");
            return Ok(());
        }

        for chunk in chunked(&sessions, self.settings.chunk_size) {
            self.process_chunk(chunk, now).await;
        }

        info!(
            "controller pass completed in {:.2?} for {} session(s)",
            started.elapsed(),
            sessions.len()
        );
        Ok(())
    }

    async fn process_chunk(&self, chunk: &[Session], now: DateTime<Utc>) {
        let mut start_now: Vec<Session> = Vec::new();
        let mut stop_candidates: Vec<&Session> = Vec::new();

        for session in chunk {
            match self.evaluator.evaluate(session, now) {
                ScheduleDecision::StartNow => start_now.push(session.clone()),
                ScheduleDecision::StopCandidate => stop_candidates.push(session),
                ScheduleDecision::NoAction => {}
            }
        }

        // Starting is instant and needs no telemetry, so it goes first.
        // Stops wait on a CPU sampling window per instance.
        if !start_now.is_empty() {
            info!("{} session(s) due to start", start_now.len());
            self.executor.start_sessions(&start_now).await;
        }

        for os_family in OsFamily::ALL {
            let family: Vec<Session> = stop_candidates
                .iter()
                .filter(|s| s.os_family == os_family)
                .map(|s| (*s).clone())
                .collect();
            if family.is_empty() {
                continue;
            }

            let snapshots = match self.collector.collect(os_family, &family).await {
                Ok(snapshots) => snapshots,
                Err(e) => {
                    // Not treated as idle: the whole family is skipped
                    // this pass and re-evaluated on the next one.
                    warn!(
                        "skipping {} {os_family} stop candidate(s) this pass: {e}",
                        family.len()
                    );
                    continue;
                }
            };

            let policy = self.settings.policy(os_family);
            for session in &family {
                let Some(instance_id) = &session.instance_id else {
                    continue;
                };
                let Some(snapshot) = snapshots.get(instance_id) else {
                    warn!("no idle snapshot for {instance_id}, leaving it running");
                    continue;
                };
                if is_stop_eligible(
                    instance_id,
                    snapshot,
                    policy.idle_cpu_threshold_pct,
                    policy.idle_timeout_hours,
                    now,
                ) {
                    if let Err(e) = self.executor.stop_session(session).await {
                        error!("unable to stop session {}: {e}", session.uuid);
                    }
                }
            }
        }
    }

    /// Start a background task running controller passes on an interval.
    ///
    /// Returns a handle that can be used to stop the task.
    pub fn start_schedule_task(self: Arc<Self>, interval_secs: u64) -> tokio::task::JoinHandle<()> {
        info!("starting schedule management task (every {interval_secs}s)");

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));

            loop {
                interval.tick().await;

                if let Err(e) = self.run_pass().await {
                    warn!("controller pass failed: {e}");
                }
            }
        })
    }
}

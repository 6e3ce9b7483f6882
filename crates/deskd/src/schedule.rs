//! Schedule evaluation.
//!
//! Classifies each session against its weekly schedule: should it be
//! started now, is it a candidate for stopping, or is there nothing to do.
//! Exact boundary minutes are deliberately not actioned (strict
//! comparisons on both the start and stop side); the next pass picks the
//! session up once the clock has moved past the boundary.

use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Tz;
use log::{debug, warn};

use crate::session::Session;

/// Outcome of evaluating one session against its schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    /// The session should be running and is not: start it unconditionally.
    StartNow,
    /// The session is running outside its window: stop it if telemetry
    /// confirms it is idle.
    StopCandidate,
    /// Nothing to do this pass.
    NoAction,
}

/// Resolve a configured IANA time zone name, falling back to UTC with a
/// logged warning when the name is unknown.
pub fn resolve_timezone(name: &str) -> Tz {
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!("configured timezone {name:?} does not exist, defaulting to UTC");
            chrono_tz::UTC
        }
    }
}

/// Evaluates sessions against their weekly schedules.
#[derive(Debug, Clone)]
pub struct ScheduleEvaluator {
    tz: Tz,
    grace_period: Duration,
}

impl ScheduleEvaluator {
    pub fn new(tz: Tz, grace_period_hours: i64) -> Self {
        Self {
            tz,
            grace_period: Duration::hours(grace_period_hours),
        }
    }

    /// Classify one session at instant `now`.
    ///
    /// A session whose state changed within the grace period is never
    /// actioned, whatever its schedule says. This keeps a manually started
    /// desktop up even on a stopped-all-day schedule, and prevents
    /// flapping around schedule boundaries.
    pub fn evaluate(&self, session: &Session, now: DateTime<Utc>) -> ScheduleDecision {
        if now < session.state_changed_at + self.grace_period {
            debug!(
                "session {} is within grace period (state changed {}), skipping",
                session.uuid, session.state_changed_at
            );
            return ScheduleDecision::NoAction;
        }

        let local = now.with_timezone(&self.tz);
        let day = local.format("%A").to_string().to_lowercase();
        let now_minutes = local.hour() * 60 + local.minute();

        let Some(window) = session.schedule.window_for(&day) else {
            debug!("session {} has no schedule entry for {day}", session.uuid);
            return ScheduleDecision::NoAction;
        };

        let running = session.is_running();

        if window.is_all_day_running() && !running {
            return ScheduleDecision::StartNow;
        }
        if window.start < now_minutes && now_minutes < window.stop && !running {
            return ScheduleDecision::StartNow;
        }
        if window.is_all_day_stopped() && running {
            return ScheduleDecision::StopCandidate;
        }
        if now_minutes > window.stop && running {
            return ScheduleDecision::StopCandidate;
        }

        ScheduleDecision::NoAction
    }
}

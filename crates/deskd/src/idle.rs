//! Idle stop-eligibility policy.

use chrono::{DateTime, Duration, Utc};
use log::info;

use crate::telemetry::IdleSnapshot;

/// Decide whether a stop-candidate desktop may actually be stopped now.
///
/// CPU and connection activity are checked first; the idle window is only
/// consulted once both already indicate no activity. A desktop with a live
/// viewer or busy CPU stays up however long ago the last disconnect was.
pub fn is_stop_eligible(
    instance_id: &str,
    snapshot: &IdleSnapshot,
    cpu_threshold_pct: f64,
    idle_hours: i64,
    now: DateTime<Utc>,
) -> bool {
    if snapshot.cpu_avg_pct >= cpu_threshold_pct {
        info!(
            "{instance_id} CPU usage {:.1}% is above threshold {:.1}%, leaving it running",
            snapshot.cpu_avg_pct, cpu_threshold_pct
        );
        return false;
    }

    if snapshot.connections != 0 {
        info!(
            "{instance_id} has {} active connection(s), leaving it running",
            snapshot.connections
        );
        return false;
    }

    let idle_since = snapshot.last_disconnect + Duration::hours(idle_hours);
    if idle_since > now {
        info!(
            "{instance_id} not idle long enough (last disconnect {}, idle window {}h)",
            snapshot.last_disconnect, idle_hours
        );
        return false;
    }

    info!(
        "{instance_id} is idle (last disconnect {}, idle window {}h), eligible to stop",
        snapshot.last_disconnect, idle_hours
    );
    true
}

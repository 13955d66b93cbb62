use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;
use tracing::{error, info};

use crate::runtime::AppState;
use crate::settings::parse_run_time;

/// Control-surface requests serviced by the scheduler loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupRequest {
    /// Age-filtered run, same as the daily trigger.
    RunNow,
    /// Unconditional wipe of all records and codes.
    ClearAll,
}

/// Spawns the cleanup loop: waits for the configured daily HH:MM (UTC) or a
/// manual request, runs, then recomputes the next trigger from the persisted
/// run time. A restart needs no memory of past runs; record ages carry all
/// the state.
pub fn spawn_scheduler(
    state: Arc<AppState>,
    mut requests: mpsc::Receiver<CleanupRequest>,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        info!("Cleanup scheduler started");
        state.health.scheduler_alive.store(true, Ordering::SeqCst);

        loop {
            let snapshot = state.settings.snapshot();
            // Validated at the config boundary; the fallback mirrors the default.
            let (hour, minute) = parse_run_time(&snapshot.cleanup.run_time).unwrap_or((0, 5));
            let delay = seconds_until_next_run(Utc::now(), hour, minute);

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(delay)) => {
                    run_daily(&state);
                }
                request = requests.recv() => {
                    match request {
                        Some(CleanupRequest::RunNow) => run_daily(&state),
                        Some(CleanupRequest::ClearAll) => run_clear(&state),
                        None => break,
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        state.health.scheduler_alive.store(false, Ordering::SeqCst);
        info!("Cleanup scheduler stopped");
    });
}

fn run_daily(state: &Arc<AppState>) {
    let days = state.settings.snapshot().cleanup.retention_days;
    if days == 0 {
        info!("Cleanup: age-based pruning disabled (retention_days=0)");
        return;
    }
    match state.db.delete_older_than(days) {
        Ok((messages, codes)) => info!(
            "Cleanup removed {messages} message record(s) and {codes} code(s) older than {days} day(s)"
        ),
        Err(e) => error!("Cleanup run failed: {e}"),
    }
}

fn run_clear(state: &Arc<AppState>) {
    match state.db.clear_all() {
        Ok((messages, codes)) => {
            info!("Cleared {messages} message record(s) and {codes} code(s)")
        }
        Err(e) => error!("Manual clear failed: {e}"),
    }
}

/// Seconds until the next wall-clock occurrence of hour:minute, never less
/// than 60 so a finished run cannot re-trigger within the same minute.
pub(crate) fn seconds_until_next_run(now: DateTime<Utc>, hour: u32, minute: u32) -> u64 {
    let mut run_at = now
        .with_hour(hour)
        .and_then(|t| t.with_minute(minute))
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    if run_at <= now {
        run_at += chrono::Duration::days(1);
    }
    (run_at - now).num_seconds().max(60) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(time: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(time).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_next_run_later_today() {
        let now = at("2026-02-08T10:00:00Z");
        assert_eq!(seconds_until_next_run(now, 12, 30), 2 * 3600 + 30 * 60);
    }

    #[test]
    fn test_next_run_already_passed_rolls_to_tomorrow() {
        let now = at("2026-02-08T10:00:00Z");
        assert_eq!(seconds_until_next_run(now, 0, 5), 14 * 3600 + 5 * 60);
    }

    #[test]
    fn test_next_run_same_minute_waits_a_full_day() {
        let now = at("2026-02-08T00:05:00Z");
        assert_eq!(seconds_until_next_run(now, 0, 5), 24 * 3600);
    }

    #[test]
    fn test_next_run_clamped_to_a_minute() {
        let now = at("2026-02-08T00:04:30Z");
        // 30s away, clamped up to the floor.
        assert_eq!(seconds_until_next_run(now, 0, 5), 60);
    }
}

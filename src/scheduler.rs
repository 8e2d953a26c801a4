// Timer: fires a cycle at each cron occurrence (UTC), one at a time in a single task.
// Occurrences missed while a cycle overran are "past due": logged and run once
// (a backlog collapses into one run, no catch-up burst).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::ScheduleConfig;
use crate::cycle::{CycleDeps, run_cycle};

const IDLE_RECHECK: Duration = Duration::from_secs(3600);
const PAST_DUE_TOLERANCE_SECS: i64 = 5;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub schedule: Schedule,
    pub run_on_startup: bool,
}

impl SchedulerConfig {
    pub fn from_config(config: &ScheduleConfig) -> anyhow::Result<Self> {
        let schedule = Schedule::from_str(&config.cron)
            .map_err(|e| anyhow::anyhow!("invalid schedule.cron {}: {}", config.cron, e))?;
        Ok(Self {
            schedule,
            run_on_startup: config.run_on_startup,
        })
    }
}

/// First occurrence strictly after `after`.
pub fn next_fire(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

/// Occurrence to fire next, given the last one fired. A backlog of occurrences that
/// already passed by `now` collapses into the latest of them.
pub fn due_occurrence(
    schedule: &Schedule,
    last: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let mut due = next_fire(schedule, last)?;
    while let Some(next) = next_fire(schedule, due) {
        if next > now {
            break;
        }
        due = next;
    }
    Some(due)
}

/// A tick is past due when it fires noticeably later than its scheduled time.
pub fn is_past_due(scheduled: DateTime<Utc>, fired_at: DateTime<Utc>) -> bool {
    fired_at - scheduled > chrono::TimeDelta::seconds(PAST_DUE_TOLERANCE_SECS)
}

/// Spawns the timer task. It stops after the current cycle once `shutdown_rx` fires.
pub fn spawn(
    deps: Arc<CycleDeps>,
    config: SchedulerConfig,
    shutdown_rx: oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(deps, config, shutdown_rx).await;
    })
}

async fn run(
    deps: Arc<CycleDeps>,
    config: SchedulerConfig,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    if config.run_on_startup {
        fire(&deps, Utc::now(), false).await;
    }

    let mut last = Utc::now();
    loop {
        let now = Utc::now();
        let Some(scheduled) = due_occurrence(&config.schedule, last, now) else {
            warn!("schedule has no upcoming occurrence");
            tokio::select! {
                _ = tokio::time::sleep(IDLE_RECHECK) => {}
                _ = &mut shutdown_rx => break,
            }
            last = Utc::now();
            continue;
        };
        let delay = (scheduled - now).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                let fired_at = Utc::now();
                fire(&deps, fired_at, is_past_due(scheduled, fired_at)).await;
                last = scheduled;
            }
            _ = &mut shutdown_rx => {
                debug!("scheduler shutting down");
                break;
            }
        }
    }
}

async fn fire(deps: &CycleDeps, fired_at: DateTime<Utc>, past_due: bool) {
    if past_due {
        info!("timer is past due");
    }
    info!(utc = %fired_at.to_rfc3339(), "collection timer fired");
    let outcome = run_cycle(deps, fired_at).await;
    debug!(?outcome, "cycle finished");
}

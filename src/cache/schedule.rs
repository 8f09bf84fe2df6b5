//! Periodic maintenance.
//!
//! The asset sweep runs on a fixed interval and is always followed by a
//! whole-site purge, since purged pages may still reference removed assets.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::lock::mutex_lock;
use super::orchestrator::{Invalidator, PurgeStatus};
use super::sweeper::{AssetSweeper, SweepReport};

const SOURCE: &str = "cache::schedule";

/// Job that sweeps assets and purges the site.
pub const MAINTENANCE_JOB: &str = "delete_assets";
pub const EVERY_TWO_DAYS: &str = "every_two_days";
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(172_800);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub label: &'static str,
    pub interval: Duration,
}

/// Registry of periodic jobs, keyed by job name.
#[derive(Debug, Default)]
pub struct Scheduler {
    jobs: Mutex<HashMap<&'static str, ScheduleEntry>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `job` unless it is already scheduled. Returns `true` when added.
    pub fn register(&self, job: &'static str, entry: ScheduleEntry) -> bool {
        let mut jobs = mutex_lock(&self.jobs, SOURCE, "register");
        if jobs.contains_key(job) {
            debug!(job, "Job already scheduled");
            return false;
        }
        info!(
            job,
            label = entry.label,
            interval_secs = entry.interval.as_secs(),
            "Job scheduled"
        );
        jobs.insert(job, entry);
        true
    }

    pub fn entry(&self, job: &str) -> Option<ScheduleEntry> {
        mutex_lock(&self.jobs, SOURCE, "entry").get(job).cloned()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.jobs, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct MaintenanceReport {
    pub sweep: SweepReport,
    pub purge: PurgeStatus,
}

/// Sweep generated assets, then purge everything.
pub async fn run_maintenance(invalidator: &Invalidator, sweeper: &AssetSweeper) -> MaintenanceReport {
    let sweep = sweeper.sweep().await;
    let purge = invalidator.purge_everything().await;
    info!(
        files_removed = sweep.files_removed,
        purge = %purge,
        "Maintenance finished"
    );
    MaintenanceReport { sweep, purge }
}

/// Schedule the maintenance job and spawn its loop.
///
/// Returns `None` when the job was already scheduled. The first run happens
/// one full interval after startup.
pub fn spawn_maintenance(
    scheduler: &Scheduler,
    invalidator: Arc<Invalidator>,
    sweeper: AssetSweeper,
    interval: Duration,
) -> Option<JoinHandle<()>> {
    let entry = ScheduleEntry {
        label: EVERY_TWO_DAYS,
        interval,
    };
    if !scheduler.register(MAINTENANCE_JOB, entry) {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // Skip the first immediate tick
        loop {
            ticker.tick().await;
            run_maintenance(&invalidator, &sweeper).await;
        }
    }))
}

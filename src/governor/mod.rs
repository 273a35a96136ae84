//! Process-wide registry of background timer tasks.
//!
//! Every polling or periodic loop the engine spawns registers here and
//! touches its activity stamp on each tick. A periodic sweep cancels entries
//! that have gone quiet for longer than the inactivity threshold, which is
//! what keeps reconnect/retry cycles from leaking timers indefinitely.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::GovernorConfig;

#[derive(Debug)]
struct TrackedTask {
    description: String,
    created_at: Instant,
    last_activity: Instant,
    token: CancellationToken,
}

/// Summary of one tracked task, for diagnostics.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: String,
    pub description: String,
    pub age: Duration,
    pub idle: Duration,
}

#[derive(Debug, Default)]
pub struct TaskGovernor {
    tasks: DashMap<String, TrackedTask>,
}

impl TaskGovernor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a background task and returns the token its loop must obey.
    ///
    /// Re-registering an id cancels the previous holder first, so at most one
    /// live task exists per id.
    pub fn register(&self, id: &str, description: &str) -> CancellationToken {
        let token = CancellationToken::new();
        let now = Instant::now();
        if let Some(previous) = self.tasks.insert(
            id.to_owned(),
            TrackedTask {
                description: description.to_owned(),
                created_at: now,
                last_activity: now,
                token: token.clone(),
            },
        ) {
            previous.token.cancel();
            debug!(task = id, "replaced previously registered task");
        }
        token
    }

    /// Refreshes the activity stamp; loops call this on every tick.
    pub fn touch(&self, id: &str) {
        if let Some(mut entry) = self.tasks.get_mut(id) {
            entry.last_activity = Instant::now();
        }
    }

    /// Cancels and forgets a task. Idempotent.
    pub fn deregister(&self, id: &str) {
        if let Some((_, task)) = self.tasks.remove(id) {
            task.token.cancel();
        }
    }

    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn snapshot(&self) -> Vec<TaskInfo> {
        self.tasks
            .iter()
            .map(|entry| TaskInfo {
                id: entry.key().clone(),
                description: entry.description.clone(),
                age: entry.created_at.elapsed(),
                idle: entry.last_activity.elapsed(),
            })
            .collect()
    }

    /// Cancels entries idle for longer than `threshold`. Returns reaped ids.
    pub fn reap_inactive(&self, threshold: Duration) -> Vec<String> {
        let expired: Vec<String> = self
            .tasks
            .iter()
            .filter(|entry| entry.last_activity.elapsed() > threshold)
            .map(|entry| entry.key().clone())
            .collect();

        for id in &expired {
            if let Some((_, task)) = self.tasks.remove(id) {
                warn!(task = %id, description = %task.description, "reaping inactive task");
                task.token.cancel();
            }
        }

        expired
    }

    /// Cancels every tracked task; used at process shutdown.
    pub fn force_cleanup_all(&self) {
        let count = self.tasks.len();
        for entry in self.tasks.iter() {
            entry.token.cancel();
        }
        self.tasks.clear();
        if count > 0 {
            info!(count, "governor cancelled all tracked tasks");
        }
    }
}

/// Spawns the periodic sweep that reaps inactive tasks.
///
/// The sweep itself obeys the returned token so shutdown can stop it.
pub fn spawn_sweeper(governor: Arc<TaskGovernor>, config: &GovernorConfig) -> CancellationToken {
    let token = CancellationToken::new();
    let sweep_token = token.clone();
    let interval = Duration::from_secs(config.sweep_interval_secs.max(1));
    let threshold = Duration::from_secs(config.inactivity_threshold_secs.max(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first interval tick fires immediately; skip it so a fresh boot
        // never sweeps before anything has had a chance to run.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = sweep_token.cancelled() => break,
                _ = ticker.tick() => {
                    let reaped = governor.reap_inactive(threshold);
                    if !reaped.is_empty() {
                        info!(count = reaped.len(), "governor sweep reaped inactive tasks");
                    }
                }
            }
        }
    });

    token
}

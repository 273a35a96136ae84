//! Startup auto-recovery: one reconciliation pass shortly after boot.
//!
//! The delay lets the process finish booting before the pass runs. There is
//! no automatic repetition; later passes are operator-triggered over HTTP or
//! piggy-backed onto instance creation.

use std::{sync::Arc, time::Duration};

use tracing::{error, info};

use crate::{
    engine::Engine,
    governor::TaskGovernor,
    reconcile::ReconcileScope,
};

const TASK_ID: &str = "startup-recovery";

/// Schedules the one-shot startup reconciliation pass.
pub fn spawn_startup_recovery(
    engine: Arc<Engine>,
    governor: Arc<TaskGovernor>,
    delay: Duration,
) {
    let token = governor.register(TASK_ID, "startup auto-recovery pass");

    tokio::spawn(async move {
        tokio::select! {
            // A cancelled token means the registry entry was already removed
            // or re-registered; it is no longer ours to deregister.
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        governor.touch(TASK_ID);
        info!(delay_secs = delay.as_secs(), "running startup auto-recovery");

        match engine.reconcile(ReconcileScope::Global).await {
            Ok(report) => info!(
                recovered = report.recovered_count,
                deleted = report.deleted_count,
                synced = report.synced_count,
                errors = report.errors.len(),
                "startup auto-recovery finished"
            ),
            Err(err) => error!("startup auto-recovery failed: {err}"),
        }

        if !token.is_cancelled() {
            governor.deregister(TASK_ID);
        }
    });
}

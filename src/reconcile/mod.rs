//! Two-way diff between the repository and the session server's live
//! process list, repairing both directions.
//!
//! Webhooks miss deliveries, processes crash, operators edit the VPS by
//! hand; this pass is what brings the two stores back together. It runs to
//! completion with per-instance error isolation and is idempotent: a second
//! pass over an unchanged world produces zero side effects.

use std::{collections::HashSet, sync::Arc};

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    errors::AppError,
    normalize,
    repo::{InstanceRecord, InstanceRepository},
    session_server::{LiveSession, SessionServer},
    status::{ConnectionStatus, map_raw_status},
    sync::StatusSync,
};

/// Owner used for rows adopted during a global pass, where the live session
/// carries no tenant information. Flagged for manual reassignment.
const RECOVERED_OWNER: &str = "recovered";

/// Which instances a reconciliation pass covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileScope {
    Global,
    Owner(String),
}

impl ReconcileScope {
    fn owner(&self) -> Option<&str> {
        match self {
            Self::Global => None,
            Self::Owner(owner) => Some(owner),
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Live-only sessions adopted into new instance rows.
    pub recovered_count: usize,
    /// Db-only orphans torn down (stale handle deleted, row disconnected).
    pub deleted_count: usize,
    /// Matched pairs whose status or metadata drifted and was corrected.
    pub synced_count: usize,
    pub errors: Vec<String>,
}

/// Transient diff of the two stores; never persisted.
#[derive(Debug, Default)]
struct Snapshot {
    db_only: Vec<InstanceRecord>,
    live_only: Vec<LiveSession>,
    healthy: Vec<InstanceRecord>,
}

pub struct Reconciler {
    repo: Arc<dyn InstanceRepository>,
    server: Arc<dyn SessionServer>,
    sync: Arc<StatusSync>,
    default_country_code: String,
}

impl Reconciler {
    pub fn new(
        repo: Arc<dyn InstanceRepository>,
        server: Arc<dyn SessionServer>,
        sync: Arc<StatusSync>,
        default_country_code: String,
    ) -> Self {
        Self {
            repo,
            server,
            sync,
            default_country_code,
        }
    }

    pub async fn run(&self, scope: ReconcileScope) -> Result<ReconcileReport, AppError> {
        let instances = self.repo.list(scope.owner()).await?;
        let live = self.server.list_live_sessions().await?;
        let snapshot = diff(instances, live);

        let mut report = ReconcileReport::default();

        for session in &snapshot.live_only {
            match self.adopt_live_only(session, &scope).await {
                Ok(true) => report.recovered_count += 1,
                Ok(false) => {}
                Err(error) => report
                    .errors
                    .push(format!("adopt {}: {error}", session.session_id)),
            }
        }

        for record in &snapshot.db_only {
            match self.tear_down_db_only(record).await {
                Ok(true) => report.deleted_count += 1,
                Ok(false) => {}
                Err(error) => report.errors.push(format!("teardown {}: {error}", record.id)),
            }
        }

        for record in &snapshot.healthy {
            match self.sync.sync(record.id).await {
                Ok(true) => report.synced_count += 1,
                Ok(false) => {}
                Err(error) => report.errors.push(format!("sync {}: {error}", record.id)),
            }
        }

        info!(
            recovered = report.recovered_count,
            deleted = report.deleted_count,
            synced = report.synced_count,
            errors = report.errors.len(),
            "reconciliation pass finished"
        );

        Ok(report)
    }

    /// Adopts a live session with no matching row, but only when its raw
    /// state is genuinely connected; `connecting`/`error` live-only sessions
    /// carry too little evidence.
    async fn adopt_live_only(
        &self,
        session: &LiveSession,
        scope: &ReconcileScope,
    ) -> Result<bool, AppError> {
        if map_raw_status(&session.raw_status) != Some(ConnectionStatus::Ready) {
            return Ok(false);
        }

        // An owner-scoped pass only lists that owner's rows, so the session
        // may already be bound elsewhere. At most one row per session id.
        if self
            .repo
            .find_by_session(&session.session_id)
            .await?
            .is_some()
        {
            return Ok(false);
        }

        let mut record = InstanceRecord::new(match scope {
            ReconcileScope::Owner(owner) => owner,
            ReconcileScope::Global => RECOVERED_OWNER,
        });
        record.external_session_id = Some(session.session_id.clone());
        record.external_status_raw = Some(session.raw_status.clone());
        record.connection_status = ConnectionStatus::Ready;
        record.date_connected = Some(Utc::now());
        record.profile_name = session.profile_name.clone();

        if let Some(raw_phone) = session.phone.as_deref() {
            let normalized = normalize::normalize_with(raw_phone, &self.default_country_code);
            record.phone_unconfirmed = !normalized.confirmed;
            record.phone = Some(normalized.phone);
        }

        warn!(
            session = %session.session_id,
            instance = %record.id,
            owner = %record.owner_id,
            "adopted live-only session into new instance row"
        );
        self.repo.upsert(&record).await?;
        Ok(true)
    }

    /// Tears down an instance whose session no longer exists on the server:
    /// deletes the stale handle (when one was recorded) and marks the row
    /// disconnected. Rows already terminally disconnected are left alone.
    async fn tear_down_db_only(&self, record: &InstanceRecord) -> Result<bool, AppError> {
        if record.connection_status.is_terminal_disconnect() {
            return Ok(false);
        }

        if let Some(session_id) = record.external_session_id.as_deref() {
            if let Err(error) = self.server.delete_session(session_id).await {
                // Best-effort cleanup; the row is still marked disconnected.
                warn!(
                    instance = %record.id,
                    session = session_id,
                    "stale session cleanup failed: {error}"
                );
            }
        }

        self.sync.mark_disconnected(record.id).await?;
        Ok(true)
    }
}

/// Splits both stores into db-only, live-only and matched sets.
fn diff(instances: Vec<InstanceRecord>, live: Vec<LiveSession>) -> Snapshot {
    let known: HashSet<&str> = instances
        .iter()
        .filter_map(|record| record.external_session_id.as_deref())
        .collect();
    let live_ids: HashSet<&str> = live.iter().map(|session| session.session_id.as_str()).collect();

    let live_only = live
        .iter()
        .filter(|session| !known.contains(session.session_id.as_str()))
        .cloned()
        .collect();

    let mut snapshot = Snapshot {
        live_only,
        ..Snapshot::default()
    };

    for record in instances {
        let matched = record
            .external_session_id
            .as_deref()
            .is_some_and(|session_id| live_ids.contains(session_id));
        if matched {
            snapshot.healthy.push(record);
        } else {
            snapshot.db_only.push(record);
        }
    }

    snapshot
}

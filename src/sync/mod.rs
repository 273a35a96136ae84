//! Merges authoritative session-server state into the repository.
//!
//! Both webhook ingestion and pull-based sync funnel through this service so
//! every read-modify-write for one instance happens under that instance's
//! lock: concurrent writers never interleave.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    errors::AppError,
    normalize,
    repo::{InstanceRecord, InstanceRepository},
    session_server::SessionServer,
    status::{ConnectionStatus, is_allowed_transition, map_raw_status},
};

/// One observation of an instance's live state, from a webhook event or a
/// status fetch.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    pub raw_status: Option<String>,
    pub phone: Option<String>,
    pub profile_name: Option<String>,
}

pub struct StatusSync {
    repo: Arc<dyn InstanceRepository>,
    server: Arc<dyn SessionServer>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    default_country_code: String,
}

impl StatusSync {
    pub fn new(
        repo: Arc<dyn InstanceRepository>,
        server: Arc<dyn SessionServer>,
        default_country_code: String,
    ) -> Self {
        Self {
            repo,
            server,
            locks: DashMap::new(),
            default_country_code,
        }
    }

    fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Pulls status and metadata from the session server for one instance
    /// and merges it. Returns whether anything changed.
    pub async fn sync(&self, id: Uuid) -> Result<bool, AppError> {
        let record = self
            .repo
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("instance {id} not found")))?;

        let Some(session_id) = record.external_session_id.clone() else {
            return Ok(false);
        };

        let status = self.server.session_status(&session_id).await?;
        self.apply_observation(
            id,
            Observation {
                raw_status: Some(status.raw_status),
                phone: status.phone,
                profile_name: status.profile_name,
            },
        )
        .await
    }

    /// Merges one observation under the instance's write lock.
    pub async fn apply_observation(
        &self,
        id: Uuid,
        observation: Observation,
    ) -> Result<bool, AppError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut record = self
            .repo
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("instance {id} not found")))?;

        let changed = merge_observation(&mut record, &observation, &self.default_country_code);
        if changed {
            self.repo.upsert(&record).await?;
        }
        Ok(changed)
    }

    /// Records an available pairing code on the instance.
    pub async fn mark_qr_generated(&self, id: Uuid, code: &str) -> Result<(), AppError> {
        self.with_record(id, |record| {
            let mut changed = apply_status_change(record, ConnectionStatus::QrGenerated);
            if record.qr_code.as_deref() != Some(code) {
                record.qr_code = Some(code.to_owned());
                changed = true;
            }
            changed
        })
        .await
    }

    /// Moves the instance into the terminal error state, logging the reason.
    pub async fn mark_error(&self, id: Uuid, reason: &str) -> Result<(), AppError> {
        warn!(instance = %id, reason, "marking instance as errored");
        self.with_record(id, |record| {
            apply_status_change(record, ConnectionStatus::Error)
        })
        .await
    }

    pub async fn mark_disconnected(&self, id: Uuid) -> Result<(), AppError> {
        self.with_record(id, |record| {
            apply_status_change(record, ConnectionStatus::Disconnected)
        })
        .await
    }

    /// Binds a freshly created server-side session to the instance row.
    pub async fn bind_session(
        &self,
        id: Uuid,
        session_id: &str,
        initial_raw_status: &str,
    ) -> Result<(), AppError> {
        self.with_record(id, |record| {
            record.external_session_id = Some(session_id.to_owned());
            record.external_status_raw = Some(initial_raw_status.to_owned());
            let target =
                map_raw_status(initial_raw_status).unwrap_or(ConnectionStatus::WaitingQr);
            apply_status_change(record, target);
            true
        })
        .await
    }

    async fn with_record<F>(&self, id: Uuid, update: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut InstanceRecord) -> bool,
    {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut record = self
            .repo
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("instance {id} not found")))?;

        if update(&mut record) {
            self.repo.upsert(&record).await?;
        }
        Ok(())
    }
}

/// Applies one observation to a record. Returns whether anything changed.
pub(crate) fn merge_observation(
    record: &mut InstanceRecord,
    observation: &Observation,
    default_country_code: &str,
) -> bool {
    let mut changed = false;

    if let Some(raw) = observation.raw_status.as_deref() {
        if record.external_status_raw.as_deref() != Some(raw) {
            record.external_status_raw = Some(raw.to_owned());
            changed = true;
        }

        match map_raw_status(raw) {
            Some(target) => {
                if target != record.connection_status {
                    if apply_status_change(record, target) {
                        changed = true;
                    } else {
                        warn!(
                            instance = %record.id,
                            from = %record.connection_status,
                            to = %target,
                            "rejecting disallowed status transition"
                        );
                    }
                }
            }
            None => {
                warn!(
                    instance = %record.id,
                    raw,
                    "unknown raw status ignored, keeping current connection status"
                );
            }
        }
    }

    if let Some(observed) = observation
        .phone
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        let normalized = normalize::normalize_with(observed, default_country_code);
        match record.phone.as_deref() {
            None | Some("") => {
                record.phone = Some(normalized.phone);
                record.phone_unconfirmed = !normalized.confirmed;
                changed = true;
            }
            Some(stored) if stored != normalized.phone => {
                // Cross-talk protection: never silently replace a known phone.
                warn!(
                    instance = %record.id,
                    stored,
                    observed = %normalized.phone,
                    "observed phone differs from stored phone, not applying"
                );
            }
            Some(_) => {}
        }
    }

    if let Some(profile_name) = observation
        .profile_name
        .as_deref()
        .filter(|value| !value.is_empty())
    {
        if record.profile_name.as_deref() != Some(profile_name) {
            record.profile_name = Some(profile_name.to_owned());
            changed = true;
        }
    }

    changed
}

/// Moves a record through the state machine, applying the timestamp and
/// QR-code side effects of the edge. Returns false if the edge is disallowed.
pub(crate) fn apply_status_change(record: &mut InstanceRecord, target: ConnectionStatus) -> bool {
    let from = record.connection_status;
    if from == target {
        return false;
    }
    if !is_allowed_transition(from, target) {
        return false;
    }

    record.connection_status = target;
    match target {
        ConnectionStatus::Ready => {
            record.qr_code = None;
            record.date_connected = Some(Utc::now());
            info!(instance = %record.id, "instance connected");
        }
        ConnectionStatus::Disconnected | ConnectionStatus::Error => {
            record.date_disconnected = Some(Utc::now());
        }
        _ => {}
    }

    true
}

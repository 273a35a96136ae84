//! Engine facade: the commands the rest of the product submits.
//!
//! Owns the wiring between the repository, the session-server boundary, the
//! QR polling controller and the reconciler, and keeps a per-instance
//! broadcast of polling progress for UI feedback.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    errors::AppError,
    governor::TaskGovernor,
    polling::{QrPollEvent, QrPollOptions, QrPollingController},
    reconcile::{ReconcileReport, ReconcileScope, Reconciler},
    repo::{InstanceRecord, InstanceRepository},
    session_server::SessionServer,
    sync::{Observation, StatusSync},
};

/// Inbound event pushed by the session server's webhook.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    pub instance_id: Uuid,
    pub status: String,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub profile_name: Option<String>,
}

pub struct Engine {
    repo: Arc<dyn InstanceRepository>,
    server: Arc<dyn SessionServer>,
    sync: Arc<StatusSync>,
    reconciler: Reconciler,
    polling: QrPollingController,
    poll_subscribers: DashMap<Uuid, broadcast::Sender<QrPollEvent>>,
    poll_options: QrPollOptions,
}

impl Engine {
    pub fn new(
        repo: Arc<dyn InstanceRepository>,
        server: Arc<dyn SessionServer>,
        governor: Arc<TaskGovernor>,
        config: &AppConfig,
    ) -> Self {
        let sync = Arc::new(StatusSync::new(
            repo.clone(),
            server.clone(),
            config.engine.default_country_code.clone(),
        ));
        let reconciler = Reconciler::new(
            repo.clone(),
            server.clone(),
            sync.clone(),
            config.engine.default_country_code.clone(),
        );
        let polling = QrPollingController::new(server.clone(), governor);

        Self {
            repo,
            server,
            sync,
            reconciler,
            polling,
            poll_subscribers: DashMap::new(),
            poll_options: QrPollOptions::from(&config.polling),
        }
    }

    /// Creates a new instance: persists the row, asks the session server to
    /// start a socket, and begins QR polling. Returns the stored record as of
    /// the session being bound.
    pub async fn create_instance(self: &Arc<Self>, owner_id: &str) -> Result<InstanceRecord, AppError> {
        let owner_id = owner_id.trim();
        if owner_id.is_empty() {
            return Err(AppError::bad_request("ownerId must not be empty"));
        }

        let mut record = InstanceRecord::new(owner_id);
        record.connection_status = crate::status::ConnectionStatus::Connecting;
        self.repo.upsert(&record).await?;
        let id = record.id;
        info!(instance = %id, owner = owner_id, "instance creation requested");

        let created = match self.server.create_session(id, owner_id).await {
            Ok(created) => created,
            Err(error) => {
                self.sync.mark_error(id, &error.to_string()).await?;
                return Err(error.into());
            }
        };

        self.sync
            .bind_session(id, &created.session_id, &created.initial_status)
            .await?;

        self.start_polling(id, created.session_id.clone());

        self.repo
            .get(id)
            .await?
            .ok_or_else(|| AppError::internal("instance row vanished during creation"))
    }

    /// Subscribes to QR polling progress for one instance, when a polling
    /// session is active.
    pub fn subscribe_polling(&self, id: Uuid) -> Option<broadcast::Receiver<QrPollEvent>> {
        self.poll_subscribers
            .get(&id)
            .map(|sender| sender.subscribe())
    }

    fn start_polling(self: &Arc<Self>, id: Uuid, session_id: String) {
        let mut events = self.polling.start(id, session_id, self.poll_options);

        let (broadcast_tx, _) = broadcast::channel(32);
        self.poll_subscribers.insert(id, broadcast_tx.clone());

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let applied = match &event {
                    QrPollEvent::Progress { .. } => Ok(()),
                    QrPollEvent::Success { code } => engine.sync.mark_qr_generated(id, code).await,
                    QrPollEvent::Timeout => {
                        engine.sync.mark_error(id, "pairing code timed out").await
                    }
                    QrPollEvent::Failed { message } => engine.sync.mark_error(id, message).await,
                };
                if let Err(error) = applied {
                    warn!(instance = %id, "failed to apply polling event: {error}");
                }

                // Broadcast after the row is updated so subscribers that
                // re-read the record observe the event's effect.
                let _ = broadcast_tx.send(event);
            }
            engine.poll_subscribers.remove(&id);
        });
    }

    /// Deletes an instance: stops polling, deletes the live session handle
    /// (best effort) and removes the row.
    pub async fn delete_instance(&self, id: Uuid) -> Result<(), AppError> {
        let record = self
            .repo
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("instance {id} not found")))?;

        self.polling.stop(id);

        if let Some(session_id) = record.external_session_id.as_deref() {
            if let Err(error) = self.server.delete_session(session_id).await {
                warn!(instance = %id, session = session_id, "session teardown failed: {error}");
            }
        }

        self.repo.delete(id).await?;
        info!(instance = %id, "instance deleted");
        Ok(())
    }

    /// Applies an inbound webhook event with status-sync merge semantics.
    pub async fn ingest_event(&self, event: InboundEvent) -> Result<bool, AppError> {
        self.sync
            .apply_observation(
                event.instance_id,
                Observation {
                    raw_status: Some(event.status),
                    phone: event.phone,
                    profile_name: event.profile_name,
                },
            )
            .await
    }

    /// Runs one reconciliation pass over the requested scope.
    pub async fn reconcile(&self, scope: ReconcileScope) -> Result<ReconcileReport, AppError> {
        self.reconciler.run(scope).await
    }

    /// Pull-based status sync for one instance.
    pub async fn sync_instance(&self, id: Uuid) -> Result<bool, AppError> {
        self.sync.sync(id).await
    }

    pub async fn get_instance(&self, id: Uuid) -> Result<Option<InstanceRecord>, AppError> {
        self.repo.get(id).await
    }

    pub async fn list_instances(
        &self,
        owner_id: Option<&str>,
    ) -> Result<Vec<InstanceRecord>, AppError> {
        self.repo.list(owner_id).await
    }

    /// Stops any in-flight polling loops; used at shutdown.
    pub fn stop_all_polling(&self) {
        for entry in self.poll_subscribers.iter() {
            self.polling.stop(*entry.key());
        }
    }
}

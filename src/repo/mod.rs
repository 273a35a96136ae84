//! Durable store of `Instance` records: the single source of truth the rest
//! of the product reads. The engine talks to it through [`InstanceRepository`]
//! so tests and database-less deployments can run on the in-memory variant.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{errors::AppError, status::ConnectionStatus};

pub use memory::InMemoryRepository;
pub use pg::PgRepository;

/// Durable record of one WhatsApp connection owned by a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRecord {
    pub id: Uuid,
    /// Session-server-side identifier; unique when set, null until created.
    pub external_session_id: Option<String>,
    /// E.164-like digit string. Once non-empty it is only overwritten by
    /// explicit recovery, never silently by a later partial event.
    pub phone: Option<String>,
    /// Marks phones recovered through the normalizer's tail fallback.
    pub phone_unconfirmed: bool,
    pub connection_status: ConnectionStatus,
    /// Last raw vocabulary string seen from the session server. Diagnostics
    /// only; business logic consumes `connection_status`.
    pub external_status_raw: Option<String>,
    pub qr_code: Option<String>,
    pub profile_name: Option<String>,
    pub date_connected: Option<DateTime<Utc>>,
    pub date_disconnected: Option<DateTime<Utc>>,
    pub owner_id: String,
}

impl InstanceRecord {
    /// Fresh record for a creation request, before the session server is asked
    /// to start a socket.
    pub fn new(owner_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_session_id: None,
            phone: None,
            phone_unconfirmed: false,
            connection_status: ConnectionStatus::Disconnected,
            external_status_raw: None,
            qr_code: None,
            profile_name: None,
            date_connected: None,
            date_disconnected: None,
            owner_id: owner_id.to_owned(),
        }
    }
}

#[async_trait]
pub trait InstanceRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<InstanceRecord>, AppError>;

    async fn find_by_session(
        &self,
        external_session_id: &str,
    ) -> Result<Option<InstanceRecord>, AppError>;

    /// Lists instances, optionally restricted to one owner/tenant.
    async fn list(&self, owner_id: Option<&str>) -> Result<Vec<InstanceRecord>, AppError>;

    /// Inserts or fully replaces a record by id.
    async fn upsert(&self, record: &InstanceRecord) -> Result<(), AppError>;

    async fn delete(&self, id: Uuid) -> Result<(), AppError>;
}

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::AppError;

use super::{InstanceRecord, InstanceRepository};

/// Map-backed repository for tests and database-less deployments.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    records: RwLock<HashMap<Uuid, InstanceRecord>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InstanceRepository for InMemoryRepository {
    async fn get(&self, id: Uuid) -> Result<Option<InstanceRecord>, AppError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn find_by_session(
        &self,
        external_session_id: &str,
    ) -> Result<Option<InstanceRecord>, AppError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|record| {
                record.external_session_id.as_deref() == Some(external_session_id)
            })
            .cloned())
    }

    async fn list(&self, owner_id: Option<&str>) -> Result<Vec<InstanceRecord>, AppError> {
        let records = self.records.read().await;
        let mut result: Vec<InstanceRecord> = records
            .values()
            .filter(|record| owner_id.is_none_or(|owner| record.owner_id == owner))
            .cloned()
            .collect();
        result.sort_by_key(|record| record.id);
        Ok(result)
    }

    async fn upsert(&self, record: &InstanceRecord) -> Result<(), AppError> {
        self.records
            .write()
            .await
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        self.records.write().await.remove(&id);
        Ok(())
    }
}

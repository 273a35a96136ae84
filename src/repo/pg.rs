use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgPoolOptions, postgres::PgRow};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;

use super::{InstanceRecord, InstanceRepository};

const SELECT_COLUMNS: &str = "id, external_session_id, phone, phone_unconfirmed, \
     connection_status, external_status_raw, qr_code, profile_name, \
     date_connected, date_disconnected, owner_id";

#[derive(Debug)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub async fn connect(uri: &str) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new().max_connections(10).connect(uri).await?;
        Ok(Self { pool })
    }

    /// Creates the `instances` table when missing.
    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS instances (
                id UUID PRIMARY KEY,
                external_session_id TEXT UNIQUE,
                phone TEXT,
                phone_unconfirmed BOOLEAN NOT NULL DEFAULT FALSE,
                connection_status TEXT NOT NULL,
                external_status_raw TEXT,
                qr_code TEXT,
                profile_name TEXT,
                date_connected TIMESTAMPTZ,
                date_disconnected TIMESTAMPTZ,
                owner_id TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("schema check passed for instances table");
        Ok(())
    }

    fn decode_row(row: &PgRow) -> Result<InstanceRecord, AppError> {
        let status: String = row.try_get("connection_status")?;
        let connection_status = status
            .parse()
            .map_err(|error| AppError::Config(format!("corrupt instance row: {error}")))?;

        Ok(InstanceRecord {
            id: row.try_get::<Uuid, _>("id")?,
            external_session_id: row.try_get::<Option<String>, _>("external_session_id")?,
            phone: row.try_get::<Option<String>, _>("phone")?,
            phone_unconfirmed: row.try_get::<bool, _>("phone_unconfirmed")?,
            connection_status,
            external_status_raw: row.try_get::<Option<String>, _>("external_status_raw")?,
            qr_code: row.try_get::<Option<String>, _>("qr_code")?,
            profile_name: row.try_get::<Option<String>, _>("profile_name")?,
            date_connected: row.try_get::<Option<DateTime<Utc>>, _>("date_connected")?,
            date_disconnected: row.try_get::<Option<DateTime<Utc>>, _>("date_disconnected")?,
            owner_id: row.try_get::<String, _>("owner_id")?,
        })
    }
}

#[async_trait]
impl InstanceRepository for PgRepository {
    async fn get(&self, id: Uuid) -> Result<Option<InstanceRecord>, AppError> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM instances WHERE id = $1");
        let row = sqlx::query(&query).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::decode_row).transpose()
    }

    async fn find_by_session(
        &self,
        external_session_id: &str,
    ) -> Result<Option<InstanceRecord>, AppError> {
        let query =
            format!("SELECT {SELECT_COLUMNS} FROM instances WHERE external_session_id = $1");
        let row = sqlx::query(&query)
            .bind(external_session_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::decode_row).transpose()
    }

    async fn list(&self, owner_id: Option<&str>) -> Result<Vec<InstanceRecord>, AppError> {
        let rows = match owner_id {
            Some(owner) => {
                let query =
                    format!("SELECT {SELECT_COLUMNS} FROM instances WHERE owner_id = $1 ORDER BY id");
                sqlx::query(&query).bind(owner).fetch_all(&self.pool).await?
            }
            None => {
                let query = format!("SELECT {SELECT_COLUMNS} FROM instances ORDER BY id");
                sqlx::query(&query).fetch_all(&self.pool).await?
            }
        };

        rows.iter().map(Self::decode_row).collect()
    }

    async fn upsert(&self, record: &InstanceRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO instances (
                id, external_session_id, phone, phone_unconfirmed, connection_status,
                external_status_raw, qr_code, profile_name, date_connected,
                date_disconnected, owner_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                external_session_id = EXCLUDED.external_session_id,
                phone = EXCLUDED.phone,
                phone_unconfirmed = EXCLUDED.phone_unconfirmed,
                connection_status = EXCLUDED.connection_status,
                external_status_raw = EXCLUDED.external_status_raw,
                qr_code = EXCLUDED.qr_code,
                profile_name = EXCLUDED.profile_name,
                date_connected = EXCLUDED.date_connected,
                date_disconnected = EXCLUDED.date_disconnected,
                owner_id = EXCLUDED.owner_id
            "#,
        )
        .bind(record.id)
        .bind(&record.external_session_id)
        .bind(&record.phone)
        .bind(record.phone_unconfirmed)
        .bind(record.connection_status.as_str())
        .bind(&record.external_status_raw)
        .bind(&record.qr_code)
        .bind(&record.profile_name)
        .bind(record.date_connected)
        .bind(record.date_disconnected)
        .bind(&record.owner_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM instances WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

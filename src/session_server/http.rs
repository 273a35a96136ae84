use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use crate::config::SessionServerConfig;

use super::{
    CreatedSession, LiveSession, PairingCode, SessionServer, SessionServerError, SessionStatus,
};

/// JSON-over-HTTP client for the session server process.
#[derive(Debug, Clone)]
pub struct HttpSessionServer {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpSessionServer {
    pub fn new(config: &SessionServerConfig) -> Result<Self, SessionServerError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("apikey", key),
            None => request,
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, SessionServerError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SessionServerError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<T>().await?)
    }

    fn map_send_error(error: reqwest::Error) -> SessionServerError {
        if error.is_timeout() {
            SessionServerError::Timeout
        } else {
            SessionServerError::Transport(error)
        }
    }
}

#[async_trait]
impl SessionServer for HttpSessionServer {
    async fn create_session(
        &self,
        instance_id: Uuid,
        owner_id: &str,
    ) -> Result<CreatedSession, SessionServerError> {
        let response = self
            .with_auth(self.client.post(self.url("/session/create")))
            .json(&json!({ "instanceId": instance_id, "ownerId": owner_id }))
            .send()
            .await
            .map_err(Self::map_send_error)?;

        Self::decode(response).await
    }

    async fn pairing_code(&self, session_id: &str) -> Result<PairingCode, SessionServerError> {
        let response = self
            .with_auth(
                self.client
                    .get(self.url(&format!("/session/{session_id}/pairing-code"))),
            )
            .send()
            .await
            .map_err(Self::map_send_error)?;

        // 202 means "still generating": not an attempt, not an error.
        if response.status() == StatusCode::ACCEPTED {
            return Ok(PairingCode {
                ready: false,
                code: None,
                generating: true,
            });
        }

        Self::decode(response).await
    }

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus, SessionServerError> {
        let response = self
            .with_auth(
                self.client
                    .get(self.url(&format!("/session/{session_id}/status"))),
            )
            .send()
            .await
            .map_err(Self::map_send_error)?;

        Self::decode(response).await
    }

    async fn list_live_sessions(&self) -> Result<Vec<LiveSession>, SessionServerError> {
        let response = self
            .with_auth(self.client.get(self.url("/session/list")))
            .send()
            .await
            .map_err(Self::map_send_error)?;

        Self::decode(response).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), SessionServerError> {
        let response = self
            .with_auth(
                self.client
                    .delete(self.url(&format!("/session/{session_id}"))),
            )
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status();
        // Deleting an already-gone session is a success for our purposes.
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }

        Err(SessionServerError::Rejected {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        })
    }
}

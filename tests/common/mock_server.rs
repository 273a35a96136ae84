use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};

use async_trait::async_trait;
use uuid::Uuid;

use sessionwarp::session_server::{
    CreatedSession, LiveSession, PairingCode, SessionServer, SessionServerError, SessionStatus,
};

/// Scripted session server double.
///
/// Pairing-code replies are consumed from a queue (repeating "not ready" once
/// exhausted); statuses and the live list are plain maps the test mutates.
#[derive(Default)]
pub struct MockSessionServer {
    pub pairing_script: Mutex<VecDeque<PairingCode>>,
    pub statuses: Mutex<HashMap<String, SessionStatus>>,
    pub live: Mutex<Vec<LiveSession>>,
    pub deleted: Mutex<Vec<String>>,
    pub polls: AtomicU32,
    pub fail_create: AtomicBool,
}

impl MockSessionServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn not_ready() -> PairingCode {
        PairingCode {
            ready: false,
            code: None,
            generating: false,
        }
    }

    pub fn generating() -> PairingCode {
        PairingCode {
            ready: false,
            code: None,
            generating: true,
        }
    }

    pub fn ready(code: &str) -> PairingCode {
        PairingCode {
            ready: true,
            code: Some(code.to_owned()),
            generating: false,
        }
    }

    pub fn script_pairing(&self, replies: impl IntoIterator<Item = PairingCode>) {
        self.pairing_script
            .lock()
            .expect("pairing script lock")
            .extend(replies);
    }

    pub fn set_status(&self, session_id: &str, status: SessionStatus) {
        self.statuses
            .lock()
            .expect("statuses lock")
            .insert(session_id.to_owned(), status);
    }

    pub fn add_live(&self, session: LiveSession) {
        self.live.lock().expect("live lock").push(session);
    }

    pub fn poll_count(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn deleted_sessions(&self) -> Vec<String> {
        self.deleted.lock().expect("deleted lock").clone()
    }
}

#[async_trait]
impl SessionServer for MockSessionServer {
    async fn create_session(
        &self,
        instance_id: Uuid,
        _owner_id: &str,
    ) -> Result<CreatedSession, SessionServerError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(SessionServerError::Timeout);
        }
        Ok(CreatedSession {
            session_id: format!("sess-{instance_id}"),
            initial_status: "created".to_owned(),
        })
    }

    async fn pairing_code(&self, _session_id: &str) -> Result<PairingCode, SessionServerError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .pairing_script
            .lock()
            .expect("pairing script lock")
            .pop_front()
            .unwrap_or_else(Self::not_ready))
    }

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus, SessionServerError> {
        Ok(self
            .statuses
            .lock()
            .expect("statuses lock")
            .get(session_id)
            .cloned()
            .unwrap_or(SessionStatus {
                raw_status: "connecting".to_owned(),
                phone: None,
                profile_name: None,
            }))
    }

    async fn list_live_sessions(&self) -> Result<Vec<LiveSession>, SessionServerError> {
        Ok(self.live.lock().expect("live lock").clone())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), SessionServerError> {
        self.deleted
            .lock()
            .expect("deleted lock")
            .push(session_id.to_owned());
        self.live
            .lock()
            .expect("live lock")
            .retain(|session| session.session_id != session_id);
        Ok(())
    }
}

//! Bounded, cancellable acquisition of pairing codes.
//!
//! One short-lived polling session exists per instance creation. Each tick
//! asks the session server for the current pairing code; the loop ends on the
//! first of success, attempt exhaustion, or wall-clock timeout, and exactly
//! one terminal event is emitted. The wall-clock guard runs independently of
//! the tick cadence, so a slow but steadily-answering server is still cut off
//! on time.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{config::PollingConfig, governor::TaskGovernor, session_server::SessionServer};

/// Progress and terminal events of one polling session.
///
/// `Progress` fires after every consumed attempt; exactly one of the other
/// variants terminates the stream (explicit [`QrPollingController::stop`]
/// closes it without a terminal event, since the caller already knows).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrPollEvent {
    Progress { attempt: u32, max: u32 },
    Success { code: String },
    Timeout,
    Failed { message: String },
}

/// Tuning for one polling session, usually taken from [`PollingConfig`].
#[derive(Debug, Clone, Copy)]
pub struct QrPollOptions {
    pub max_attempts: u32,
    pub interval: Duration,
    pub timeout: Duration,
}

impl From<&PollingConfig> for QrPollOptions {
    fn from(config: &PollingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            interval: Duration::from_millis(config.interval_ms.max(1)),
            timeout: Duration::from_millis(config.timeout_ms.max(1)),
        }
    }
}

pub struct QrPollingController {
    server: Arc<dyn SessionServer>,
    governor: Arc<TaskGovernor>,
    active: Arc<DashMap<Uuid, ()>>,
}

impl QrPollingController {
    pub fn new(server: Arc<dyn SessionServer>, governor: Arc<TaskGovernor>) -> Self {
        Self {
            server,
            governor,
            active: Arc::new(DashMap::new()),
        }
    }

    fn task_id(instance_id: Uuid) -> String {
        format!("qr-poll:{instance_id}")
    }

    /// Starts polling for `instance_id` and returns its event stream.
    ///
    /// At most one polling session runs per instance: any session already
    /// active for this instance is cancelled first.
    pub fn start(
        &self,
        instance_id: Uuid,
        session_id: String,
        options: QrPollOptions,
    ) -> mpsc::Receiver<QrPollEvent> {
        self.stop(instance_id);

        let task_id = Self::task_id(instance_id);
        let token = self
            .governor
            .register(&task_id, "qr pairing-code polling loop");
        self.active.insert(instance_id, ());

        let (tx, rx) = mpsc::channel(options.max_attempts.max(1) as usize + 1);
        let server = self.server.clone();
        let governor = self.governor.clone();
        let active = self.active.clone();

        tokio::spawn(async move {
            let deadline = Instant::now() + options.timeout;
            let mut ticker = tokio::time::interval(options.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut attempt = 0u32;

            let terminal = loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break None,
                    _ = tokio::time::sleep_until(deadline) => break Some(QrPollEvent::Timeout),
                    _ = ticker.tick() => {}
                }

                governor.touch(&task_id);

                match server.pairing_code(&session_id).await {
                    Ok(reply) if reply.ready && reply.code.is_some() => {
                        let code = reply.code.unwrap_or_default();
                        break Some(QrPollEvent::Success { code });
                    }
                    Ok(reply) if reply.generating => {
                        // Server is still producing the code; does not
                        // consume an attempt.
                        debug!(instance = %instance_id, "pairing code still generating");
                        continue;
                    }
                    Ok(_) => {
                        attempt += 1;
                    }
                    Err(error) => {
                        // Transport errors are retried on the next tick,
                        // never in a tight loop.
                        warn!(instance = %instance_id, attempt, "pairing code poll failed: {error}");
                        attempt += 1;
                    }
                }

                if attempt >= options.max_attempts {
                    break Some(QrPollEvent::Failed {
                        message: format!(
                            "no pairing code after {} attempts",
                            options.max_attempts
                        ),
                    });
                }

                let _ = tx
                    .send(QrPollEvent::Progress {
                        attempt,
                        max: options.max_attempts,
                    })
                    .await;
            };

            if let Some(event) = terminal {
                let _ = tx.send(event).await;
            }

            // When our token was cancelled (stop or replacement), the
            // registry entry already belongs to someone else.
            if !token.is_cancelled() {
                active.remove(&instance_id);
                governor.deregister(&task_id);
            }
        });

        rx
    }

    /// Cancels any active polling session for this instance. Idempotent; the
    /// governor token tears down both the tick loop and the timeout guard.
    pub fn stop(&self, instance_id: Uuid) {
        if self.active.remove(&instance_id).is_some() {
            debug!(instance = %instance_id, "stopping active qr polling session");
        }
        self.governor.deregister(&Self::task_id(instance_id));
    }

    pub fn is_polling(&self, instance_id: Uuid) -> bool {
        self.active.contains_key(&instance_id)
    }
}

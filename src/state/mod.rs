use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::{config::AppConfig, engine::Engine, governor::TaskGovernor};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub engine: Arc<Engine>,
    pub governor: Arc<TaskGovernor>,
    ready: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, engine: Arc<Engine>, governor: Arc<TaskGovernor>) -> Self {
        Self {
            config,
            engine,
            governor,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

pub mod bootstrap;
pub mod config;
pub mod engine;
pub mod errors;
pub mod governor;
pub mod http;
pub mod normalize;
pub mod polling;
pub mod reconcile;
pub mod recovery;
pub mod repo;
pub mod session_server;
pub mod state;
pub mod status;
pub mod sync;

/// Starts the sessionwarp runtime.
pub async fn run() -> Result<(), errors::AppError> {
    bootstrap::run().await
}

use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    config::AppConfig,
    engine::Engine,
    errors::AppError,
    governor::{self, TaskGovernor},
    http,
    recovery,
    repo::{InMemoryRepository, InstanceRepository, PgRepository},
    session_server::{HttpSessionServer, SessionServer},
    state::AppState,
};

pub async fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Arc::new(AppConfig::from_env());

    let repo = build_repository(&config).await?;
    let server: Arc<dyn SessionServer> = Arc::new(HttpSessionServer::new(&config.session_server)?);

    let governor = Arc::new(TaskGovernor::new());
    let sweeper_token = governor::spawn_sweeper(governor.clone(), &config.governor);

    let engine = Arc::new(Engine::new(repo, server, governor.clone(), &config));

    recovery::spawn_startup_recovery(
        engine.clone(),
        governor.clone(),
        Duration::from_secs(config.recovery.startup_delay_secs),
    );

    let state = AppState::new(config.clone(), engine.clone(), governor.clone());
    state.set_ready(true);

    let app = http::build_router(state);
    serve(&config, app).await?;

    // Shutdown: stop polling loops and every governed timer.
    engine.stop_all_polling();
    sweeper_token.cancel();
    governor.force_cleanup_all();
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}

async fn build_repository(config: &AppConfig) -> Result<Arc<dyn InstanceRepository>, AppError> {
    if config.database.connection_uri.is_empty() {
        warn!("DATABASE_CONNECTION_URI not set, running on the in-memory repository");
        return Ok(Arc::new(InMemoryRepository::new()));
    }

    let repo = connect_repo_with_retry(&config.database.connection_uri).await?;
    repo.ensure_schema().await?;
    info!("Repository:PostgreSQL - ON");
    Ok(Arc::new(repo))
}

async fn connect_repo_with_retry(uri: &str) -> Result<PgRepository, AppError> {
    let max_attempts = 30u32;
    let wait = Duration::from_secs(2);

    for attempt in 1..=max_attempts {
        match PgRepository::connect(uri).await {
            Ok(repo) => return Ok(repo),
            Err(error) => {
                if attempt == max_attempts {
                    return Err(error);
                }
                warn!("PostgreSQL not ready (attempt {attempt}/{max_attempts}): {error}");
                tokio::time::sleep(wait).await;
            }
        }
    }

    Err(AppError::Config("unreachable retry branch".to_string()))
}

async fn serve(config: &AppConfig, app: axum::Router) -> Result<(), AppError> {
    let addr: SocketAddr = format!("0.0.0.0:{}", config.server.port)
        .parse()
        .map_err(|error: std::net::AddrParseError| AppError::Config(error.to_string()))?;

    info!("HTTP - ON: {}", config.server.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

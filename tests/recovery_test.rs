mod common;

use std::{sync::Arc, time::Duration};

use common::MockSessionServer;
use sessionwarp::{
    config::AppConfig,
    engine::Engine,
    governor::TaskGovernor,
    recovery::spawn_startup_recovery,
    repo::{InMemoryRepository, InstanceRepository},
    session_server::{LiveSession, SessionStatus},
    status::ConnectionStatus,
};

#[tokio::test(start_paused = true)]
async fn startup_pass_runs_once_after_the_boot_delay() {
    let config = AppConfig::default();
    let repo = Arc::new(InMemoryRepository::new());
    let server = Arc::new(MockSessionServer::new());
    let governor = Arc::new(TaskGovernor::new());
    let engine = Arc::new(Engine::new(
        repo.clone(),
        server.clone(),
        governor.clone(),
        &config,
    ));

    server.add_live(LiveSession {
        session_id: "S2".to_owned(),
        raw_status: "ready".to_owned(),
        phone: None,
        profile_name: None,
    });
    server.set_status(
        "S2",
        SessionStatus {
            raw_status: "ready".to_owned(),
            phone: None,
            profile_name: None,
        },
    );

    spawn_startup_recovery(engine, governor.clone(), Duration::from_secs(5));

    // Nothing happens before the delay elapses.
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(repo.list(None).await.expect("list").is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    let rows = repo.list(None).await.expect("list");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].connection_status, ConnectionStatus::Ready);

    // The one-shot task deregisters itself once finished.
    assert_eq!(governor.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn replaced_recovery_leaves_the_new_registration_alone() {
    let config = AppConfig::default();
    let repo = Arc::new(InMemoryRepository::new());
    let server = Arc::new(MockSessionServer::new());
    let governor = Arc::new(TaskGovernor::new());
    let engine = Arc::new(Engine::new(
        repo.clone(),
        server.clone(),
        governor.clone(),
        &config,
    ));

    spawn_startup_recovery(engine, governor.clone(), Duration::from_secs(5));

    // Re-registering the id cancels the recovery task's token; the dying
    // task must not tear down the replacement's registry entry.
    let replacement = governor.register("startup-recovery", "replacement");

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(!replacement.is_cancelled());
    assert_eq!(governor.active_count(), 1);
    assert!(repo.list(None).await.expect("list").is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancelled_recovery_never_runs() {
    let config = AppConfig::default();
    let repo = Arc::new(InMemoryRepository::new());
    let server = Arc::new(MockSessionServer::new());
    let governor = Arc::new(TaskGovernor::new());
    let engine = Arc::new(Engine::new(
        repo.clone(),
        server.clone(),
        governor.clone(),
        &config,
    ));
    server.add_live(LiveSession {
        session_id: "S2".to_owned(),
        raw_status: "ready".to_owned(),
        phone: None,
        profile_name: None,
    });

    spawn_startup_recovery(engine, governor.clone(), Duration::from_secs(5));
    governor.force_cleanup_all();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(repo.list(None).await.expect("list").is_empty());
}

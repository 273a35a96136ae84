mod common;

use std::sync::Arc;

use common::MockSessionServer;
use sessionwarp::{
    repo::{InMemoryRepository, InstanceRecord, InstanceRepository},
    session_server::SessionStatus,
    status::ConnectionStatus,
    sync::{Observation, StatusSync},
};
use uuid::Uuid;

fn service(
    repo: Arc<InMemoryRepository>,
    server: Arc<MockSessionServer>,
) -> StatusSync {
    StatusSync::new(repo, server, "55".to_owned())
}

async fn seed(
    repo: &InMemoryRepository,
    status: ConnectionStatus,
    mutate: impl FnOnce(&mut InstanceRecord),
) -> Uuid {
    let mut record = InstanceRecord::new("tenant-1");
    record.connection_status = status;
    mutate(&mut record);
    repo.upsert(&record).await.expect("seed instance");
    record.id
}

#[tokio::test]
async fn never_replaces_a_stored_phone_with_a_different_one() {
    let repo = Arc::new(InMemoryRepository::new());
    let server = Arc::new(MockSessionServer::new());
    let id = seed(&repo, ConnectionStatus::Ready, |record| {
        record.phone = Some("5511987654321".to_owned());
        record.external_status_raw = Some("connected".to_owned());
    })
    .await;

    let sync = service(repo.clone(), server);
    let changed = sync
        .apply_observation(
            id,
            Observation {
                raw_status: Some("connected".to_owned()),
                phone: Some("5521999998888".to_owned()),
                profile_name: None,
            },
        )
        .await
        .expect("apply observation");

    assert!(!changed);
    let record = repo.get(id).await.expect("get").expect("record");
    assert_eq!(record.phone.as_deref(), Some("5511987654321"));
}

#[tokio::test]
async fn populates_phone_only_when_previously_empty() {
    let repo = Arc::new(InMemoryRepository::new());
    let server = Arc::new(MockSessionServer::new());
    let id = seed(&repo, ConnectionStatus::Ready, |record| {
        record.external_status_raw = Some("connected".to_owned());
    })
    .await;

    let sync = service(repo.clone(), server);
    let changed = sync
        .apply_observation(
            id,
            Observation {
                raw_status: Some("connected".to_owned()),
                phone: Some("11987654321".to_owned()),
                profile_name: None,
            },
        )
        .await
        .expect("apply observation");

    assert!(changed);
    let record = repo.get(id).await.expect("get").expect("record");
    assert_eq!(record.phone.as_deref(), Some("5511987654321"));
    assert!(!record.phone_unconfirmed);
}

#[tokio::test]
async fn unknown_raw_status_leaves_connection_status_unchanged() {
    let repo = Arc::new(InMemoryRepository::new());
    let server = Arc::new(MockSessionServer::new());
    let id = seed(&repo, ConnectionStatus::QrGenerated, |_| {}).await;

    let sync = service(repo.clone(), server);
    sync.apply_observation(
        id,
        Observation {
            raw_status: Some("vendor-gibberish".to_owned()),
            phone: None,
            profile_name: None,
        },
    )
    .await
    .expect("apply observation");

    let record = repo.get(id).await.expect("get").expect("record");
    assert_eq!(record.connection_status, ConnectionStatus::QrGenerated);
    // The raw string is still kept for diagnostics.
    assert_eq!(record.external_status_raw.as_deref(), Some("vendor-gibberish"));
}

#[tokio::test]
async fn entering_ready_clears_qr_and_stamps_date_connected() {
    let repo = Arc::new(InMemoryRepository::new());
    let server = Arc::new(MockSessionServer::new());
    let id = seed(&repo, ConnectionStatus::QrGenerated, |record| {
        record.qr_code = Some("QR-PAYLOAD".to_owned());
    })
    .await;

    let sync = service(repo.clone(), server);
    let changed = sync
        .apply_observation(
            id,
            Observation {
                raw_status: Some("open".to_owned()),
                phone: None,
                profile_name: None,
            },
        )
        .await
        .expect("apply observation");

    assert!(changed);
    let record = repo.get(id).await.expect("get").expect("record");
    assert_eq!(record.connection_status, ConnectionStatus::Ready);
    assert_eq!(record.qr_code, None);
    assert!(record.date_connected.is_some());
}

#[tokio::test]
async fn leaving_ready_stamps_date_disconnected() {
    let repo = Arc::new(InMemoryRepository::new());
    let server = Arc::new(MockSessionServer::new());
    let id = seed(&repo, ConnectionStatus::Ready, |_| {}).await;

    let sync = service(repo.clone(), server);
    sync.apply_observation(
        id,
        Observation {
            raw_status: Some("close".to_owned()),
            phone: None,
            profile_name: None,
        },
    )
    .await
    .expect("apply observation");

    let record = repo.get(id).await.expect("get").expect("record");
    assert_eq!(record.connection_status, ConnectionStatus::Disconnected);
    assert!(record.date_disconnected.is_some());
}

#[tokio::test]
async fn disallowed_edges_are_rejected_but_raw_is_recorded() {
    let repo = Arc::new(InMemoryRepository::new());
    let server = Arc::new(MockSessionServer::new());
    let id = seed(&repo, ConnectionStatus::Disconnected, |_| {}).await;

    let sync = service(repo.clone(), server);
    sync.apply_observation(
        id,
        Observation {
            raw_status: Some("connected".to_owned()),
            phone: None,
            profile_name: None,
        },
    )
    .await
    .expect("apply observation");

    let record = repo.get(id).await.expect("get").expect("record");
    // disconnected -> ready without passing through connecting is forbidden.
    assert_eq!(record.connection_status, ConnectionStatus::Disconnected);
    assert_eq!(record.external_status_raw.as_deref(), Some("connected"));
}

#[tokio::test]
async fn pull_sync_reports_changed_then_settles() {
    let repo = Arc::new(InMemoryRepository::new());
    let server = Arc::new(MockSessionServer::new());
    let id = seed(&repo, ConnectionStatus::QrGenerated, |record| {
        record.external_session_id = Some("sess-7".to_owned());
    })
    .await;
    server.set_status(
        "sess-7",
        SessionStatus {
            raw_status: "connected".to_owned(),
            phone: Some("5511987654321".to_owned()),
            profile_name: Some("Ana".to_owned()),
        },
    );

    let sync = service(repo.clone(), server);

    assert!(sync.sync(id).await.expect("first sync"));
    let record = repo.get(id).await.expect("get").expect("record");
    assert_eq!(record.connection_status, ConnectionStatus::Ready);
    assert_eq!(record.phone.as_deref(), Some("5511987654321"));
    assert_eq!(record.profile_name.as_deref(), Some("Ana"));

    // Second pull with an unchanged world is a no-op.
    assert!(!sync.sync(id).await.expect("second sync"));
}

mod common;

use std::{sync::Arc, time::Duration};

use common::MockSessionServer;
use sessionwarp::{
    governor::TaskGovernor,
    polling::{QrPollEvent, QrPollOptions, QrPollingController},
};
use uuid::Uuid;

fn controller(server: Arc<MockSessionServer>) -> (QrPollingController, Arc<TaskGovernor>) {
    let governor = Arc::new(TaskGovernor::new());
    (
        QrPollingController::new(server, governor.clone()),
        governor,
    )
}

async fn drain(mut rx: tokio::sync::mpsc::Receiver<QrPollEvent>) -> Vec<QrPollEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn emits_progress_then_exactly_one_success_on_attempt_three() {
    let server = Arc::new(MockSessionServer::new());
    server.script_pairing([
        MockSessionServer::not_ready(),
        MockSessionServer::not_ready(),
        MockSessionServer::ready("QR-CODE-3"),
    ]);

    let (controller, _governor) = controller(server.clone());
    let rx = controller.start(
        Uuid::new_v4(),
        "sess-1".to_owned(),
        QrPollOptions {
            max_attempts: 20,
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(60),
        },
    );

    let events = drain(rx).await;

    assert_eq!(
        events,
        vec![
            QrPollEvent::Progress { attempt: 1, max: 20 },
            QrPollEvent::Progress { attempt: 2, max: 20 },
            QrPollEvent::Success {
                code: "QR-CODE-3".to_owned()
            },
        ]
    );
    // No polls beyond the successful one.
    assert_eq!(server.poll_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn wall_clock_timeout_beats_a_generous_attempt_budget() {
    let server = Arc::new(MockSessionServer::new());

    let (controller, _governor) = controller(server.clone());
    let rx = controller.start(
        Uuid::new_v4(),
        "sess-1".to_owned(),
        QrPollOptions {
            max_attempts: 1000,
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(95),
        },
    );

    let events = drain(rx).await;

    assert_eq!(events.last(), Some(&QrPollEvent::Timeout));
    assert_eq!(
        events
            .iter()
            .filter(|event| !matches!(event, QrPollEvent::Progress { .. }))
            .count(),
        1,
        "exactly one terminal event"
    );
}

#[tokio::test(start_paused = true)]
async fn attempt_budget_exhaustion_fails_the_session() {
    let server = Arc::new(MockSessionServer::new());

    let (controller, _governor) = controller(server.clone());
    let rx = controller.start(
        Uuid::new_v4(),
        "sess-1".to_owned(),
        QrPollOptions {
            max_attempts: 4,
            interval: Duration::from_millis(10),
            timeout: Duration::from_secs(60),
        },
    );

    let events = drain(rx).await;

    assert_eq!(events.len(), 4);
    assert!(matches!(events[3], QrPollEvent::Failed { .. }));
    assert_eq!(server.poll_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn still_generating_replies_do_not_consume_attempts() {
    let server = Arc::new(MockSessionServer::new());
    server.script_pairing([
        MockSessionServer::generating(),
        MockSessionServer::generating(),
        MockSessionServer::not_ready(),
        MockSessionServer::ready("LATE-CODE"),
    ]);

    let (controller, _governor) = controller(server.clone());
    let rx = controller.start(
        Uuid::new_v4(),
        "sess-1".to_owned(),
        QrPollOptions {
            max_attempts: 2,
            interval: Duration::from_millis(10),
            timeout: Duration::from_secs(60),
        },
    );

    let events = drain(rx).await;

    // Two generating replies, then one real miss, then success: only one
    // attempt was consumed even though four polls happened.
    assert_eq!(
        events,
        vec![
            QrPollEvent::Progress { attempt: 1, max: 2 },
            QrPollEvent::Success {
                code: "LATE-CODE".to_owned()
            },
        ]
    );
    assert_eq!(server.poll_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn starting_again_cancels_the_previous_session_for_the_instance() {
    let server = Arc::new(MockSessionServer::new());
    let instance_id = Uuid::new_v4();

    let (controller, _governor) = controller(server.clone());
    let first = controller.start(
        instance_id,
        "sess-1".to_owned(),
        QrPollOptions {
            max_attempts: 100,
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(600),
        },
    );

    let second = controller.start(
        instance_id,
        "sess-1".to_owned(),
        QrPollOptions {
            max_attempts: 1,
            interval: Duration::from_millis(10),
            timeout: Duration::from_secs(60),
        },
    );

    // The replaced session ends without a terminal event.
    let first_events = drain(first).await;
    assert!(
        first_events
            .iter()
            .all(|event| matches!(event, QrPollEvent::Progress { .. })),
        "cancelled session must not emit a terminal event"
    );

    let second_events = drain(second).await;
    assert!(matches!(second_events.last(), Some(QrPollEvent::Failed { .. })));
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent() {
    let server = Arc::new(MockSessionServer::new());
    let instance_id = Uuid::new_v4();

    let (controller, governor) = controller(server);
    let rx = controller.start(
        instance_id,
        "sess-1".to_owned(),
        QrPollOptions {
            max_attempts: 100,
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(600),
        },
    );

    controller.stop(instance_id);
    controller.stop(instance_id);

    assert!(!controller.is_polling(instance_id));
    let events = drain(rx).await;
    assert!(events.iter().all(|event| matches!(event, QrPollEvent::Progress { .. })));
    assert_eq!(governor.active_count(), 0);
}

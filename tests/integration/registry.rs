use crate::*;

use skylink_client::{ClientError, StartError};
use skylink_core::control::RejectCode;

/// A requested identity that is already online is refused.
#[tokio::test]
async fn test_duplicate_uid_rejected() {
    let registry = spawn_registry().await;
    let (a, a_uid) = start_ready(&registry).await;

    let dup = ClientHandle::start(client_config(&registry).with_uid(a_uid));
    let err = dup.wait_registered(READY_TIMEOUT).await.unwrap_err();
    match err {
        ClientError::Start(StartError::Rejected { code, .. }) => {
            assert_eq!(code, RejectCode::DuplicateUid)
        }
        other => panic!("expected duplicate rejection, got {other:?}"),
    }

    dup.stop(STOP_GRACE).await;
    stop_all(&[&a], registry).await;
}

/// A requested identity is kept once the previous holder has left.
#[tokio::test]
async fn test_requested_uid_reused_after_leave() {
    let registry = spawn_registry().await;
    let (a, a_uid) = start_ready(&registry).await;
    a.stop(STOP_GRACE).await;

    let deadline = tokio::time::Instant::now() + DELIVERY_TIMEOUT;
    while registry.table().contains_key(&a_uid) && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let again = ClientHandle::start(client_config(&registry).with_uid(a_uid));
    assert_eq!(again.wait_registered(READY_TIMEOUT).await, Ok(a_uid));

    stop_all(&[&again], registry).await;
}

/// Counters and the client list are exposed through the status API handlers.
#[tokio::test]
async fn test_status_api_reflects_relay() {
    use skylink_api::handlers::{handle_clients, handle_status};
    use skylink_api::ApiState;

    let registry = spawn_registry().await;
    let (a, a_uid) = start_ready(&registry).await;
    let (b, b_uid) = start_ready(&registry).await;
    let (_h, mut streams) = inbound(&b);

    a.open_stream(b_uid).send(&b"counted"[..]).await.unwrap();
    recv_within(&mut streams).await.expect("inbound stream");

    let state = ApiState {
        table: registry.table(),
        stats: registry.stats(),
    };
    let axum::Json(status) = handle_status(axum::extract::State(state.clone())).await;
    assert_eq!(status.clients_online, 2);
    assert_eq!(status.frames_relayed, 1);

    let axum::Json(clients) = handle_clients(axum::extract::State(state)).await;
    let uids: Vec<String> = clients.clients.iter().map(|c| c.uid.clone()).collect();
    assert!(uids.contains(&a_uid.to_string()));
    assert!(uids.contains(&b_uid.to_string()));
    assert!(clients.clients.iter().all(|c| c.parent == TEST_PARENT));

    stop_all(&[&a, &b], registry).await;
}

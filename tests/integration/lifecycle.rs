use crate::*;

use skylink_client::{ClientError, StartError, StopOutcome};
use skylink_core::BootstrapAddr;

/// Two handles started together both become ready.
#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_start_reaches_readiness() {
    let registry = spawn_registry().await;
    let a = ClientHandle::start(client_config(&registry));
    let b = ClientHandle::start(client_config(&registry));

    let (ready_a, ready_b) = tokio::join!(a.wait_ready(READY_TIMEOUT), b.wait_ready(READY_TIMEOUT));
    assert!(ready_a && ready_b, "both clients should register");
    assert_ne!(a.uid(), b.uid());
    assert_eq!(registry.table().len(), 2);

    stop_all(&[&a, &b], registry).await;
}

/// Nothing listens on port 1: readiness fails instead of hanging.
#[tokio::test]
async fn test_unreachable_bootstrap_fails_readiness() {
    let config = ClientConfig::new(test_parent(), vec![BootstrapAddr::tcp("127.0.0.1", 1)])
        .with_register_timeout(READY_TIMEOUT);
    let client = ClientHandle::start(config);

    let err = client.wait_registered(READY_TIMEOUT).await.unwrap_err();
    assert!(
        matches!(err, ClientError::Start(StartError::Unreachable { .. })),
        "unexpected error: {err}"
    );
    client.stop(STOP_GRACE).await;
}

/// The second bootstrap address is used when the first refuses.
#[tokio::test]
async fn test_falls_through_bootstrap_list() {
    let registry = spawn_registry().await;
    let config = client_config(&registry).with_bootstrap(vec![
        BootstrapAddr::tcp("127.0.0.1", 1),
        registry.bootstrap_addr(),
    ]);
    let client = ClientHandle::start(config);
    assert!(client.wait_ready(READY_TIMEOUT).await);

    stop_all(&[&client], registry).await;
}

/// A second stop returns at once; the registry forgets the client.
#[tokio::test]
async fn test_stop_is_idempotent() {
    let registry = spawn_registry().await;
    let (a, a_uid) = start_ready(&registry).await;
    let stream = a.open_stream(Uid::random());

    assert_eq!(a.stop(STOP_GRACE).await, StopOutcome::Graceful);
    let started = std::time::Instant::now();
    assert_eq!(a.stop(STOP_GRACE).await, StopOutcome::AlreadyStopped);
    assert!(started.elapsed() < Duration::from_millis(100));

    assert!(stream.is_closed());
    assert_eq!(
        a.open_stream(Uid::random()).send(&b"late"[..]).await,
        Err(ClientError::StreamClosed)
    );

    let deadline = tokio::time::Instant::now() + DELIVERY_TIMEOUT;
    while registry.table().contains_key(&a_uid) && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!registry.table().contains_key(&a_uid));

    registry.shutdown().await;
}

/// The registry answers ping; the round-trip time is recorded.
#[tokio::test]
async fn test_ping_records_rtt() {
    let registry = spawn_registry().await;
    let (a, _) = start_ready(&registry).await;
    assert!(a.last_rtt().is_none());

    a.ping();
    let deadline = tokio::time::Instant::now() + DELIVERY_TIMEOUT;
    while a.last_rtt().is_none() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(a.last_rtt().is_some());

    stop_all(&[&a], registry).await;
}

/// Losing the registry closes streams and fails later sends.
#[tokio::test]
async fn test_registry_loss_disconnects() {
    let registry = spawn_registry().await;
    let (a, _) = start_ready(&registry).await;
    let stream = a.open_stream(Uid::random());

    registry.shutdown().await;

    let deadline = tokio::time::Instant::now() + DELIVERY_TIMEOUT;
    while !stream.is_closed() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(stream.is_closed());
    assert_eq!(
        a.open_stream(Uid::random()).send(&b"x"[..]).await,
        Err(ClientError::Disconnected)
    );

    a.stop(STOP_GRACE).await;
}

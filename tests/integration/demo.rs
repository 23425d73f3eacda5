use crate::*;

use skylink_demo::cmd::{ping_pong, point_to_point, Environment};

#[tokio::test(flavor = "multi_thread")]
async fn test_demo_point_to_point_succeeds() {
    let registry = spawn_registry().await;
    let env = Environment::with_config(client_config(&registry), STOP_GRACE);

    let delivered = point_to_point::run(env, DELIVERY_TIMEOUT).await.unwrap();
    assert!(delivered);

    registry.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_demo_ping_pong_succeeds() {
    let registry = spawn_registry().await;
    let env = Environment::with_config(client_config(&registry), STOP_GRACE);

    assert!(ping_pong::run(env, 3, DELIVERY_TIMEOUT).await.unwrap());

    registry.shutdown().await;
}

/// Without a registry the demo reports failure instead of hanging.
#[tokio::test]
async fn test_demo_fails_without_registry() {
    let config = ClientConfig::new(
        test_parent(),
        vec![skylink_core::BootstrapAddr::tcp("127.0.0.1", 1)],
    )
    .with_register_timeout(Duration::from_millis(500));
    let env = Environment::with_config(config, STOP_GRACE);

    assert!(!point_to_point::run(env, DELIVERY_TIMEOUT).await.unwrap());
}

//! Skylink integration test harness.
//!
//! Every test starts its own in-process registry on an OS-assigned
//! loopback port, so tests run in parallel without interfering:
//!
//!   cargo test --test integration
//!
//! Each test stops the clients and registry it starts.

use std::time::Duration;

use tokio::sync::mpsc;

use skylink_client::{ClientConfig, ClientHandle, Envelope, StreamEndpoint, Subscription};
use skylink_core::Uid;
use skylink_registry::{EmbeddedRegistry, RegistryOptions};

mod delivery;
mod demo;
mod lifecycle;
mod registry;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Application identity shared by every test client.
pub const TEST_PARENT: &str = "3ac93165-3d37-4970-87a6-fa4ee27744e4";

pub const READY_TIMEOUT: Duration = Duration::from_secs(5);
pub const DELIVERY_TIMEOUT: Duration = Duration::from_millis(3000);
pub const STOP_GRACE: Duration = Duration::from_secs(2);

pub async fn spawn_registry() -> EmbeddedRegistry {
    EmbeddedRegistry::spawn(RegistryOptions::ephemeral())
        .await
        .expect("embedded registry should start")
}

pub fn test_parent() -> Uid {
    TEST_PARENT.parse().expect("TEST_PARENT is a valid uid")
}

pub fn client_config(registry: &EmbeddedRegistry) -> ClientConfig {
    ClientConfig::new(test_parent(), vec![registry.bootstrap_addr()])
        .with_register_timeout(READY_TIMEOUT)
}

/// Start a client and wait until it is registered.
pub async fn start_ready(registry: &EmbeddedRegistry) -> (ClientHandle, Uid) {
    let client = ClientHandle::start(client_config(registry));
    let uid = client
        .wait_registered(READY_TIMEOUT)
        .await
        .expect("client should register");
    (client, uid)
}

/// Attach a consumer that forwards every envelope into a channel.
pub fn collect(stream: &StreamEndpoint) -> (Subscription, mpsc::UnboundedReceiver<Envelope>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sub = stream
        .subscribe(move |envelope| {
            let _ = tx.send(envelope);
        })
        .expect("stream should accept a consumer");
    (sub, rx)
}

/// Forward every newly observed inbound endpoint into a channel.
pub fn inbound(client: &ClientHandle) -> (Subscription, mpsc::UnboundedReceiver<StreamEndpoint>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sub = client.on_client_stream(move |stream| {
        let _ = tx.send(stream);
    });
    (sub, rx)
}

/// Receive with the standard delivery timeout.
pub async fn recv_within<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Option<T> {
    tokio::time::timeout(DELIVERY_TIMEOUT, rx.recv())
        .await
        .ok()
        .flatten()
}

pub async fn stop_all(clients: &[&ClientHandle], registry: EmbeddedRegistry) {
    for client in clients {
        client.stop(STOP_GRACE).await;
    }
    registry.shutdown().await;
}

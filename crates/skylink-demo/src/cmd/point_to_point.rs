//! One message from the first client to the second, verified on arrival.

use std::time::Duration;

use anyhow::Result;

use crate::cmd::Environment;
use crate::verifier::DeliveryVerifier;

pub const MESSAGE: &[u8] = b"Hello world!";

/// Returns whether the message arrived intact from the right sender
/// within `timeout`.
pub async fn run(env: Environment, timeout: Duration) -> Result<bool> {
    let (alice, bob, _) = env.start_pair().await;

    let (Some(alice_uid), Some(bob_uid)) = (alice.uid(), bob.uid()) else {
        env.finish(&[alice, bob]).await;
        return Ok(false);
    };

    bob.ping();

    let verifier = DeliveryVerifier::new(alice_uid, MESSAGE);
    let inbound = {
        let verifier = verifier.clone();
        bob.on_client_stream(move |stream| {
            let verifier = verifier.clone();
            if let Err(e) = stream.subscribe(move |envelope| {
                verifier.observe(&envelope);
            }) {
                tracing::warn!(peer = %stream.peer(), error = %e, "could not attach consumer");
            }
        })
    };

    let stream = alice.open_stream(bob_uid);
    match stream.send(MESSAGE).await {
        Ok(()) => println!("A message has been sent."),
        Err(e) => tracing::warn!(error = %e, "send failed"),
    }

    let delivered = match verifier.wait(timeout).await {
        Some(verdict) => verdict.is_ok(),
        None => {
            println!("Error: message time-out has been reached.");
            false
        }
    };

    if let Some(rtt) = bob.last_rtt() {
        tracing::info!(rtt_ms = rtt.as_millis() as u64, "registry round trip");
    }

    inbound.cancel();
    env.finish(&[alice, bob]).await;
    Ok(delivered)
}

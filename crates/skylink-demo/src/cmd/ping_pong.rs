//! The first client sends "ping", the second answers "pong" on the same
//! stream. Prints the round-trip time of each exchange.

use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::mpsc;

use crate::cmd::Environment;

const PING: &[u8] = b"ping";
const PONG: &[u8] = b"pong";
const ROUND_INTERVAL: Duration = Duration::from_millis(200);

/// Returns whether every round got its pong within `timeout`.
pub async fn run(env: Environment, rounds: u32, timeout: Duration) -> Result<bool> {
    let (alice, bob, _) = env.start_pair().await;

    let Some(bob_uid) = bob.uid().filter(|_| alice.uid().is_some()) else {
        env.finish(&[alice, bob]).await;
        return Ok(false);
    };

    let responder = bob.on_client_stream(|stream| {
        let reply = stream.clone();
        let attached = stream.subscribe(move |envelope| {
            if envelope.payload.as_ref() != PING {
                tracing::warn!(len = envelope.payload.len(), "unexpected payload");
                return;
            }
            let reply = reply.clone();
            tokio::spawn(async move {
                if let Err(e) = reply.send(PONG).await {
                    tracing::warn!(error = %e, "pong not sent");
                }
            });
        });
        if let Err(e) = attached {
            tracing::warn!(error = %e, "could not attach responder");
        }
    });

    let stream = alice.open_stream(bob_uid);
    let (tx, mut pongs) = mpsc::unbounded_channel();
    let _replies = stream.subscribe(move |envelope| {
        let _ = tx.send(envelope);
    })?;

    let mut ok = true;
    let mut interval = tokio::time::interval(ROUND_INTERVAL);
    for round in 1..=rounds {
        interval.tick().await;
        let sent_at = Instant::now();
        if let Err(e) = stream.send(PING).await {
            tracing::warn!(round, error = %e, "ping not sent");
            ok = false;
            break;
        }
        match tokio::time::timeout(timeout, pongs.recv()).await {
            Ok(Some(envelope)) if envelope.payload.as_ref() == PONG => {
                println!("round {round}: pong in {} ms", sent_at.elapsed().as_millis());
            }
            Ok(Some(_)) => {
                println!("Error: received message is corrupted.");
                ok = false;
            }
            Ok(None) | Err(_) => {
                println!("Error: message time-out has been reached.");
                ok = false;
                break;
            }
        }
    }

    responder.cancel();
    env.finish(&[alice, bob]).await;
    Ok(ok)
}

//! Delivery verifier — checks one received envelope against what was sent.

use std::time::Duration;

use bytes::Bytes;

use skylink_client::Envelope;
use skylink_core::{Completion, Uid};

/// How long the demo waits for the message before reporting a timeout.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_millis(3000);

/// Result of checking one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub sender_ok: bool,
    pub payload_ok: bool,
}

impl Verdict {
    pub fn is_ok(&self) -> bool {
        self.sender_ok && self.payload_ok
    }
}

/// Expects exactly one payload from one sender. The first observed
/// envelope completes the verifier, whether it matched or not.
#[derive(Clone)]
pub struct DeliveryVerifier {
    expected_sender: Uid,
    expected_payload: Bytes,
    done: Completion<Verdict>,
}

impl DeliveryVerifier {
    pub fn new(expected_sender: Uid, expected_payload: impl Into<Bytes>) -> Self {
        Self {
            expected_sender,
            expected_payload: expected_payload.into(),
            done: Completion::new(),
        }
    }

    pub fn sender_matches(&self, sender: Uid) -> bool {
        sender == self.expected_sender
    }

    /// Pure comparison; no reporting, no completion.
    pub fn check(&self, sender: Uid, payload: &[u8]) -> Verdict {
        Verdict {
            sender_ok: self.sender_matches(sender),
            payload_ok: payload == &self.expected_payload[..],
        }
    }

    /// Check `envelope`, report mismatches, and complete.
    pub fn observe(&self, envelope: &Envelope) -> Verdict {
        let verdict = self.check(envelope.sender, &envelope.payload);
        if !verdict.sender_ok {
            println!("Error: a message from unknown ID has been received.");
            tracing::warn!(
                expected = %self.expected_sender,
                got = %envelope.sender,
                "sender mismatch"
            );
        }
        if !verdict.payload_ok {
            println!("Error: received message is corrupted.");
            tracing::warn!(
                expected_len = self.expected_payload.len(),
                got_len = envelope.payload.len(),
                "payload mismatch"
            );
        } else {
            println!("A message has been received.");
        }
        self.done.complete(verdict);
        verdict
    }

    pub fn is_done(&self) -> bool {
        self.done.is_done()
    }

    /// First verdict, or `None` if nothing arrived within `timeout`.
    pub async fn wait(&self, timeout: Duration) -> Option<Verdict> {
        self.done.wait_timeout(timeout).await
    }
}

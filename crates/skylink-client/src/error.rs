//! Client error types.

use std::time::Duration;

use skylink_core::control::RejectCode;
use skylink_core::wire::MAX_PAYLOAD;

/// Why a handle failed to become ready. Cloneable because it is stored in
/// the readiness signal and handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
    #[error("no bootstrap addresses configured")]
    NoBootstrap,

    #[error("no registry reachable (last tried {addr}: {reason})")]
    Unreachable { addr: String, reason: String },

    #[error("registration rejected ({code:?}): {reason}")]
    Rejected { code: RejectCode, reason: String },

    #[error("protocol error during registration: {0}")]
    Protocol(String),

    #[error("registration did not complete within {0:?}")]
    Timeout(Duration),

    #[error("client stopped before registration completed")]
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("client is not registered yet")]
    NotReady,

    #[error("client is stopped")]
    Stopped,

    #[error("connection to the registry was lost")]
    Disconnected,

    #[error("outbound queue is full")]
    QueueFull,

    #[error("payload length {0} exceeds maximum {}", MAX_PAYLOAD)]
    PayloadTooLarge(usize),

    #[error("stream already has a consumer")]
    AlreadySubscribed,

    #[error("stream is closed")]
    StreamClosed,

    #[error("client did not become ready within {0:?}")]
    ReadyTimeout(Duration),

    #[error(transparent)]
    Start(#[from] StartError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_readable() {
        let e = StartError::Rejected {
            code: RejectCode::DuplicateUid,
            reason: "already online".into(),
        };
        assert_eq!(
            e.to_string(),
            "registration rejected (DuplicateUid): already online"
        );
        let e: ClientError = StartError::Timeout(Duration::from_millis(300)).into();
        assert!(e.to_string().contains("300ms"));
        assert!(ClientError::PayloadTooLarge(70_000)
            .to_string()
            .contains("65535"));
    }
}

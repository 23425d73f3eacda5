//! Control-frame bodies — JSON payloads of the registration exchange.
//!
//! Data frames carry opaque bytes; only Register, Registered and Rejected
//! frames have a structured body.

use serde::{Deserialize, Serialize};

use crate::identity::Uid;

/// Register payload — first frame a client sends on a new connection.
///
/// Wire: kind = FrameKind::Register, peer = zero
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Application identity the client registers under.
    pub parent: Uid,

    /// Identity the client wants to keep. `None` lets the registry assign one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uid>,
}

/// Registered payload — the registry accepted the client.
///
/// Wire: kind = FrameKind::Registered, peer = zero
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterReply {
    pub uid: Uid,
}

/// Why a registration was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectCode {
    /// The requested identity is already online.
    DuplicateUid,
    /// The Register body could not be parsed.
    Malformed,
    /// The first frame was not Register.
    ExpectedRegister,
    /// The parent identity is the nil identity.
    NilParent,
}

/// Rejected payload — sent before the registry closes the connection.
///
/// Wire: kind = FrameKind::Rejected, peer = zero
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub code: RejectCode,
    pub reason: String,
}

impl Rejection {
    pub fn new(code: RejectCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

//! Skylink wire format — the frame header exchanged between clients and
//! the registry.
//!
//! These types ARE the protocol. Every field, every size, every reserved byte
//! is part of the wire format. Changing anything here is a breaking change
//! for every deployed client and registry.
//!
//! The header is #[repr(C, packed)] for deterministic layout and uses
//! zerocopy derives for safe, allocation-free serialization. Multi-byte
//! integers are stored as little-endian byte arrays so the layout does not
//! depend on the host. There is no unsafe code in this module.

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Frame Header ─────────────────────────────────────────────────────────────

/// Precedes every payload on a client ↔ registry connection.
///
/// The receiver can fully describe and verify a frame before handing the
/// payload to anyone.
///
/// Wire size: 56 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct FrameHeader {
    /// BLAKE3 hash of the payload bytes.
    /// Verified by the receiver before the frame is accepted.
    pub content_hash: [u8; 32],

    /// Peer identity. On client → registry Data frames this is the
    /// destination; on registry → client Data frames it is the source,
    /// stamped by the registry. Zero when the frame kind has no peer.
    pub peer: [u8; 16],

    /// Payload length in bytes, little-endian, not including this header.
    pub length: [u8; 4],

    /// Frame kind, see [`FrameKind`].
    pub kind: u8,

    /// Wire format version. Currently 0x01.
    pub version: u8,

    /// Reserved, must be zero.
    pub reserved: [u8; 2],
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(FrameHeader, [u8; 56]);

/// Size of [`FrameHeader`] on the wire.
pub const HEADER_LEN: usize = 56;

impl FrameHeader {
    /// Build a header for `payload`, computing its content hash.
    pub fn new(kind: FrameKind, peer: [u8; 16], payload: &[u8]) -> Result<Self, WireError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(WireError::PayloadTooLarge(payload.len()));
        }
        Ok(Self {
            content_hash: content_hash(payload),
            peer,
            length: (payload.len() as u32).to_le_bytes(),
            kind: kind.into(),
            version: FRAME_VERSION,
            reserved: [0; 2],
        })
    }

    /// Payload length declared by this header.
    pub fn payload_len(&self) -> usize {
        u32::from_le_bytes(self.length) as usize
    }

    /// Checks that can run before the payload is read. A failure here
    /// means the byte stream can no longer be trusted to be in sync.
    pub fn validate(&self) -> Result<(), WireError> {
        if self.version != FRAME_VERSION {
            return Err(WireError::UnknownVersion(self.version));
        }
        if self.reserved != [0; 2] {
            return Err(WireError::ReservedBytesSet(self.reserved));
        }
        let len = self.payload_len();
        if len > MAX_PAYLOAD {
            return Err(WireError::PayloadTooLarge(len));
        }
        Ok(())
    }

    /// Verify `payload` against the header's content hash.
    pub fn verify(&self, payload: &[u8]) -> Result<(), WireError> {
        if content_hash(payload) != self.content_hash {
            return Err(WireError::HashMismatch);
        }
        Ok(())
    }
}

/// BLAKE3 hash used in [`FrameHeader::content_hash`].
pub fn content_hash(payload: &[u8]) -> [u8; 32] {
    *blake3::hash(payload).as_bytes()
}

// ── Frame Kind ────────────────────────────────────────────────────────────────

/// What a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// Client → registry. JSON [`crate::control::RegisterRequest`].
    Register = 0x01,
    /// Registry → client. JSON [`crate::control::RegisterReply`].
    Registered = 0x02,
    /// Registry → client. JSON [`crate::control::Rejection`]; the registry
    /// closes the connection afterwards.
    Rejected = 0x03,
    /// Stream payload. `peer` is destination outbound, source inbound.
    Data = 0x04,
    /// Registry → client. The destination in `peer` is not online.
    Undeliverable = 0x05,
    /// Client → registry liveness check. Opaque payload echoed in Pong.
    Ping = 0x06,
    /// Registry → client answer to Ping.
    Pong = 0x07,
    /// Client → registry graceful goodbye.
    Bye = 0x08,
}

impl TryFrom<u8> for FrameKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(FrameKind::Register),
            0x02 => Ok(FrameKind::Registered),
            0x03 => Ok(FrameKind::Rejected),
            0x04 => Ok(FrameKind::Data),
            0x05 => Ok(FrameKind::Undeliverable),
            0x06 => Ok(FrameKind::Ping),
            0x07 => Ok(FrameKind::Pong),
            0x08 => Ok(FrameKind::Bye),
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

impl From<FrameKind> for u8 {
    fn from(k: FrameKind) -> u8 {
        k as u8
    }
}

// ── Constants ─────────────────────────────────────────────────────────────────

/// Current frame format version.
pub const FRAME_VERSION: u8 = 0x01;

/// Maximum payload size in bytes.
/// Larger data must be split by the sender into multiple frames.
pub const MAX_PAYLOAD: usize = 65535;

/// Default registry TCP port.
pub const DEFAULT_REGISTRY_PORT: u16 = 9010;

/// Default status API port.
pub const DEFAULT_API_PORT: u16 = 9011;

/// Default handshake timeout in seconds.
/// Connections that do not send Register within this window are dropped.
pub const HANDSHAKE_TIMEOUT_SECS: u64 = 5;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unknown frame kind: 0x{0:02x}")]
    UnknownKind(u8),

    #[error("unknown frame version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("payload length {0} exceeds maximum {}", MAX_PAYLOAD)]
    PayloadTooLarge(usize),

    #[error("reserved bytes are non-zero: {0:02x?}")]
    ReservedBytesSet([u8; 2]),

    #[error("payload does not match content hash")]
    HashMismatch,
}

impl WireError {
    /// Whether the connection can keep going after this error.
    ///
    /// Errors detected after the full payload was consumed leave the
    /// stream in sync, so the offending frame alone is dropped.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, WireError::UnknownKind(_) | WireError::HashMismatch)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

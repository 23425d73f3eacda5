//! Owned frames and the async codec used on every Skylink connection.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use zerocopy::{AsBytes, FromBytes};

use crate::identity::Uid;
use crate::wire::{FrameHeader, FrameKind, WireError, HEADER_LEN, MAX_PAYLOAD};

/// A decoded frame: kind, peer identity and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub peer: Uid,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: FrameKind, peer: Uid, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            peer,
            payload: payload.into(),
        }
    }

    /// Data frame. `peer` is the destination when a client sends it and the
    /// source when the registry delivers it.
    pub fn data(peer: Uid, payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Data, peer, payload)
    }

    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Ping, Uid::NIL, payload)
    }

    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Pong, Uid::NIL, payload)
    }

    pub fn bye() -> Self {
        Self::new(FrameKind::Bye, Uid::NIL, Bytes::new())
    }

    pub fn undeliverable(destination: Uid) -> Self {
        Self::new(FrameKind::Undeliverable, destination, Bytes::new())
    }

    /// Control frame with a JSON body.
    pub fn control<T: Serialize>(kind: FrameKind, body: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(kind, Uid::NIL, serde_json::to_vec(body)?))
    }

    /// Parse the JSON body of a control frame.
    pub fn body<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    pub fn header(&self) -> Result<FrameHeader, WireError> {
        FrameHeader::new(self.kind, *self.peer.as_bytes(), &self.payload)
    }
}

/// Errors from reading or writing frames on a byte stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    #[error("connection closed mid-frame")]
    Truncated,
}

impl FrameError {
    /// The frame was dropped but the stream is still in sync.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrameError::Wire(e) if e.is_recoverable())
    }
}

/// Read one frame.
///
/// Returns `Ok(None)` on a clean EOF at a frame boundary. The header is
/// validated before the payload is read; the kind and content hash are
/// checked after, so a [`FrameError::is_recoverable`] error leaves the
/// reader positioned at the next frame.
///
/// Not cancel-safe: dropping the future mid-frame desynchronises the stream.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut header_buf[filled..]).await?;
        if n == 0 {
            return if filled == 0 {
                Ok(None)
            } else {
                Err(FrameError::Truncated)
            };
        }
        filled += n;
    }

    // The buffer is exactly HEADER_LEN bytes, so this cannot fail.
    let header = FrameHeader::read_from(&header_buf[..]).ok_or(FrameError::Truncated)?;
    header.validate()?;

    let len = header.payload_len();
    debug_assert!(len <= MAX_PAYLOAD);
    let mut payload = vec![0u8; len];
    match reader.read_exact(&mut payload).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::Truncated)
        }
        Err(e) => return Err(e.into()),
    }

    let kind = FrameKind::try_from(header.kind)?;
    header.verify(&payload)?;

    Ok(Some(Frame {
        kind,
        peer: Uid::from_bytes(header.peer),
        payload: Bytes::from(payload),
    }))
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let header = frame.header()?;
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&frame.payload).await?;
    writer.flush().await?;
    Ok(())
}

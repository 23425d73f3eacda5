//! Registry connection — registration exchange, then one writer task and
//! one reader task per connection.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};

use skylink_core::control::{RegisterReply, RegisterRequest, Rejection};
use skylink_core::{read_frame, write_frame, Frame, FrameKind, Uid};

use crate::config::ClientConfig;
use crate::error::StartError;
use crate::handle::ClientInner;

/// Register, then hand the socket to the writer and reader tasks.
/// Completes the readiness signal exactly once either way.
pub(crate) async fn bootstrap(
    inner: Arc<ClientInner>,
    outbound: mpsc::Receiver<Frame>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let timeout = inner.config.register_timeout;
    let result = tokio::select! {
        _ = shutdown.recv() => Err(StartError::Stopped),
        r = tokio::time::timeout(timeout, register(&inner.config)) => {
            r.unwrap_or(Err(StartError::Timeout(timeout)))
        }
    };

    let (stream, uid) = match result {
        Ok(ok) => ok,
        Err(e) => {
            tracing::warn!(error = %e, "registration failed");
            inner.ready.complete(Err(e));
            return;
        }
    };

    inner.link.set_uid(uid);
    let (rd, wr) = stream.into_split();

    let writer = Writer::new(wr, outbound, inner.shutdown.subscribe());
    let reader = Reader::new(rd, inner.clone(), inner.shutdown.subscribe());
    let writer = tokio::spawn(async move {
        if let Err(e) = writer.run().await {
            tracing::warn!(error = %e, "writer exited with error");
        }
    });
    let reader = tokio::spawn(async move {
        if let Err(e) = reader.run().await {
            tracing::warn!(error = %e, "reader exited with error");
        }
    });

    // stop() may have drained the task list while we were registering.
    if inner.link.is_stopped() {
        writer.abort();
        reader.abort();
        inner.ready.complete(Err(StartError::Stopped));
        return;
    }
    inner.track(writer);
    inner.track(reader);

    tracing::info!(uid = %uid, parent = %inner.config.parent, "client registered");
    inner.ready.complete(Ok(uid));
}

/// Try each bootstrap address in order. An address that refuses the
/// connection moves on to the next; a registry that answers is final.
async fn register(config: &ClientConfig) -> Result<(TcpStream, Uid), StartError> {
    let mut last = None;
    for addr in &config.bootstrap {
        let target = addr.connect_target();
        match TcpStream::connect(&target).await {
            Ok(stream) => {
                tracing::debug!(addr = %addr, "connected to registry");
                return handshake(stream, config).await;
            }
            Err(e) => {
                tracing::debug!(addr = %addr, error = %e, "bootstrap address unreachable");
                last = Some(StartError::Unreachable {
                    addr: addr.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
    Err(last.unwrap_or(StartError::NoBootstrap))
}

async fn handshake(
    mut stream: TcpStream,
    config: &ClientConfig,
) -> Result<(TcpStream, Uid), StartError> {
    let _ = stream.set_nodelay(true);

    let request = RegisterRequest {
        parent: config.parent,
        uid: config.uid,
    };
    let frame = Frame::control(FrameKind::Register, &request)
        .map_err(|e| StartError::Protocol(e.to_string()))?;
    write_frame(&mut stream, &frame)
        .await
        .map_err(|e| StartError::Protocol(e.to_string()))?;

    let reply = match read_frame(&mut stream).await {
        Ok(Some(f)) => f,
        Ok(None) => {
            return Err(StartError::Protocol(
                "registry closed the connection".into(),
            ))
        }
        Err(e) => return Err(StartError::Protocol(e.to_string())),
    };

    match reply.kind {
        FrameKind::Registered => {
            let body: RegisterReply = reply
                .body()
                .map_err(|e| StartError::Protocol(format!("bad Registered body: {e}")))?;
            Ok((stream, body.uid))
        }
        FrameKind::Rejected => {
            let body: Rejection = reply
                .body()
                .map_err(|e| StartError::Protocol(format!("bad Rejected body: {e}")))?;
            Err(StartError::Rejected {
                code: body.code,
                reason: body.reason,
            })
        }
        other => Err(StartError::Protocol(format!(
            "expected Registered, got {other:?}"
        ))),
    }
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Drains the outbound queue onto the socket in queue order.
struct Writer {
    wr: OwnedWriteHalf,
    rx: mpsc::Receiver<Frame>,
    shutdown: broadcast::Receiver<()>,
}

impl Writer {
    fn new(wr: OwnedWriteHalf, rx: mpsc::Receiver<Frame>, shutdown: broadcast::Receiver<()>) -> Self {
        Self { wr, rx, shutdown }
    }

    async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                biased;

                frame = self.rx.recv() => {
                    let Some(frame) = frame else {
                        return Ok(());
                    };
                    write_frame(&mut self.wr, &frame).await?;
                    if frame.kind == FrameKind::Bye {
                        let _ = self.wr.shutdown().await;
                        tracing::debug!("goodbye sent");
                        return Ok(());
                    }
                }

                _ = self.shutdown.recv() => {
                    // Flush whatever is already queued, Bye included.
                    while let Ok(frame) = self.rx.try_recv() {
                        write_frame(&mut self.wr, &frame).await?;
                        if frame.kind == FrameKind::Bye {
                            break;
                        }
                    }
                    let _ = self.wr.shutdown().await;
                    return Ok(());
                }
            }
        }
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// Reads frames from the registry and dispatches them to streams.
struct Reader {
    rd: OwnedReadHalf,
    inner: Arc<ClientInner>,
    shutdown: broadcast::Receiver<()>,
}

impl Reader {
    fn new(rd: OwnedReadHalf, inner: Arc<ClientInner>, shutdown: broadcast::Receiver<()>) -> Self {
        Self { rd, inner, shutdown }
    }

    async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::debug!("reader shutting down");
                    return Ok(());
                }

                result = read_frame(&mut self.rd) => {
                    match result {
                        Ok(Some(frame)) => self.dispatch(frame),
                        Ok(None) => {
                            self.disconnected("registry closed the connection");
                            return Ok(());
                        }
                        Err(e) if e.is_recoverable() => {
                            tracing::warn!(error = %e, "dropping bad frame");
                        }
                        Err(e) => {
                            self.disconnected("read failed");
                            return Err(e.into());
                        }
                    }
                }
            }
        }
    }

    fn dispatch(&self, frame: Frame) {
        match frame.kind {
            FrameKind::Data => {
                if frame.peer.is_nil() {
                    tracing::warn!("data frame without sender dropped");
                    return;
                }
                self.inner.deliver(frame.peer, frame.payload);
            }
            FrameKind::Undeliverable => self.inner.record_undeliverable(frame.peer),
            FrameKind::Pong => match <[u8; 8]>::try_from(&frame.payload[..]) {
                Ok(nonce) => self.inner.record_pong(u64::from_le_bytes(nonce)),
                Err(_) => tracing::debug!(len = frame.payload.len(), "malformed pong"),
            },
            other => tracing::warn!(kind = ?other, "unexpected frame from registry"),
        }
    }

    fn disconnected(&self, reason: &str) {
        if self.inner.link.is_stopped() {
            return;
        }
        tracing::warn!(reason, "lost connection to registry");
        self.inner.link.mark_disconnected();
        self.inner.close_all_streams();
        self.inner.forget_pings();
    }
}

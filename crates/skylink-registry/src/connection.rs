//! Per-connection handler — registration exchange, then relay.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::Result;
use dashmap::mapref::entry::Entry;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};

use skylink_core::control::{RegisterReply, RegisterRequest, RejectCode, Rejection};
use skylink_core::{read_frame, write_frame, Frame, FrameKind, Uid};

use crate::stats::RelayStats;
use crate::table::{ClientTable, ConnectedClient};

pub struct ConnectionHandler {
    stream: TcpStream,
    addr: SocketAddr,
    conn_id: u64,
    table: ClientTable,
    stats: RelayStats,
    handshake_timeout: Duration,
    queue_depth: usize,
    shutdown: broadcast::Receiver<()>,
}

impl ConnectionHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        conn_id: u64,
        table: ClientTable,
        stats: RelayStats,
        handshake_timeout: Duration,
        queue_depth: usize,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            stream,
            addr,
            conn_id,
            table,
            stats,
            handshake_timeout,
            queue_depth,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let _ = self.stream.set_nodelay(true);

        let first = match tokio::time::timeout(self.handshake_timeout, read_frame(&mut self.stream)).await {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => {
                tracing::debug!(addr = %self.addr, "connection closed before registering");
                return Ok(());
            }
            Ok(Err(e)) => {
                tracing::warn!(addr = %self.addr, error = %e, "bad registration frame");
                return Ok(());
            }
            Err(_) => {
                tracing::warn!(addr = %self.addr, "registration timed out");
                return Ok(());
            }
        };

        let request = match self.parse_register(&first) {
            Ok(r) => r,
            Err(rejection) => return self.reject(rejection).await,
        };

        let (tx, rx) = mpsc::channel::<Frame>(self.queue_depth.max(1));
        let uid = match self.admit(&request, tx.clone()) {
            Ok(uid) => uid,
            Err(rejection) => return self.reject(rejection).await,
        };

        let (mut rd, mut wr) = self.stream.into_split();

        // Registered goes out before anything relayed to the new client.
        let reply = Frame::control(FrameKind::Registered, &RegisterReply { uid })?;
        if let Err(e) = write_frame(&mut wr, &reply).await {
            self.table.remove_if(&uid, |_, c| c.conn_id == self.conn_id);
            return Err(e.into());
        }

        self.stats.record_registered();
        tracing::info!(
            uid = %uid,
            parent = %request.parent,
            addr = %self.addr,
            "client registered"
        );

        let writer = tokio::spawn(write_loop(wr, rx, uid));
        let relay = Relay {
            uid,
            own_tx: tx,
            table: self.table.clone(),
            stats: self.stats.clone(),
        };

        let reason = loop {
            tokio::select! {
                _ = self.shutdown.recv() => break "registry shutting down",

                result = read_frame(&mut rd) => match result {
                    Ok(Some(frame)) if frame.kind == FrameKind::Bye => break "goodbye",
                    Ok(Some(frame)) => relay.handle(frame),
                    Ok(None) => break "connection closed",
                    Err(e) if e.is_recoverable() => {
                        self.stats.record_dropped();
                        tracing::warn!(uid = %uid, error = %e, "dropping bad frame");
                    }
                    Err(e) => {
                        tracing::warn!(uid = %uid, error = %e, "read failed");
                        break "read failed";
                    }
                },
            }
        };

        let conn_id = self.conn_id;
        self.table.remove_if(&uid, |_, c| c.conn_id == conn_id);
        drop(relay);
        let _ = writer.await;

        tracing::info!(uid = %uid, reason, "client left");
        Ok(())
    }

    fn parse_register(&self, frame: &Frame) -> Result<RegisterRequest, Rejection> {
        if frame.kind != FrameKind::Register {
            return Err(Rejection::new(
                RejectCode::ExpectedRegister,
                format!("first frame must be Register, got {:?}", frame.kind),
            ));
        }
        let request: RegisterRequest = frame
            .body()
            .map_err(|e| Rejection::new(RejectCode::Malformed, e.to_string()))?;
        if request.parent.is_nil() {
            return Err(Rejection::new(RejectCode::NilParent, "parent identity is nil"));
        }
        Ok(request)
    }

    /// Insert the client. A requested identity must be free; otherwise a
    /// fresh random one is assigned.
    fn admit(&self, request: &RegisterRequest, tx: mpsc::Sender<Frame>) -> Result<Uid, Rejection> {
        let client = || ConnectedClient {
            conn_id: self.conn_id,
            parent: request.parent,
            addr: self.addr,
            tx: tx.clone(),
            connected_at: Instant::now(),
        };

        if let Some(uid) = request.uid.filter(|u| !u.is_nil()) {
            return match self.table.entry(uid) {
                Entry::Occupied(_) => Err(Rejection::new(
                    RejectCode::DuplicateUid,
                    format!("{uid} is already online"),
                )),
                Entry::Vacant(v) => {
                    v.insert(client());
                    Ok(uid)
                }
            };
        }

        loop {
            let uid = Uid::random();
            if let Entry::Vacant(v) = self.table.entry(uid) {
                v.insert(client());
                return Ok(uid);
            }
        }
    }

    async fn reject(mut self, rejection: Rejection) -> Result<()> {
        self.stats.record_rejected();
        tracing::warn!(
            addr = %self.addr,
            code = ?rejection.code,
            reason = %rejection.reason,
            "registration rejected"
        );
        let frame = Frame::control(FrameKind::Rejected, &rejection)?;
        write_frame(&mut self.stream, &frame).await?;
        let _ = self.stream.shutdown().await;
        Ok(())
    }
}

// ── Relay ─────────────────────────────────────────────────────────────────────

/// Routes frames read from one registered client.
struct Relay {
    uid: Uid,
    own_tx: mpsc::Sender<Frame>,
    table: ClientTable,
    stats: RelayStats,
}

impl Relay {
    fn handle(&self, frame: Frame) {
        match frame.kind {
            FrameKind::Data => self.route(frame),
            FrameKind::Ping => self.reply(Frame::pong(frame.payload)),
            other => {
                self.stats.record_dropped();
                tracing::warn!(uid = %self.uid, kind = ?other, "unexpected frame from client");
            }
        }
    }

    fn route(&self, frame: Frame) {
        let destination = frame.peer;
        // Clone the sender and release the shard lock before sending.
        let dest_tx = self.table.get(&destination).map(|c| c.tx.clone());

        let Some(dest_tx) = dest_tx else {
            self.stats.record_undeliverable();
            tracing::debug!(
                from = %self.uid.short(),
                to = %destination.short(),
                "destination offline"
            );
            self.reply(Frame::undeliverable(destination));
            return;
        };

        match dest_tx.try_send(Frame::data(self.uid, frame.payload)) {
            Ok(()) => self.stats.record_relayed(),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.record_dropped();
                tracing::warn!(
                    from = %self.uid.short(),
                    to = %destination.short(),
                    "destination queue full, frame dropped"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.record_undeliverable();
                self.reply(Frame::undeliverable(destination));
            }
        }
    }

    fn reply(&self, frame: Frame) {
        if self.own_tx.try_send(frame).is_err() {
            self.stats.record_dropped();
            tracing::debug!(uid = %self.uid.short(), "own queue full, reply dropped");
        }
    }
}

async fn write_loop(mut wr: OwnedWriteHalf, mut rx: mpsc::Receiver<Frame>, uid: Uid) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = write_frame(&mut wr, &frame).await {
            tracing::debug!(uid = %uid.short(), error = %e, "write failed");
            break;
        }
    }
    let _ = wr.shutdown().await;
}

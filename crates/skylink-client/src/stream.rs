//! Stream endpoints — point-to-point channels between two identities.
//!
//! A handle keeps at most one endpoint per peer identity. The endpoint is
//! created either by `open_stream` (outbound) or by the first Data frame
//! that arrives from a peer (inbound). Both directions can send and
//! receive.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use skylink_core::wire::MAX_PAYLOAD;
use skylink_core::{Frame, Uid};

use crate::error::ClientError;
use crate::link::Link;
use crate::subscription::Subscription;

/// One delivered payload with its sender attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Identity of the client that sent the payload, as stamped by the registry.
    pub sender: Uid,
    pub payload: Bytes,
}

/// Who created the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Opened locally with `open_stream`.
    Outbound,
    /// Created by the first frame received from the peer.
    Inbound,
}

/// Peer identity → endpoint state.
pub(crate) type StreamTable = Arc<DashMap<Uid, Arc<StreamShared>>>;

pub(crate) fn new_stream_table() -> StreamTable {
    Arc::new(DashMap::new())
}

pub(crate) struct StreamShared {
    peer: Uid,
    direction: Direction,
    link: Arc<Link>,
    table: Weak<DashMap<Uid, Arc<StreamShared>>>,
    /// Taken on close; the consumer task ends once it drains.
    inbox: Mutex<Option<mpsc::Sender<Envelope>>>,
    /// Taken by the one consumer.
    pending: Mutex<Option<mpsc::Receiver<Envelope>>>,
    closed: AtomicBool,
    received: AtomicU64,
    dropped: AtomicU64,
    undeliverable: AtomicU64,
}

impl StreamShared {
    pub(crate) fn new(
        peer: Uid,
        direction: Direction,
        link: Arc<Link>,
        table: &StreamTable,
        buffer: usize,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        Arc::new(Self {
            peer,
            direction,
            link,
            table: Arc::downgrade(table),
            inbox: Mutex::new(Some(tx)),
            pending: Mutex::new(Some(rx)),
            closed: AtomicBool::new(false),
            received: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            undeliverable: AtomicU64::new(0),
        })
    }

    /// Hand an arriving envelope to the consumer (or buffer it until one
    /// attaches). Returns false if the stream is closed or its buffer is
    /// full; a full buffer drops the envelope and counts it.
    pub(crate) fn push(&self, envelope: Envelope) -> bool {
        let inbox = self.inbox.lock();
        let Some(tx) = inbox.as_ref() else {
            return false;
        };
        match tx.try_send(envelope) {
            Ok(()) => {
                self.received.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    peer = %self.peer.short(),
                    dropped,
                    "stream buffer full, envelope dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub(crate) fn record_undeliverable(&self) {
        self.undeliverable.fetch_add(1, Ordering::Relaxed);
    }

    /// Close and forget the endpoint. Idempotent.
    pub(crate) fn close(self: &Arc<Self>) {
        self.closed.store(true, Ordering::SeqCst);
        self.inbox.lock().take();
        if let Some(table) = self.table.upgrade() {
            table.remove_if(&self.peer, |_, s| Arc::ptr_eq(s, self));
        }
    }
}

/// A point-to-point channel to one peer. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct StreamEndpoint {
    shared: Arc<StreamShared>,
}

impl StreamEndpoint {
    pub(crate) fn new(shared: Arc<StreamShared>) -> Self {
        Self { shared }
    }

    /// The identity at the other end.
    pub fn peer(&self) -> Uid {
        self.shared.peer
    }

    pub fn direction(&self) -> Direction {
        self.shared.direction
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Envelopes that arrived on this endpoint so far.
    pub fn received_count(&self) -> u64 {
        self.shared.received.load(Ordering::Relaxed)
    }

    /// Envelopes dropped because the consumer fell behind or never attached.
    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// How many times the registry reported the peer offline.
    pub fn undeliverable_count(&self) -> u64 {
        self.shared.undeliverable.load(Ordering::Relaxed)
    }

    /// Queue one payload for the peer.
    ///
    /// Sends on one endpoint reach the peer in order. Delivery itself is
    /// best effort: an offline peer is reported asynchronously through
    /// [`StreamEndpoint::undeliverable_count`], never here.
    pub async fn send(&self, payload: impl Into<Bytes>) -> Result<(), ClientError> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD {
            return Err(ClientError::PayloadTooLarge(payload.len()));
        }
        if self.is_closed() {
            return Err(ClientError::StreamClosed);
        }
        self.shared
            .link
            .send(Frame::data(self.shared.peer, payload))
            .await
    }

    /// Attach the endpoint's consumer.
    ///
    /// `consumer` runs on its own task, once per arriving envelope, in
    /// arrival order. Envelopes that arrived before this call are delivered
    /// first. Only one consumer may be attached; cancelling its
    /// subscription closes the endpoint.
    pub fn subscribe<F>(&self, mut consumer: F) -> Result<Subscription, ClientError>
    where
        F: FnMut(Envelope) + Send + 'static,
    {
        let rx = self.shared.pending.lock().take();
        let mut rx = match rx {
            Some(rx) => rx,
            None if self.is_closed() => return Err(ClientError::StreamClosed),
            None => return Err(ClientError::AlreadySubscribed),
        };

        let peer = self.shared.peer;
        let task = tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                consumer(envelope);
            }
            tracing::debug!(peer = %peer.short(), "stream consumer finished");
        });

        let shared = self.shared.clone();
        Ok(Subscription::new(move || {
            task.abort();
            shared.close();
        }))
    }

    /// Close the endpoint. Pending envelopes already handed to the consumer
    /// are still delivered; later frames from the peer open a fresh inbound
    /// endpoint.
    pub fn close(&self) {
        self.shared.close();
    }
}

impl std::fmt::Debug for StreamEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamEndpoint")
            .field("peer", &self.shared.peer)
            .field("direction", &self.shared.direction)
            .field("closed", &self.is_closed())
            .finish()
    }
}

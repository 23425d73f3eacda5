//! Client handle — local proxy for one registered endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use skylink_core::{Completion, Frame, Uid};

use crate::config::ClientConfig;
use crate::connection;
use crate::error::{ClientError, StartError};
use crate::link::Link;
use crate::stream::{new_stream_table, Direction, StreamEndpoint, StreamShared, StreamTable};
use crate::subscription::Subscription;

/// Pings unanswered for this long are forgotten.
const PING_EXPIRY: Duration = Duration::from_secs(30);

pub(crate) type StreamHandler = Arc<dyn Fn(StreamEndpoint) + Send + Sync>;
pub(crate) type HandlerTable = Arc<Mutex<Vec<(u64, StreamHandler)>>>;

/// How `stop` finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Every task finished within the grace period.
    Graceful,
    /// The grace period elapsed and remaining tasks were aborted.
    Forced,
    /// `stop` had already been called.
    AlreadyStopped,
}

pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    pub(crate) link: Arc<Link>,
    pub(crate) ready: Completion<Result<Uid, StartError>>,
    pub(crate) streams: StreamTable,
    pub(crate) handlers: HandlerTable,
    next_handler_id: AtomicU64,
    pub(crate) shutdown: broadcast::Sender<()>,
    pub(crate) tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Outstanding ping nonces → send time.
    pub(crate) pings: DashMap<u64, Instant>,
    next_ping: AtomicU64,
    pub(crate) last_rtt: Mutex<Option<Duration>>,
}

impl ClientInner {
    /// Deliver a Data payload from `sender`, creating (and announcing) an
    /// inbound endpoint if this is the first frame seen from that peer.
    pub(crate) fn deliver(&self, sender: Uid, payload: Bytes) {
        let (shared, is_new) = match self.streams.entry(sender) {
            dashmap::mapref::entry::Entry::Occupied(e) => (e.get().clone(), false),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                let shared = StreamShared::new(
                    sender,
                    Direction::Inbound,
                    self.link.clone(),
                    &self.streams,
                    self.config.inbound_buffer,
                );
                v.insert(shared.clone());
                (shared, true)
            }
        };

        if !shared.push(crate::stream::Envelope { sender, payload }) {
            tracing::debug!(peer = %sender.short(), "envelope not accepted by stream");
        }

        if is_new {
            let handlers: Vec<StreamHandler> =
                self.handlers.lock().iter().map(|(_, h)| h.clone()).collect();
            tracing::debug!(
                peer = %sender.short(),
                handlers = handlers.len(),
                "new inbound stream"
            );
            let endpoint = StreamEndpoint::new(shared);
            for handler in handlers {
                handler(endpoint.clone());
            }
        }
    }

    pub(crate) fn record_undeliverable(&self, destination: Uid) {
        if let Some(stream) = self.streams.get(&destination) {
            stream.record_undeliverable();
        }
        tracing::warn!(
            destination = %destination,
            "registry reports destination offline; frame undeliverable"
        );
    }

    pub(crate) fn record_pong(&self, nonce: u64) {
        match self.pings.remove(&nonce) {
            Some((_, sent_at)) => {
                let rtt = sent_at.elapsed();
                *self.last_rtt.lock() = Some(rtt);
                tracing::debug!(nonce, rtt_ms = rtt.as_millis() as u64, "pong received");
            }
            None => tracing::debug!(nonce, "pong for unknown ping"),
        }
    }

    /// Forget outstanding pings whose pong can no longer arrive.
    pub(crate) fn forget_pings(&self) {
        self.pings.clear();
    }

    /// Close every endpoint. Consumers finish once they drain.
    pub(crate) fn close_all_streams(&self) {
        let all: Vec<Arc<StreamShared>> =
            self.streams.iter().map(|e| e.value().clone()).collect();
        self.streams.clear();
        for stream in all {
            stream.close();
        }
    }

    pub(crate) fn track(&self, task: JoinHandle<()>) {
        self.tasks.lock().push(task);
    }
}

/// Local proxy for one registered endpoint. Cheap to clone.
///
/// Must be created inside a Tokio runtime. Call [`ClientHandle::stop`] when
/// done: the handle's background tasks keep it alive until then.
#[derive(Clone)]
pub struct ClientHandle {
    inner: Arc<ClientInner>,
}

impl ClientHandle {
    /// Begin registering against `config.bootstrap`. Returns immediately;
    /// observe the outcome with [`ClientHandle::wait_ready`] or
    /// [`ClientHandle::wait_registered`]. The readiness signal completes
    /// exactly once, no later than `config.register_timeout`.
    pub fn start(config: ClientConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel::<Frame>(config.outbound_queue.max(1));
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let inner = Arc::new(ClientInner {
            config,
            link: Arc::new(Link::new(outbound_tx)),
            ready: Completion::new(),
            streams: new_stream_table(),
            handlers: Arc::new(Mutex::new(Vec::new())),
            next_handler_id: AtomicU64::new(0),
            shutdown: shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            pings: DashMap::new(),
            next_ping: AtomicU64::new(0),
            last_rtt: Mutex::new(None),
        });

        let bootstrap = tokio::spawn(connection::bootstrap(
            inner.clone(),
            outbound_rx,
            inner.shutdown.subscribe(),
        ));
        inner.track(bootstrap);

        Self { inner }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Identity assigned by the registry, once registered.
    pub fn uid(&self) -> Option<Uid> {
        self.inner.link.uid()
    }

    /// Registration outcome, if it is known yet.
    pub fn readiness(&self) -> Option<Result<Uid, StartError>> {
        self.inner.ready.peek()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.readiness(), Some(Ok(_)))
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.link.is_stopped()
    }

    /// "Registered within `timeout`?"
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        matches!(self.inner.ready.wait_timeout(timeout).await, Some(Ok(_)))
    }

    /// Wait for registration and return the assigned identity.
    pub async fn wait_registered(&self, timeout: Duration) -> Result<Uid, ClientError> {
        match self.inner.ready.wait_timeout(timeout).await {
            Some(Ok(uid)) => Ok(uid),
            Some(Err(e)) => Err(ClientError::Start(e)),
            None => Err(ClientError::ReadyTimeout(timeout)),
        }
    }

    /// Endpoint for a channel to `destination`.
    ///
    /// Purely local: nothing is sent until the first `send`, and the
    /// destination does not have to be online yet. Opening the same
    /// destination twice yields the same endpoint.
    pub fn open_stream(&self, destination: Uid) -> StreamEndpoint {
        let inner = &self.inner;
        if inner.link.is_stopped() {
            let shared = StreamShared::new(
                destination,
                Direction::Outbound,
                inner.link.clone(),
                &inner.streams,
                inner.config.inbound_buffer,
            );
            shared.close();
            return StreamEndpoint::new(shared);
        }
        let shared = inner
            .streams
            .entry(destination)
            .or_insert_with(|| {
                StreamShared::new(
                    destination,
                    Direction::Outbound,
                    inner.link.clone(),
                    &inner.streams,
                    inner.config.inbound_buffer,
                )
            })
            .value()
            .clone();
        StreamEndpoint::new(shared)
    }

    /// Register a callback for newly observed inbound streams.
    ///
    /// The callback runs on the connection's reader task, once per new
    /// inbound endpoint, before any of that endpoint's envelopes can be
    /// consumed. Keep it short: attach a consumer and return.
    pub fn on_client_stream<F>(&self, handler: F) -> Subscription
    where
        F: Fn(StreamEndpoint) + Send + Sync + 'static,
    {
        let id = self.inner.next_handler_id.fetch_add(1, Ordering::Relaxed);
        self.inner.handlers.lock().push((id, Arc::new(handler)));

        let handlers = Arc::downgrade(&self.inner.handlers);
        Subscription::new(move || {
            if let Some(handlers) = handlers.upgrade() {
                handlers.lock().retain(|(i, _)| *i != id);
            }
        })
    }

    /// Fire-and-forget liveness check. The registry's answer updates
    /// [`ClientHandle::last_rtt`].
    pub fn ping(&self) {
        let nonce = self.inner.next_ping.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        self.inner
            .pings
            .retain(|_, sent_at| now.duration_since(*sent_at) < PING_EXPIRY);
        self.inner.pings.insert(nonce, now);
        let frame = Frame::ping(nonce.to_le_bytes().to_vec());
        if let Err(e) = self.inner.link.try_send(frame) {
            self.inner.pings.remove(&nonce);
            tracing::debug!(error = %e, "ping not sent");
        }
    }

    /// Round-trip time of the most recently answered ping.
    pub fn last_rtt(&self) -> Option<Duration> {
        *self.inner.last_rtt.lock()
    }

    /// Number of live stream endpoints.
    pub fn stream_count(&self) -> usize {
        self.inner.streams.len()
    }

    /// Shut the handle down.
    ///
    /// Says goodbye to the registry, closes every stream, and gives the
    /// background tasks up to `grace` to finish before aborting them.
    /// Calling it again returns [`StopOutcome::AlreadyStopped`] at once.
    pub async fn stop(&self, grace: Duration) -> StopOutcome {
        let inner = &self.inner;
        if inner.link.mark_stopped() {
            return StopOutcome::AlreadyStopped;
        }
        tracing::info!(uid = ?inner.link.uid(), "client stopping");

        inner.link.send_bye();
        inner.ready.complete(Err(StartError::Stopped));
        let _ = inner.shutdown.send(());
        inner.close_all_streams();
        inner.forget_pings();

        let mut tasks = std::mem::take(&mut *inner.tasks.lock());
        let finished = tokio::time::timeout(grace, futures::future::join_all(tasks.iter_mut()))
            .await
            .is_ok();

        if finished {
            tracing::debug!("client stopped");
            StopOutcome::Graceful
        } else {
            for task in &tasks {
                task.abort();
            }
            tracing::warn!(grace_ms = grace.as_millis() as u64, "client stop forced");
            StopOutcome::Forced
        }
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("uid", &self.uid())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skylink_core::BootstrapAddr;

    fn unreachable_config() -> ClientConfig {
        // Port 1 on loopback refuses connections immediately.
        ClientConfig::new(Uid::random(), vec![BootstrapAddr::tcp("127.0.0.1", 1)])
            .with_register_timeout(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn unreachable_bootstrap_fails_readiness() {
        let client = ClientHandle::start(unreachable_config());
        let err = client
            .wait_registered(Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ClientError::Start(StartError::Unreachable { .. })),
            "got {err:?}"
        );
        assert!(!client.is_ready());
        assert!(client.uid().is_none());
        client.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn empty_bootstrap_fails_readiness() {
        let client = ClientHandle::start(ClientConfig::new(Uid::random(), vec![]));
        assert_eq!(
            client.wait_registered(Duration::from_secs(1)).await,
            Err(ClientError::Start(StartError::NoBootstrap))
        );
        client.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let client = ClientHandle::start(unreachable_config());
        let first = client.stop(Duration::from_secs(1)).await;
        assert_ne!(first, StopOutcome::AlreadyStopped);

        let started = Instant::now();
        assert_eq!(
            client.stop(Duration::from_secs(1)).await,
            StopOutcome::AlreadyStopped
        );
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(client.is_stopped());
    }

    #[tokio::test]
    async fn stop_before_registration_fails_readiness() {
        // A listener that never answers keeps the handshake pending.
        let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = BootstrapAddr::from(silent.local_addr().unwrap());
        let config = ClientConfig::new(Uid::random(), vec![addr])
            .with_register_timeout(Duration::from_secs(30));
        let client = ClientHandle::start(config);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(client.readiness().is_none());
        client.stop(Duration::from_secs(1)).await;
        assert_eq!(
            client.readiness(),
            Some(Err(StartError::Stopped))
        );
    }

    #[tokio::test]
    async fn send_before_ready_is_rejected() {
        let client = ClientHandle::start(unreachable_config());
        let stream = client.open_stream(Uid::random());
        assert_eq!(stream.direction(), Direction::Outbound);
        assert_eq!(stream.send(&b"hi"[..]).await, Err(ClientError::NotReady));
        client.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn open_stream_reuses_endpoint_and_closes_on_stop() {
        let client = ClientHandle::start(unreachable_config());
        let peer = Uid::random();
        let a = client.open_stream(peer);
        let _b = client.open_stream(peer);
        assert_eq!(client.stream_count(), 1);

        client.stop(Duration::from_secs(1)).await;
        assert!(a.is_closed());
        assert_eq!(client.stream_count(), 0);
        assert!(client.open_stream(peer).is_closed());
    }

    #[tokio::test]
    async fn inbound_handler_fires_once_per_new_peer() {
        let client = ClientHandle::start(unreachable_config());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sub = {
            let seen = seen.clone();
            client.on_client_stream(move |s| seen.lock().push(s.peer()))
        };

        let alice = Uid::random();
        let bob = Uid::random();
        client.inner.deliver(alice, Bytes::from_static(b"1"));
        client.inner.deliver(alice, Bytes::from_static(b"2"));
        client.inner.deliver(bob, Bytes::from_static(b"3"));
        assert_eq!(*seen.lock(), vec![alice, bob]);

        sub.cancel();
        client.inner.deliver(Uid::random(), Bytes::from_static(b"4"));
        assert_eq!(seen.lock().len(), 2);

        client.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn pong_records_rtt() {
        let client = ClientHandle::start(unreachable_config());
        client.inner.pings.insert(7, Instant::now());
        client.inner.record_pong(7);
        assert!(client.last_rtt().is_some());
        client.inner.record_pong(99);
        client.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn unanswered_pings_do_not_accumulate() {
        let client = ClientHandle::start(unreachable_config());
        let stale = Instant::now()
            .checked_sub(PING_EXPIRY + Duration::from_secs(1))
            .unwrap();
        client.inner.pings.insert(u64::MAX, stale);
        client.inner.pings.insert(u64::MAX - 1, Instant::now());

        client.ping();
        assert!(!client.inner.pings.contains_key(&u64::MAX));
        assert!(client.inner.pings.contains_key(&(u64::MAX - 1)));

        client.stop(Duration::from_secs(1)).await;
        assert!(client.inner.pings.is_empty());
    }
}

//! The client's view of its registry connection, shared by the handle and
//! every stream endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use tokio::sync::mpsc;

use skylink_core::{Frame, Uid};

use crate::error::ClientError;

pub(crate) struct Link {
    uid: OnceLock<Uid>,
    stopped: AtomicBool,
    disconnected: AtomicBool,
    outbound: mpsc::Sender<Frame>,
}

impl Link {
    pub(crate) fn new(outbound: mpsc::Sender<Frame>) -> Self {
        Self {
            uid: OnceLock::new(),
            stopped: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            outbound,
        }
    }

    pub(crate) fn uid(&self) -> Option<Uid> {
        self.uid.get().copied()
    }

    pub(crate) fn set_uid(&self, uid: Uid) {
        let _ = self.uid.set(uid);
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Mark stopped. Returns the previous value.
    pub(crate) fn mark_stopped(&self) -> bool {
        self.stopped.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn mark_disconnected(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ClientError> {
        if self.is_stopped() {
            return Err(ClientError::Stopped);
        }
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(ClientError::Disconnected);
        }
        if self.uid.get().is_none() {
            return Err(ClientError::NotReady);
        }
        Ok(())
    }

    /// Queue a frame, waiting for queue capacity.
    pub(crate) async fn send(&self, frame: Frame) -> Result<(), ClientError> {
        self.check()?;
        self.outbound
            .send(frame)
            .await
            .map_err(|_| ClientError::Disconnected)
    }

    /// Queue a frame without waiting.
    pub(crate) fn try_send(&self, frame: Frame) -> Result<(), ClientError> {
        self.check()?;
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ClientError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ClientError::Disconnected,
        })
    }

    /// Queue the goodbye frame during shutdown, bypassing the stopped check.
    pub(crate) fn send_bye(&self) {
        if self.uid.get().is_some() {
            let _ = self.outbound.try_send(Frame::bye());
        }
    }
}

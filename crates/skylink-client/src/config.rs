//! Per-handle configuration.

use std::time::Duration;

use skylink_core::config::{ClientSettings, ConfigError};
use skylink_core::{BootstrapAddr, Uid};

/// What a [`crate::ClientHandle`] needs to register.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Application identity to register under.
    pub parent: Uid,
    /// Identity to re-use. `None` lets the registry assign one.
    pub uid: Option<Uid>,
    /// Registry locations, tried in order until one accepts a connection.
    pub bootstrap: Vec<BootstrapAddr>,
    /// The readiness signal completes (success or failure) within this bound.
    pub register_timeout: Duration,
    /// Depth of the outbound frame queue shared by all of the handle's streams.
    pub outbound_queue: usize,
    /// Envelopes a stream buffers for its consumer before dropping.
    pub inbound_buffer: usize,
}

impl ClientConfig {
    pub fn new(parent: Uid, bootstrap: Vec<BootstrapAddr>) -> Self {
        let defaults = ClientSettings::default();
        Self {
            parent,
            uid: None,
            bootstrap,
            register_timeout: Duration::from_millis(defaults.register_timeout_ms),
            outbound_queue: defaults.outbound_queue,
            inbound_buffer: defaults.inbound_buffer,
        }
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self, ConfigError> {
        Ok(Self {
            parent: settings.parent()?,
            uid: None,
            bootstrap: settings.bootstrap_addrs()?,
            register_timeout: Duration::from_millis(settings.register_timeout_ms),
            outbound_queue: settings.outbound_queue.max(1),
            inbound_buffer: settings.inbound_buffer.max(1),
        })
    }

    pub fn with_uid(mut self, uid: Uid) -> Self {
        self.uid = Some(uid);
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: Vec<BootstrapAddr>) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn with_register_timeout(mut self, timeout: Duration) -> Self {
        self.register_timeout = timeout;
        self
    }

    pub fn with_inbound_buffer(mut self, depth: usize) -> Self {
        self.inbound_buffer = depth.max(1);
        self
    }
}

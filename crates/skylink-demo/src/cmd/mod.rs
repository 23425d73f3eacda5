//! Demo commands and the client setup they share.

pub mod ping_pong;
pub mod point_to_point;

use std::time::Duration;

use anyhow::{Context, Result};

use skylink_client::{ClientConfig, ClientHandle};
use skylink_core::config::SkylinkConfig;
use skylink_registry::{EmbeddedRegistry, RegistryOptions};

/// Where the demo's clients register.
pub struct Environment {
    registry: Option<EmbeddedRegistry>,
    client: ClientConfig,
    stop_grace: Duration,
}

impl Environment {
    /// Load the client settings. With `embedded`, start an in-process
    /// registry and point the clients at it instead of the configured
    /// bootstrap addresses.
    pub async fn prepare(embedded: bool) -> Result<Self> {
        let config = SkylinkConfig::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            SkylinkConfig::default()
        });
        let mut client =
            ClientConfig::from_settings(&config.client).context("invalid client settings")?;
        let stop_grace = Duration::from_secs(config.client.stop_grace_secs);

        let registry = if embedded {
            let registry = EmbeddedRegistry::spawn(RegistryOptions::ephemeral())
                .await
                .context("failed to start embedded registry")?;
            tracing::info!(addr = %registry.addr(), "embedded registry started");
            client = client.with_bootstrap(vec![registry.bootstrap_addr()]);
            Some(registry)
        } else {
            None
        };

        Ok(Self {
            registry,
            client,
            stop_grace,
        })
    }

    /// Build from an explicit client config, for callers that manage
    /// their own registry.
    pub fn with_config(client: ClientConfig, stop_grace: Duration) -> Self {
        Self {
            registry: None,
            client,
            stop_grace,
        }
    }

    /// Start two clients concurrently and wait for both to register.
    /// Returns the handles and whether both became ready in time.
    pub async fn start_pair(&self) -> (ClientHandle, ClientHandle, bool) {
        let first = ClientHandle::start(self.client.clone());
        let second = ClientHandle::start(self.client.clone());
        let timeout = self.client.register_timeout;

        let (a, b) = tokio::join!(first.wait_ready(timeout), second.wait_ready(timeout));
        if a && b {
            println!("Clients are registered.");
        } else {
            println!("Error registering a client.");
            for (name, client) in [("first", &first), ("second", &second)] {
                if let Some(Err(e)) = client.readiness() {
                    tracing::warn!(client = name, error = %e, "registration failed");
                }
            }
        }
        (first, second, a && b)
    }

    /// Stop the clients, then the embedded registry if there is one.
    pub async fn finish(self, clients: &[ClientHandle]) {
        let grace = self.stop_grace;
        for client in clients {
            let outcome = client.stop(grace).await;
            tracing::debug!(uid = ?client.uid(), ?outcome, "client stopped");
        }
        if let Some(registry) = self.registry {
            registry.shutdown().await;
        }
    }
}

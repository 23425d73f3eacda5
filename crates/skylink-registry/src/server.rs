//! Accept loop and the in-process registry used by tests and the demo.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use skylink_core::config::RegistrySettings;
use skylink_core::BootstrapAddr;

use crate::connection::ConnectionHandler;
use crate::stats::RelayStats;
use crate::table::{new_client_table, ClientTable};

#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub listen_addr: String,
    /// Time a new connection has to send Register.
    pub handshake_timeout: Duration,
    /// Outbound queue depth per client.
    pub client_queue: usize,
}

impl RegistryOptions {
    /// Loopback on an OS-assigned port.
    pub fn ephemeral() -> Self {
        Self {
            listen_addr: "127.0.0.1:0".to_string(),
            ..Self::from(&RegistrySettings::default())
        }
    }
}

impl From<&RegistrySettings> for RegistryOptions {
    fn from(s: &RegistrySettings) -> Self {
        Self {
            listen_addr: s.listen_addr.clone(),
            handshake_timeout: Duration::from_secs(s.handshake_timeout_secs),
            client_queue: s.client_queue.max(1),
        }
    }
}

pub struct RegistryServer {
    listener: TcpListener,
    table: ClientTable,
    stats: RelayStats,
    options: RegistryOptions,
    next_conn_id: AtomicU64,
}

impl RegistryServer {
    pub async fn bind(options: RegistryOptions) -> Result<Self> {
        let listener = TcpListener::bind(&options.listen_addr)
            .await
            .with_context(|| format!("failed to bind registry on {}", options.listen_addr))?;
        Ok(Self {
            listener,
            table: new_client_table(),
            stats: RelayStats::new(),
            options,
            next_conn_id: AtomicU64::new(0),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn table(&self) -> ClientTable {
        self.table.clone()
    }

    pub fn stats(&self) -> RelayStats {
        self.stats.clone()
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        tracing::info!(addr = %self.local_addr()?, "registry listening");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("registry shutting down");
                    return Ok(());
                }

                result = self.listener.accept() => {
                    let (stream, addr) = match result {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(addr = %addr, conn_id, "connection accepted");

                    let handler = ConnectionHandler::new(
                        stream,
                        addr,
                        conn_id,
                        self.table.clone(),
                        self.stats.clone(),
                        self.options.handshake_timeout,
                        self.options.client_queue,
                        shutdown.resubscribe(),
                    );
                    tokio::spawn(async move {
                        if let Err(e) = handler.run().await {
                            tracing::warn!(addr = %addr, error = %e, "connection handler failed");
                        }
                    });
                }
            }
        }
    }
}

// ── Embedded ──────────────────────────────────────────────────────────────────

/// A registry running on the current runtime.
pub struct EmbeddedRegistry {
    addr: SocketAddr,
    table: ClientTable,
    stats: RelayStats,
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl EmbeddedRegistry {
    pub async fn spawn(options: RegistryOptions) -> Result<Self> {
        let server = RegistryServer::bind(options).await?;
        let addr = server.local_addr()?;
        let table = server.table();
        let stats = server.stats();
        let (shutdown, _) = broadcast::channel::<()>(1);

        let rx = shutdown.subscribe();
        let task = tokio::spawn(async move {
            if let Err(e) = server.run(rx).await {
                tracing::error!(error = %e, "embedded registry failed");
            }
        });

        Ok(Self {
            addr,
            table,
            stats,
            shutdown,
            task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Address to hand to clients.
    pub fn bootstrap_addr(&self) -> BootstrapAddr {
        BootstrapAddr::from(self.addr)
    }

    pub fn table(&self) -> ClientTable {
        self.table.clone()
    }

    pub fn stats(&self) -> RelayStats {
        self.stats.clone()
    }

    /// Stop accepting and drop every connection.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let _ = self.task.await;
    }
}

//! Online client table — assigned identity → live connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::mpsc;

use skylink_core::{Frame, Uid};

/// One registered client.
#[derive(Debug, Clone)]
pub struct ConnectedClient {
    /// Distinguishes a reconnect under the same identity from the original.
    pub conn_id: u64,
    pub parent: Uid,
    pub addr: SocketAddr,
    /// The connection's outbound queue.
    pub tx: mpsc::Sender<Frame>,
    pub connected_at: Instant,
}

/// Shared client table: assigned identity → connection.
pub type ClientTable = Arc<DashMap<Uid, ConnectedClient>>;

/// Create a new empty client table.
pub fn new_client_table() -> ClientTable {
    Arc::new(DashMap::new())
}

//! skylink-registry — the relay service clients register against.
//!
//! One task per accepted connection: registration exchange, then a reader
//! that routes frames into per-client outbound queues and a writer that
//! drains the connection's own queue.

pub mod connection;
pub mod server;
pub mod stats;
pub mod table;

pub use server::{EmbeddedRegistry, RegistryOptions, RegistryServer};
pub use stats::{RelayStats, StatsSnapshot};
pub use table::{new_client_table, ClientTable, ConnectedClient};

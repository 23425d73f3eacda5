//! skylink-client — client handles and point-to-point streams.
//!
//! A [`ClientHandle`] registers with a Skylink registry, then opens
//! [`StreamEndpoint`]s to other registered identities and receives the
//! streams they open towards it. All delivery is best effort over a single
//! registry hop; per-stream order is FIFO.

pub mod config;
mod connection;
pub mod error;
mod handle;
mod link;
pub mod stream;
pub mod subscription;

pub use config::ClientConfig;
pub use error::{ClientError, StartError};
pub use handle::{ClientHandle, StopOutcome};
pub use stream::{Direction, Envelope, StreamEndpoint};
pub use subscription::Subscription;

pub use skylink_core::{BootstrapAddr, Uid};

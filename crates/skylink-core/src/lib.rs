//! skylink-core — shared types, wire format, and configuration.
//! All other Skylink crates depend on this one.

pub mod completion;
pub mod config;
pub mod control;
pub mod endpoint;
pub mod frame;
pub mod identity;
pub mod wire;

pub use completion::Completion;
pub use endpoint::BootstrapAddr;
pub use frame::{read_frame, write_frame, Frame, FrameError};
pub use identity::Uid;
pub use wire::{FrameHeader, FrameKind, WireError};

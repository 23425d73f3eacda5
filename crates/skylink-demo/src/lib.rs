//! skylink-demo — point-to-point delivery check between two clients.

pub mod cmd;
pub mod verifier;

pub use verifier::{DeliveryVerifier, Verdict, DEFAULT_DELIVERY_TIMEOUT};

//! Daemon event loop.

pub mod orchdaemon;

pub use orchdaemon::{OrchDaemon, OrchDaemonConfig};

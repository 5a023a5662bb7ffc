//! Logging setup.
//!
//! The engine logs through the `log` facade only; binaries pick the backend. This
//! module wires up `env_logger` with defaults suited to the renderer.

mod init;

pub use init::{init_logging, LoggingConfig};

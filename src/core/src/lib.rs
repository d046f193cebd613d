//! A3S Dockerfile Core - shared error and configuration types.
//!
//! Used by the Dockerfile parser, resolver and printer in `a3s-dockerfile`.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::BuildArgs;
pub use error::{DockerfileError, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Jarvis Core - shared configuration and types for the lifecycle tooling.
//!
//! - **config**: deployment root resolution, environment overrides, well-known paths
//! - **pid**: the process id newtype shared by the handle store and the supervisor
//! - **signature**: the invocation string that identifies a Jarvis instance

pub mod config;
pub mod error;
pub mod pid;
pub mod signature;

pub use config::{DeploymentConfig, Timings};
pub use error::{ConfigError, Result};
pub use pid::Pid;
pub use signature::InstanceSignature;

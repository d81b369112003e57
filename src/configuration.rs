//! Process configuration: TOML file sections and command-line arguments.

pub mod config;
pub mod types;

pub use config::{Command, CommandLine, Config};
pub use types::{PortRange, RuntimeConfig, ServerConfig, StorageBackend, StorageConfig};

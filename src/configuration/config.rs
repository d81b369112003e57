use super::types::*;
use crate::error_handling::types::ConfigError;
use clap::{Parser, Subcommand};
use log::debug;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration loaded from a TOML file.
///
/// Every section is optional; missing keys fall back to their defaults so a
/// minimal file only needs to override what differs on the host.
///
/// # Example
///
/// ```toml
/// [server]
/// port = 5000
///
/// [runtime]
/// docker_host = "unix:///var/run/docker.sock"
/// image = "nginx:alpine"
///
/// [ports]
/// start = 8000
/// end = 8999
/// ```
///
/// # Fields Overview
///
/// - `server`: HTTP bind address and port, plus the host name used in container URLs
/// - `storage`: which record store backs users and containers, and where it lives
/// - `runtime`: how to reach the container daemon and how tenant containers are built
/// - `ports`: the half-open host port range the allocator draws from
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub runtime: RuntimeConfig,
    pub ports: PortRange,
}

impl Config {
    /// Reads and validates the configuration file at `path`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading configuration from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Parses and validates a configuration document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ports.start == 0 {
            return Err(ConfigError::BadPortsRange(
                "port range must start above 0".to_string(),
            ));
        }
        if self.ports.is_empty() {
            return Err(ConfigError::BadPortsRange(format!(
                "start ({}) must be lower than end ({})",
                self.ports.start, self.ports.end
            )));
        }
        if self.ports.contains(self.server.port) {
            return Err(ConfigError::BadPortsRange(format!(
                "HTTP port {} lies inside the container port range",
                self.server.port
            )));
        }
        if self.runtime.image.trim().is_empty() {
            return Err(ConfigError::InvalidValue("runtime.image is empty".to_string()));
        }
        if self.runtime.internal_port == 0 {
            return Err(ConfigError::InvalidValue(
                "runtime.internal_port must be non-zero".to_string(),
            ));
        }
        if self.runtime.container_prefix.is_empty() {
            return Err(ConfigError::InvalidValue(
                "runtime.container_prefix is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Command-line interface of the `berth` binary.
#[derive(Parser, Debug)]
#[command(name = "berth")]
#[command(version)]
#[command(about = "Per-tenant web server containers on a shared Docker host")]
pub struct CommandLine {
    /// Path to the TOML configuration file
    #[arg(env = "BERTH_CONFIG")]
    pub config_file: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Register a user record; the password must already be hashed upstream
    AddUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password_hash: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.ports, PortRange::new(8000, 8999));
        assert_eq!(config.runtime.image, "nginx:alpine");
        assert_eq!(config.runtime.stop_timeout_secs, 10);
        assert_eq!(config.runtime.docker_host, "unix:///var/run/docker.sock");
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_sections_override_defaults() {
        let raw = r#"
            [server]
            bind_address = "127.0.0.1"
            port = 9090

            [storage]
            backend = "memory"

            [runtime]
            docker_host = "tcp://10.0.0.2:2375"
            stop_timeout_secs = 3

            [ports]
            start = 20000
            end = 20010
        "#;
        let config = Config::from_toml_str(raw).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.runtime.docker_host, "tcp://10.0.0.2:2375");
        assert_eq!(config.runtime.stop_timeout_secs, 3);
        assert_eq!(config.runtime.image, "nginx:alpine");
        assert_eq!(config.ports.len(), 10);
    }

    #[test]
    fn test_inverted_port_range_is_rejected() {
        let err = Config::from_toml_str("[ports]\nstart = 9000\nend = 8000\n").unwrap_err();
        assert!(matches!(err, ConfigError::BadPortsRange(_)));

        let err = Config::from_toml_str("[ports]\nstart = 8000\nend = 8000\n").unwrap_err();
        assert!(matches!(err, ConfigError::BadPortsRange(_)));
    }

    #[test]
    fn test_http_port_inside_container_range_is_rejected() {
        let err = Config::from_toml_str("[server]\nport = 8005\n").unwrap_err();
        assert!(matches!(err, ConfigError::BadPortsRange(_)));
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let err = Config::from_toml_str("[runtime]\nimage = \"  \"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let err = Config::from_toml_str("[ports\nstart = 1").unwrap_err();
        assert!(matches!(err, ConfigError::TomlError(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("berth.toml");
        std::fs::write(&path, "[ports]\nstart = 8100\nend = 8200\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.ports, PortRange::new(8100, 8200));

        let missing = Config::from_file(&dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_command_line() {
        let cli = CommandLine::try_parse_from(["berth", "/etc/berth.toml"]).unwrap();
        assert_eq!(cli.config_file, PathBuf::from("/etc/berth.toml"));
        assert!(cli.command.is_none());

        let cli = CommandLine::try_parse_from([
            "berth",
            "berth.toml",
            "add-user",
            "--username",
            "soltani",
            "--email",
            "amal@example.com",
            "--password-hash",
            "$argon2id$v=19$stub",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Some(Command::AddUser {
                username: "soltani".to_string(),
                email: "amal@example.com".to_string(),
                password_hash: "$argon2id$v=19$stub".to_string(),
            })
        );
    }
}

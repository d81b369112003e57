use serde::Deserialize;
use std::path::PathBuf;

/// Half-open host port range `[start, end)` handed out to tenant containers.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: 8000,
            end: 8999,
        }
    }
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// Number of ports in the range.
    pub fn len(&self) -> usize {
        usize::from(self.end.saturating_sub(self.start))
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && port < self.end
    }
}

#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Host name used when building container URLs for clients.
    pub public_host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
            public_host: "localhost".to_string(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            database_path: PathBuf::from("instance/berth.sqlite3"),
        }
    }
}

/// Container runtime connection and provisioning parameters.
#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Daemon endpoint, e.g. `unix:///var/run/docker.sock` or `tcp://10.0.0.2:2375`.
    pub docker_host: String,
    /// The one image every tenant container is started from.
    pub image: String,
    /// Port the web server listens on inside the container.
    pub internal_port: u16,
    /// Host directory under which per-container content directories are created.
    pub content_root: PathBuf,
    /// Mount point of the content directory inside the container.
    pub content_mount: String,
    pub container_prefix: String,
    pub stop_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            docker_host: "unix:///var/run/docker.sock".to_string(),
            image: "nginx:alpine".to_string(),
            internal_port: 80,
            content_root: PathBuf::from("/tmp"),
            content_mount: "/usr/share/nginx/html".to_string(),
            container_prefix: "user".to_string(),
            stop_timeout_secs: 10,
            connect_timeout_secs: 120,
        }
    }
}

//! Core types used by the container management subsystem.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Label carrying the owning user's id on every tenant instance.
pub const OWNER_LABEL: &str = "user_id";
/// Label marking instances created by this service.
pub const MANAGED_BY_LABEL: &str = "managed_by";
pub const MANAGED_BY_VALUE: &str = "berth";

/// Normalized projection of the runtime's native instance states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Running,
    Exited,
    Removed,
    Unknown,
}

impl ContainerStatus {
    /// Maps a runtime-native status string onto the four-valued vocabulary.
    pub fn from_runtime(native: &str) -> Self {
        match native.trim().to_ascii_lowercase().as_str() {
            "running" | "restarting" => ContainerStatus::Running,
            "exited" | "created" | "dead" => ContainerStatus::Exited,
            "removing" | "removed" => ContainerStatus::Removed,
            _ => ContainerStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerStatus::Running => "running",
            ContainerStatus::Exited => "exited",
            ContainerStatus::Removed => "removed",
            ContainerStatus::Unknown => "unknown",
        }
    }

    /// Whether a record in this state still holds its host port.
    pub fn holds_port(&self) -> bool {
        !matches!(self, ContainerStatus::Removed)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ContainerStatus::Running),
            "exited" => Ok(ContainerStatus::Exited),
            "removed" => Ok(ContainerStatus::Removed),
            "unknown" => Ok(ContainerStatus::Unknown),
            other => Err(format!("unrecognised container status: {}", other)),
        }
    }
}

/// Runtime-native description of an instance, as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeInstance {
    pub id: String,
    pub name: String,
    /// Native status string, e.g. `running`, `exited`, `created`.
    pub status: String,
    pub image: String,
    pub labels: HashMap<String, String>,
}

impl RuntimeInstance {
    pub fn normalized_status(&self) -> ContainerStatus {
        ContainerStatus::from_runtime(&self.status)
    }
}

/// Everything the runtime needs to create one tenant instance.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateSpec {
    pub image: String,
    pub name: String,
    pub internal_port: u16,
    pub host_port: u16,
    /// Host directory bound read-only at `mount_target`.
    pub mount_source: PathBuf,
    pub mount_target: String,
    pub labels: HashMap<String, String>,
    /// Restart policy name understood by the runtime, e.g. `unless-stopped`.
    pub restart_policy: String,
}

/// Result of a successful provision: the fields a persisted record needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionedInstance {
    pub runtime_id: String,
    pub name: String,
    pub port: u16,
    pub status: ContainerStatus,
}

/// Counters describing the reconciler's activity since process start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainerStats {
    /// Instances created and started successfully.
    pub total_provisioned: u64,
    /// Provision attempts the runtime refused or failed.
    pub failed_provisions: u64,
    /// Instances removed through `delete`, including already-gone ones.
    pub total_removed: u64,
}

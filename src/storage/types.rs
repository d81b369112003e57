use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::container_management::types::ContainerStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Where a container record stands in the reserve-then-commit protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordPhase {
    /// Port and name are held; the runtime has not confirmed the instance yet.
    Reserved,
    /// The runtime instance exists and `runtime_id` is set.
    Committed,
}

impl RecordPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordPhase::Reserved => "reserved",
            RecordPhase::Committed => "committed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "reserved" => Some(RecordPhase::Reserved),
            "committed" => Some(RecordPhase::Committed),
            _ => None,
        }
    }
}

/// Persisted container record.
///
/// `status` caches the last observed runtime state and may be stale until
/// the next read path refreshes it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerRecord {
    pub id: i64,
    pub runtime_id: Option<String>,
    pub name: String,
    pub port: u16,
    pub status: ContainerStatus,
    pub owner_id: i64,
    pub phase: RecordPhase,
    pub created_at: DateTime<Utc>,
}

use serde::{Deserialize, Serialize};

use crate::container_management::ContainerStatus;
use crate::storage::ContainerRecord;

/// Container as shown to its owner.
#[derive(Debug, Serialize, PartialEq)]
pub struct ContainerView {
    pub id: i64,
    pub name: String,
    pub port: u16,
    pub status: ContainerStatus,
    pub url: String,
    pub created_at: String,
}

impl ContainerView {
    pub fn from_record(record: &ContainerRecord, url: String) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            port: record.port,
            status: record.status,
            url,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateContainerRequest {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ContainerStatus>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: String,
}

/// API error payload
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

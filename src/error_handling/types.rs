use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlError(String),
    #[error("Port range error: {0}")]
    BadPortsRange(String),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Storage write failed: {0}")]
    WriteFailed(String),
    #[error("Storage read failed: {0}")]
    ReadFailed(String),
    #[error("Container name already in use: {0}")]
    NameTaken(String),
    #[error("Port already reserved: {0}")]
    PortTaken(u16),
    #[error("Username already exists: {0}")]
    UsernameTaken(String),
    #[error("Email already registered: {0}")]
    EmailTaken(String),
    #[error("Record not found: {0}")]
    NotFound(i64),
}

/// Errors raised by a [`ContainerRuntime`](crate::container_management::ContainerRuntime)
/// implementation. Only the lifecycle reconciler consumes these; they are
/// translated before reaching callers.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("no such instance: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("runtime API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("runtime unreachable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocationError {
    #[error("no free port in range {start}..{end}")]
    PortsExhausted { start: u16, end: u16 },
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("container provisioning failed: {0}")]
    ProvisionError(String),
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("port allocation failed: {0}")]
    PortsExhausted(#[from] AllocationError),
    #[error("{0}")]
    Provision(String),
    #[error("caller does not own the requested container")]
    Unauthorized,
    #[error("invalid container name: {0}")]
    InvalidName(String),
    #[error("container name already in use: {0}")]
    NameTaken(String),
    #[error("runtime operation failed: {0}")]
    OperationFailed(String),
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl ServiceError {
    /// Short message safe to hand back to the caller.
    pub fn public_message(&self) -> &'static str {
        match self {
            ServiceError::PortsExhausted(_) => "No available ports",
            ServiceError::Provision(_) => "Failed to create container",
            ServiceError::Unauthorized => "Unauthorized",
            ServiceError::InvalidName(_) => "Invalid container name",
            ServiceError::NameTaken(_) => "Container name already in use",
            ServiceError::OperationFailed(_) => "Container operation failed",
            ServiceError::Storage(_) => "Internal error",
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NameTaken(name) => ServiceError::NameTaken(name),
            other => ServiceError::Storage(other),
        }
    }
}

impl From<LifecycleError> for ServiceError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::ProvisionError(msg) => ServiceError::Provision(msg),
            LifecycleError::RuntimeUnavailable(msg) => ServiceError::OperationFailed(msg),
        }
    }
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error("invalid bind address: {0}")]
    BadBindAddress(String),
}

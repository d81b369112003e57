//! The seam between this service and a container runtime.

use async_trait::async_trait;
use std::time::Duration;

use crate::container_management::types::{CreateSpec, RuntimeInstance};
use crate::error_handling::types::RuntimeError;

/// Lifecycle API of a container runtime.
///
/// Implementations must be safe for concurrent use: a single instance is
/// shared by every request handler.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Cheap reachability check.
    async fn ping(&self) -> Result<(), RuntimeError>;

    /// Creates (but does not start) an instance.
    async fn create(&self, spec: &CreateSpec) -> Result<RuntimeInstance, RuntimeError>;

    async fn inspect(&self, id: &str) -> Result<RuntimeInstance, RuntimeError>;

    /// Starting an already running instance succeeds.
    async fn start(&self, id: &str) -> Result<(), RuntimeError>;

    /// Stops the instance, killing it once `grace` has elapsed.
    /// Stopping an already stopped instance succeeds.
    async fn stop(&self, id: &str, grace: Duration) -> Result<(), RuntimeError>;

    async fn remove(&self, id: &str, force: bool) -> Result<(), RuntimeError>;

    /// All instances (running or not) carrying `label_key=label_value`.
    async fn list(
        &self,
        label_key: &str,
        label_value: &str,
    ) -> Result<Vec<RuntimeInstance>, RuntimeError>;

    /// The last `tail` lines of combined stdout/stderr.
    async fn logs(&self, id: &str, tail: usize) -> Result<String, RuntimeError>;
}

//! Container management subsystem.
//!
//! This module owns everything that touches the container runtime:
//!
//! - [`PortAllocator`]: lowest-free-port selection from the configured range.
//! - [`LifecycleReconciler`]: provision/start/stop/delete/status against the
//!   runtime, with runtime errors translated at its boundary.
//! - [`ContainerRuntime`]: the runtime seam, implemented for Docker by
//!   [`DockerRuntime`].
//! - [`ContainerLocks`]: per-record serialization of lifecycle operations.
//!
//! Example (non-running):
//! ```ignore
//! use std::sync::Arc;
//! use berth::configuration::Config;
//! use berth::container_management::{DockerRuntime, LifecycleReconciler};
//!
//! let config = Config::default();
//! let runtime = Arc::new(DockerRuntime::connect(&config.runtime)?);
//! let reconciler = LifecycleReconciler::connect(runtime, (&config.runtime).into()).await?;
//! let status = reconciler.query_status("4f2a9c").await;
//! println!("status: {}", status);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod docker_runtime;
#[cfg(test)]
pub mod fake_runtime;
pub mod locks;
pub mod payload;
pub mod port_allocator;
pub mod reconciler;
pub mod runtime;
pub mod types;

pub use docker_runtime::DockerRuntime;
pub use locks::ContainerLocks;
pub use port_allocator::PortAllocator;
pub use reconciler::{LifecycleReconciler, ReconcilerSettings};
pub use runtime::ContainerRuntime;
pub use types::{ContainerStats, ContainerStatus, ProvisionedInstance, RuntimeInstance};

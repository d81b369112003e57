//! Error taxonomy shared by every layer of the service.
//!
//! Runtime errors stop at the lifecycle reconciler; everything above it
//! speaks [`types::LifecycleError`] and [`types::ServiceError`].

pub mod types;

pub use types::{
    AllocationError, ConfigError, LifecycleError, RuntimeError, ServiceError, StorageError,
    WebError,
};

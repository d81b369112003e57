//! Tenancy core module.
//!
//! Ties users, their persisted container records and the lifecycle
//! reconciler together. Every intent arriving from the web layer goes
//! through [`ContainerService`], which checks ownership before touching the
//! runtime.

/// Submodule for the ownership-checked container service.
pub mod service;

pub use service::ContainerService;

//! Storage subsystem
//!
//! This module persists users and the ownership records of their containers.
//!
//! Components:
//! - `storage_trait`: the `ContainerStore` trait defining a uniform API.
//! - `types`: shared data types used by storage backends.
//! - `database_storage`: ORM-based SQLite implementation using SeaORM.
//! - `memory_storage`: in-process implementation for tests and throwaway runs.
//! - `db_entities`: SeaORM entity models for the database backend.

pub mod database_storage;
pub mod db_entities;
pub mod memory_storage;
pub mod storage_trait;
pub mod types;

pub use database_storage::DatabaseStorage;
pub use memory_storage::MemoryStorage;
pub use storage_trait::ContainerStore;
pub use types::{ContainerRecord, NewUser, RecordPhase, User};

//! Storage Trait
//!
//! This module defines the `ContainerStore` trait, the key-based record store
//! behind users and their containers.
//!
//! Implementors of this trait are responsible for:
//! - Persisting users with unique username and email
//! - Enforcing unique container names
//! - Enforcing that no two records whose status is not `removed` share a port
//! - Keeping reserved (uncommitted) records out of user-facing lookups

use async_trait::async_trait;
use std::collections::HashSet;

use crate::container_management::types::ContainerStatus;
use crate::error_handling::types::StorageError;
use crate::storage::types::{ContainerRecord, NewUser, User};

#[async_trait]
pub trait ContainerStore: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User, StorageError>;

    async fn get_user(&self, id: i64) -> Result<Option<User>, StorageError>;

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError>;

    /// Returns the user registered as `user.username`, creating it first if
    /// needed. An existing username with another email is a conflict.
    async fn ensure_user(&self, user: NewUser) -> Result<User, StorageError> {
        match self.get_user_by_username(&user.username).await? {
            Some(existing) if existing.email == user.email => Ok(existing),
            Some(_) => Err(StorageError::UsernameTaken(user.username)),
            None => self.create_user(user).await,
        }
    }

    /// Ports held by every record whose status is not `removed`, reserved
    /// records included.
    async fn occupied_ports(&self) -> Result<HashSet<u16>, StorageError>;

    /// Inserts a reserved record holding `name` and `port`.
    ///
    /// Fails with [`StorageError::NameTaken`] or [`StorageError::PortTaken`]
    /// when another record already holds either.
    async fn reserve(
        &self,
        owner_id: i64,
        name: &str,
        port: u16,
    ) -> Result<ContainerRecord, StorageError>;

    /// Turns a reservation into a committed record.
    async fn commit_reservation(
        &self,
        id: i64,
        runtime_id: &str,
        status: ContainerStatus,
    ) -> Result<ContainerRecord, StorageError>;

    /// Drops a reservation, freeing its name and port.
    async fn release_reservation(&self, id: i64) -> Result<(), StorageError>;

    /// Every record still in the reserved phase, oldest first.
    async fn reservations(&self) -> Result<Vec<ContainerRecord>, StorageError>;

    /// A committed record by id.
    async fn get_container(&self, id: i64) -> Result<Option<ContainerRecord>, StorageError>;

    /// Committed records of `owner_id`, oldest first.
    async fn list_containers(&self, owner_id: i64) -> Result<Vec<ContainerRecord>, StorageError>;

    /// Number of records of `owner_id` in any phase.
    async fn count_containers(&self, owner_id: i64) -> Result<usize, StorageError>;

    async fn name_exists(&self, name: &str) -> Result<bool, StorageError>;

    async fn update_status(&self, id: i64, status: ContainerStatus) -> Result<(), StorageError>;

    async fn delete_container(&self, id: i64) -> Result<(), StorageError>;
}

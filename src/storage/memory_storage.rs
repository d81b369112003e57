use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::container_management::types::ContainerStatus;
use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::ContainerStore;
use crate::storage::types::{ContainerRecord, NewUser, RecordPhase, User};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    containers: BTreeMap<i64, ContainerRecord>,
    next_user_id: i64,
    next_container_id: i64,
}

impl Tables {
    fn port_held_by_other(&self, port: u16, except: Option<i64>) -> bool {
        self.containers
            .values()
            .any(|r| Some(r.id) != except && r.port == port && r.status.holds_port())
    }
}

/// Process-local [`ContainerStore`] with the same constraints as the
/// database backend. Contents are lost on exit.
#[derive(Default)]
pub struct MemoryStorage {
    tables: Mutex<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContainerStore for MemoryStorage {
    async fn create_user(&self, user: NewUser) -> Result<User, StorageError> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(StorageError::UsernameTaken(user.username));
        }
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StorageError::EmailTaken(user.email));
        }
        tables.next_user_id += 1;
        let created = User {
            id: tables.next_user_id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            created_at: Utc::now(),
        };
        tables.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, StorageError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn occupied_ports(&self) -> Result<HashSet<u16>, StorageError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .containers
            .values()
            .filter(|r| r.status.holds_port())
            .map(|r| r.port)
            .collect())
    }

    async fn reserve(
        &self,
        owner_id: i64,
        name: &str,
        port: u16,
    ) -> Result<ContainerRecord, StorageError> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&owner_id) {
            return Err(StorageError::WriteFailed(format!(
                "unknown owner {}",
                owner_id
            )));
        }
        if tables.containers.values().any(|r| r.name == name) {
            return Err(StorageError::NameTaken(name.to_string()));
        }
        if tables.port_held_by_other(port, None) {
            return Err(StorageError::PortTaken(port));
        }
        tables.next_container_id += 1;
        let record = ContainerRecord {
            id: tables.next_container_id,
            runtime_id: None,
            name: name.to_string(),
            port,
            status: ContainerStatus::Unknown,
            owner_id,
            phase: RecordPhase::Reserved,
            created_at: Utc::now(),
        };
        tables.containers.insert(record.id, record.clone());
        Ok(record)
    }

    async fn commit_reservation(
        &self,
        id: i64,
        runtime_id: &str,
        status: ContainerStatus,
    ) -> Result<ContainerRecord, StorageError> {
        let mut tables = self.tables.lock().await;
        if status.holds_port() {
            let port = tables
                .containers
                .get(&id)
                .map(|r| r.port)
                .ok_or(StorageError::NotFound(id))?;
            if tables.port_held_by_other(port, Some(id)) {
                return Err(StorageError::PortTaken(port));
            }
        }
        let record = tables
            .containers
            .get_mut(&id)
            .ok_or(StorageError::NotFound(id))?;
        record.runtime_id = Some(runtime_id.to_string());
        record.status = status;
        record.phase = RecordPhase::Committed;
        Ok(record.clone())
    }

    async fn release_reservation(&self, id: i64) -> Result<(), StorageError> {
        let mut tables = self.tables.lock().await;
        if tables
            .containers
            .get(&id)
            .is_some_and(|r| r.phase == RecordPhase::Reserved)
        {
            tables.containers.remove(&id);
        }
        Ok(())
    }

    async fn reservations(&self) -> Result<Vec<ContainerRecord>, StorageError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .containers
            .values()
            .filter(|r| r.phase == RecordPhase::Reserved)
            .cloned()
            .collect())
    }

    async fn get_container(&self, id: i64) -> Result<Option<ContainerRecord>, StorageError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .containers
            .get(&id)
            .filter(|r| r.phase == RecordPhase::Committed)
            .cloned())
    }

    async fn list_containers(&self, owner_id: i64) -> Result<Vec<ContainerRecord>, StorageError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .containers
            .values()
            .filter(|r| r.owner_id == owner_id && r.phase == RecordPhase::Committed)
            .cloned()
            .collect())
    }

    async fn count_containers(&self, owner_id: i64) -> Result<usize, StorageError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .containers
            .values()
            .filter(|r| r.owner_id == owner_id)
            .count())
    }

    async fn name_exists(&self, name: &str) -> Result<bool, StorageError> {
        let tables = self.tables.lock().await;
        Ok(tables.containers.values().any(|r| r.name == name))
    }

    async fn update_status(&self, id: i64, status: ContainerStatus) -> Result<(), StorageError> {
        let mut tables = self.tables.lock().await;
        let port = tables
            .containers
            .get(&id)
            .map(|r| r.port)
            .ok_or(StorageError::NotFound(id))?;
        if status.holds_port() && tables.port_held_by_other(port, Some(id)) {
            return Err(StorageError::PortTaken(port));
        }
        if let Some(record) = tables.containers.get_mut(&id) {
            record.status = status;
        }
        Ok(())
    }

    async fn delete_container(&self, id: i64) -> Result<(), StorageError> {
        self.tables.lock().await.containers.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn with_owner() -> (MemoryStorage, i64) {
        let storage = MemoryStorage::new();
        let user = storage
            .create_user(NewUser {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password_hash: "x".into(),
            })
            .await
            .unwrap();
        (storage, user.id)
    }

    #[tokio::test]
    async fn duplicate_users_are_rejected() {
        let (storage, _) = with_owner().await;
        let dup = storage
            .create_user(NewUser {
                username: "alice".into(),
                email: "b@example.com".into(),
                password_hash: "x".into(),
            })
            .await;
        assert!(matches!(dup, Err(StorageError::UsernameTaken(_))));
        assert!(storage.get_user_by_username("alice").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn ensure_user_is_idempotent() {
        let (storage, owner) = with_owner().await;
        let again = storage
            .ensure_user(NewUser {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password_hash: "y".into(),
            })
            .await
            .unwrap();
        assert_eq!(again.id, owner);

        let clash = storage
            .ensure_user(NewUser {
                username: "alice".into(),
                email: "other@example.com".into(),
                password_hash: "y".into(),
            })
            .await;
        assert!(matches!(clash, Err(StorageError::UsernameTaken(_))));

        let bob = storage
            .ensure_user(NewUser {
                username: "bob".into(),
                email: "bob@example.com".into(),
                password_hash: "z".into(),
            })
            .await
            .unwrap();
        assert_ne!(bob.id, owner);
        assert_eq!(storage.get_user_by_username("bob").await.unwrap(), Some(bob));
    }

    #[tokio::test]
    async fn reservations_hold_ports_until_released() {
        let (storage, owner) = with_owner().await;
        let first = storage.reserve(owner, "site1", 8000).await.unwrap();
        assert!(matches!(
            storage.reserve(owner, "site2", 8000).await,
            Err(StorageError::PortTaken(8000))
        ));
        assert!(matches!(
            storage.reserve(owner, "site1", 8001).await,
            Err(StorageError::NameTaken(_))
        ));
        assert_eq!(storage.get_container(first.id).await.unwrap(), None);

        storage.release_reservation(first.id).await.unwrap();
        assert!(storage.occupied_ports().await.unwrap().is_empty());
        storage.reserve(owner, "site2", 8000).await.unwrap();
    }

    #[tokio::test]
    async fn reserve_rejects_unknown_owner() {
        let storage = MemoryStorage::new();
        assert!(storage.reserve(7, "site1", 8000).await.is_err());
    }

    #[tokio::test]
    async fn removed_records_free_their_port() {
        let (storage, owner) = with_owner().await;
        let first = storage.reserve(owner, "site1", 8000).await.unwrap();
        storage
            .commit_reservation(first.id, "rt1", ContainerStatus::Running)
            .await
            .unwrap();
        storage
            .update_status(first.id, ContainerStatus::Removed)
            .await
            .unwrap();

        let second = storage.reserve(owner, "site2", 8000).await.unwrap();
        storage
            .commit_reservation(second.id, "rt2", ContainerStatus::Running)
            .await
            .unwrap();
        // The old record cannot take the port back.
        assert!(matches!(
            storage.update_status(first.id, ContainerStatus::Running).await,
            Err(StorageError::PortTaken(8000))
        ));
    }

    #[tokio::test]
    async fn reservations_lists_only_uncommitted_records() {
        let (storage, owner) = with_owner().await;
        let a = storage.reserve(owner, "a", 8000).await.unwrap();
        let b = storage.reserve(owner, "b", 8001).await.unwrap();
        storage
            .commit_reservation(a.id, "rt-a", ContainerStatus::Running)
            .await
            .unwrap();

        assert_eq!(storage.count_containers(owner).await.unwrap(), 2);
        let pending = storage.reservations().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);
        assert_eq!(pending[0].name, "b");

        storage.release_reservation(b.id).await.unwrap();
        assert!(storage.reservations().await.unwrap().is_empty());
        assert_eq!(storage.list_containers(owner).await.unwrap().len(), 1);
        assert!(!storage.name_exists("b").await.unwrap());
    }
}

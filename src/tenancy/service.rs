use log::{debug, error, info, warn};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::container_management::payload::landing_page;
use crate::container_management::{
    ContainerLocks, ContainerStatus, LifecycleReconciler, PortAllocator,
};
use crate::error_handling::types::{ServiceError, StorageError};
use crate::storage::{ContainerRecord, ContainerStore, NewUser, User};

/// Accepted container names: what the runtime accepts, capped at 63 chars.
const NAME_PATTERN: &str = r"^[a-zA-Z0-9][a-zA-Z0-9_.-]{0,62}$";
/// Reservation attempts before giving up on repeated port conflicts.
const MAX_RESERVE_ATTEMPTS: usize = 8;
/// Number of log lines returned by [`ContainerService::logs`].
pub const LOG_TAIL: usize = 100;

/// Ownership-checked container intents.
///
/// # Fields Overview
///
/// - `store`: users and container records
/// - `reconciler`: the only path to the container runtime
/// - `allocator`: lowest-free-port selection
/// - `alloc_lock`: serializes port scan and reservation across creates
/// - `locks`: serializes lifecycle operations per record
/// - `public_host`: host name used to build container URLs
pub struct ContainerService {
    store: Arc<dyn ContainerStore>,
    reconciler: Arc<LifecycleReconciler>,
    allocator: PortAllocator,
    alloc_lock: Mutex<()>,
    locks: ContainerLocks,
    public_host: String,
}

impl ContainerService {
    pub fn new(
        store: Arc<dyn ContainerStore>,
        reconciler: Arc<LifecycleReconciler>,
        allocator: PortAllocator,
        public_host: impl Into<String>,
    ) -> Self {
        Self {
            store,
            reconciler,
            allocator,
            alloc_lock: Mutex::new(()),
            locks: ContainerLocks::new(),
            public_host: public_host.into(),
        }
    }

    pub fn reconciler(&self) -> &LifecycleReconciler {
        &self.reconciler
    }

    /// Address under which the container of `record` is reachable.
    pub fn url_for(&self, record: &ContainerRecord) -> String {
        format!("http://{}:{}", self.public_host, record.port)
    }

    pub async fn register_user(&self, user: NewUser) -> Result<User, ServiceError> {
        let user = self.store.create_user(user).await?;
        info!("Registered user {} (id {})", user.username, user.id);
        Ok(user)
    }

    pub async fn user(&self, id: i64) -> Result<Option<User>, ServiceError> {
        Ok(self.store.get_user(id).await?)
    }

    /// Drops reservations left behind by a previous process.
    ///
    /// A create interrupted after provisioning leaves a runtime instance
    /// under the reserved name. It is force-removed together with its
    /// content before the reservation goes. When the runtime cannot be
    /// listed the reservation is kept for the next boot.
    pub async fn reclaim_reservations(&self) -> Result<usize, ServiceError> {
        let mut reclaimed = 0;
        for reservation in self.store.reservations().await? {
            let instances = match self.reconciler.list_by_owner(reservation.owner_id).await {
                Ok(instances) => instances,
                Err(e) => {
                    warn!("Keeping reservation {}: {}", reservation.name, e);
                    continue;
                }
            };
            let mut orphans_removed = true;
            for orphan in instances.iter().filter(|i| i.name == reservation.name) {
                warn!(
                    "Removing instance {} left by an interrupted create",
                    orphan.id
                );
                orphans_removed &= self.reconciler.delete(&orphan.id).await;
            }
            if !orphans_removed {
                warn!("Keeping reservation {}: instance removal failed", reservation.name);
                continue;
            }
            self.reconciler.discard_content(&reservation.name).await;
            self.store.release_reservation(reservation.id).await?;
            reclaimed += 1;
        }
        if reclaimed > 0 {
            warn!("Reclaimed {} stale port reservation(s)", reclaimed);
        }
        Ok(reclaimed)
    }

    /// Provisions a new container for `owner`.
    ///
    /// The port is reserved in the store under the allocation lock, then the
    /// runtime is called without holding it. The reservation is committed on
    /// success and released on any failure.
    pub async fn create_container(
        &self,
        owner: &User,
        requested_name: Option<&str>,
    ) -> Result<ContainerRecord, ServiceError> {
        let reservation = {
            let _guard = self.alloc_lock.lock().await;
            let name = match requested_name.map(str::trim).filter(|n| !n.is_empty()) {
                Some(name) => {
                    validate_name(name)?;
                    if self.store.name_exists(name).await? {
                        return Err(ServiceError::NameTaken(name.to_string()));
                    }
                    name.to_string()
                }
                None => self.default_name(owner.id).await?,
            };
            self.reserve_port(owner.id, &name).await?
        };

        let payload = landing_page(&owner.username, &reservation.name, reservation.port);
        let provisioned = match self
            .reconciler
            .provision(owner.id, &reservation.name, reservation.port, &payload)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                warn!(
                    "Provisioning {} for user {} failed: {}",
                    reservation.name, owner.id, e
                );
                self.release(reservation.id).await;
                return Err(e.into());
            }
        };

        match self
            .store
            .commit_reservation(reservation.id, &provisioned.runtime_id, provisioned.status)
            .await
        {
            Ok(record) => {
                info!(
                    "User {} created container {} on port {}",
                    owner.id, record.name, record.port
                );
                Ok(record)
            }
            Err(e) => {
                error!(
                    "Failed to commit container {} ({}): {}",
                    reservation.name, provisioned.runtime_id, e
                );
                if !self.reconciler.delete(&provisioned.runtime_id).await {
                    error!(
                        "Orphaned runtime instance {} could not be removed",
                        provisioned.runtime_id
                    );
                }
                self.reconciler.discard_content(&reservation.name).await;
                self.release(reservation.id).await;
                Err(e.into())
            }
        }
    }

    /// Records of `owner` with their status refreshed from the runtime.
    ///
    /// Removed records are not queried again; the state is terminal.
    pub async fn list_containers(&self, owner: &User) -> Result<Vec<ContainerRecord>, ServiceError> {
        let records = self.store.list_containers(owner.id).await?;
        let mut listed = Vec::with_capacity(records.len());
        for mut record in records {
            if record.status == ContainerStatus::Removed {
                listed.push(record);
                continue;
            }
            let Some(runtime_id) = record.runtime_id.clone() else {
                listed.push(record);
                continue;
            };
            let _guard = self.locks.acquire(record.id).await;
            let status = self.reconciler.query_status(&runtime_id).await;
            if status != record.status {
                debug!(
                    "Container {} status changed: {} -> {}",
                    record.id, record.status, status
                );
                match self.store.update_status(record.id, status).await {
                    Ok(()) => {}
                    Err(StorageError::NotFound(_)) => {
                        // Deleted while this listing waited for its lock.
                        self.locks.forget(record.id);
                        continue;
                    }
                    Err(e) => {
                        warn!("Could not persist status of container {}: {}", record.id, e)
                    }
                }
                record.status = status;
            }
            listed.push(record);
        }
        Ok(listed)
    }

    /// Starts the container `id` and returns its refreshed status.
    pub async fn start(&self, owner: &User, id: i64) -> Result<ContainerStatus, ServiceError> {
        let (_guard, record, runtime_id) = self.lock_live(owner, id).await?;
        if !self.reconciler.start(&runtime_id).await {
            return Err(ServiceError::OperationFailed(format!(
                "start of container {} failed",
                record.name
            )));
        }
        self.refresh(&record, &runtime_id).await
    }

    /// Stops the container `id` and returns its refreshed status.
    pub async fn stop(&self, owner: &User, id: i64) -> Result<ContainerStatus, ServiceError> {
        let (_guard, record, runtime_id) = self.lock_live(owner, id).await?;
        if !self.reconciler.stop(&runtime_id).await {
            return Err(ServiceError::OperationFailed(format!(
                "stop of container {} failed",
                record.name
            )));
        }
        self.refresh(&record, &runtime_id).await
    }

    /// Removes the runtime instance, its content and its record.
    ///
    /// An instance already gone from the runtime only costs the record.
    pub async fn delete(&self, owner: &User, id: i64) -> Result<(), ServiceError> {
        let (_guard, record) = self.lock_owned(owner, id).await?;
        if let Some(runtime_id) = &record.runtime_id {
            if !self.reconciler.delete(runtime_id).await {
                return Err(ServiceError::OperationFailed(format!(
                    "removal of container {} failed",
                    record.name
                )));
            }
        }
        self.reconciler.discard_content(&record.name).await;
        self.store.delete_container(record.id).await?;
        self.locks.forget(record.id);
        info!("User {} deleted container {}", owner.id, record.name);
        Ok(())
    }

    /// Last [`LOG_TAIL`] log lines of the container `id`.
    pub async fn logs(&self, owner: &User, id: i64) -> Result<String, ServiceError> {
        let record = self.owned_record(owner, id).await?;
        match &record.runtime_id {
            Some(runtime_id) => Ok(self.reconciler.logs(runtime_id, LOG_TAIL).await),
            None => Ok("Container not found".to_string()),
        }
    }

    async fn default_name(&self, owner_id: i64) -> Result<String, ServiceError> {
        let prefix = &self.reconciler.settings().container_prefix;
        let mut n = self.store.count_containers(owner_id).await? + 1;
        loop {
            let name = format!("{}{}_nginx_{}", prefix, owner_id, n);
            if !self.store.name_exists(&name).await? {
                return Ok(name);
            }
            n += 1;
        }
    }

    /// Must run under `alloc_lock`.
    async fn reserve_port(&self, owner_id: i64, name: &str) -> Result<ContainerRecord, ServiceError> {
        let mut occupied = self.store.occupied_ports().await?;
        for _ in 0..MAX_RESERVE_ATTEMPTS {
            let port = self.allocator.allocate(&occupied)?;
            match self.store.reserve(owner_id, name, port).await {
                Ok(record) => return Ok(record),
                Err(StorageError::PortTaken(port)) => {
                    warn!("Port {} was taken concurrently, retrying", port);
                    occupied.insert(port);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ServiceError::OperationFailed(format!(
            "no port could be reserved for {} after {} attempts",
            name, MAX_RESERVE_ATTEMPTS
        )))
    }

    async fn release(&self, reservation_id: i64) {
        if let Err(e) = self.store.release_reservation(reservation_id).await {
            error!("Failed to release reservation {}: {}", reservation_id, e);
        }
    }

    async fn refresh(
        &self,
        record: &ContainerRecord,
        runtime_id: &str,
    ) -> Result<ContainerStatus, ServiceError> {
        let status = self.reconciler.query_status(runtime_id).await;
        self.store.update_status(record.id, status).await?;
        Ok(status)
    }

    /// Committed record `id` if it belongs to `owner`.
    ///
    /// Missing and foreign records are indistinguishable to the caller.
    async fn owned_record(&self, owner: &User, id: i64) -> Result<ContainerRecord, ServiceError> {
        match self.store.get_container(id).await? {
            Some(record) if record.owner_id == owner.id => Ok(record),
            Some(_) => {
                warn!("User {} denied access to container {}", owner.id, id);
                Err(ServiceError::Unauthorized)
            }
            None => Err(ServiceError::Unauthorized),
        }
    }

    async fn lock_owned(
        &self,
        owner: &User,
        id: i64,
    ) -> Result<(OwnedMutexGuard<()>, ContainerRecord), ServiceError> {
        // Checked before locking so foreign ids never get a lock entry.
        self.owned_record(owner, id).await?;
        let guard = self.locks.acquire(id).await;
        // The record may have been deleted while waiting.
        let record = self.owned_record(owner, id).await?;
        Ok((guard, record))
    }

    async fn lock_live(
        &self,
        owner: &User,
        id: i64,
    ) -> Result<(OwnedMutexGuard<()>, ContainerRecord, String), ServiceError> {
        let (guard, record) = self.lock_owned(owner, id).await?;
        if record.status == ContainerStatus::Removed {
            return Err(ServiceError::OperationFailed(format!(
                "container {} was removed",
                record.name
            )));
        }
        let runtime_id = record.runtime_id.clone().ok_or_else(|| {
            ServiceError::OperationFailed(format!("container {} has no runtime id", record.name))
        })?;
        Ok((guard, record, runtime_id))
    }
}

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(NAME_PATTERN).expect("container name pattern is valid"));

fn validate_name(name: &str) -> Result<(), ServiceError> {
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(ServiceError::InvalidName(name.to_string()))
    }
}

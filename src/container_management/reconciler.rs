use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::configuration::types::RuntimeConfig;
use crate::container_management::runtime::ContainerRuntime;
use crate::container_management::types::{
    ContainerStats, ContainerStatus, CreateSpec, ProvisionedInstance, RuntimeInstance,
    MANAGED_BY_LABEL, MANAGED_BY_VALUE, OWNER_LABEL,
};
use crate::error_handling::types::{LifecycleError, RuntimeError};

const RESTART_POLICY: &str = "unless-stopped";
const INDEX_FILE: &str = "index.html";

/// Provisioning parameters shared by every tenant instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilerSettings {
    pub image: String,
    pub internal_port: u16,
    pub content_root: PathBuf,
    pub content_mount: String,
    pub container_prefix: String,
    /// Grace period granted by `stop` before the runtime kills the instance.
    pub stop_grace: Duration,
}

impl From<&RuntimeConfig> for ReconcilerSettings {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            image: config.image.clone(),
            internal_port: config.internal_port,
            content_root: config.content_root.clone(),
            content_mount: config.content_mount.clone(),
            container_prefix: config.container_prefix.clone(),
            stop_grace: Duration::from_secs(config.stop_timeout_secs),
        }
    }
}

#[derive(Default)]
struct Counters {
    provisioned: AtomicU64,
    failed: AtomicU64,
    removed: AtomicU64,
}

/// Single point of contact with the container runtime.
///
/// Translates lifecycle intents into runtime calls and normalizes what comes
/// back. Runtime errors never cross this boundary: provisioning failures
/// become [`LifecycleError`], status queries degrade to
/// [`ContainerStatus::Removed`] or [`ContainerStatus::Unknown`], and
/// start/stop/delete report a plain `bool`.
pub struct LifecycleReconciler {
    runtime: Arc<dyn ContainerRuntime>,
    settings: ReconcilerSettings,
    counters: Counters,
}

impl LifecycleReconciler {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, settings: ReconcilerSettings) -> Self {
        Self {
            runtime,
            settings,
            counters: Counters::default(),
        }
    }

    /// Builds a reconciler after verifying the runtime answers a ping.
    ///
    /// Meant for process start: an unreachable runtime is fatal there.
    pub async fn connect(
        runtime: Arc<dyn ContainerRuntime>,
        settings: ReconcilerSettings,
    ) -> Result<Self, LifecycleError> {
        info!("Checking container runtime reachability");
        if let Err(e) = runtime.ping().await {
            error!("Container runtime is not reachable: {}", e);
            return Err(LifecycleError::RuntimeUnavailable(e.to_string()));
        }
        info!("Container runtime reachable, image {}", settings.image);
        Ok(Self::new(runtime, settings))
    }

    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    /// Host directory holding the content served by the instance `name`.
    pub fn content_dir(&self, name: &str) -> PathBuf {
        self.settings
            .content_root
            .join(format!("{}_{}", self.settings.container_prefix, name))
    }

    /// Creates and starts a tenant instance bound to host `port`.
    ///
    /// `payload` is written as the instance's `index.html` and mounted
    /// read-only. On any failure nothing is left behind: the content
    /// directory is removed and a created-but-unstarted instance is
    /// force-removed.
    pub async fn provision(
        &self,
        owner_id: i64,
        name: &str,
        port: u16,
        payload: &str,
    ) -> Result<ProvisionedInstance, LifecycleError> {
        info!(
            "Provisioning container {} for user {} on port {}",
            name, owner_id, port
        );

        let content_dir = self.content_dir(name);
        if let Err(e) = self.write_payload(&content_dir, payload).await {
            error!(
                "Failed to prepare content directory {}: {}",
                content_dir.display(),
                e
            );
            self.discard_content(name).await;
            return Err(self.provision_failed(format!("content preparation failed: {}", e)));
        }

        let mut labels = HashMap::new();
        labels.insert(OWNER_LABEL.to_string(), owner_id.to_string());
        labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());

        let spec = CreateSpec {
            image: self.settings.image.clone(),
            name: name.to_string(),
            internal_port: self.settings.internal_port,
            host_port: port,
            mount_source: content_dir,
            mount_target: self.settings.content_mount.clone(),
            labels,
            restart_policy: RESTART_POLICY.to_string(),
        };

        let instance = match self.runtime.create(&spec).await {
            Ok(instance) => instance,
            Err(e) => {
                error!("Runtime refused to create container {}: {}", name, e);
                self.discard_content(name).await;
                return Err(self.provision_failed(e.to_string()));
            }
        };
        debug!("Created runtime instance {} for {}", instance.id, name);

        if let Err(e) = self.runtime.start(&instance.id).await {
            error!("Runtime failed to start container {}: {}", name, e);
            if let Err(cleanup) = self.runtime.remove(&instance.id, true).await {
                warn!(
                    "Could not remove unstarted instance {}: {}",
                    instance.id, cleanup
                );
            }
            self.discard_content(name).await;
            return Err(self.provision_failed(e.to_string()));
        }

        self.counters.provisioned.fetch_add(1, Ordering::Relaxed);
        info!(
            "Container {} ({}) running on port {}",
            name, instance.id, port
        );
        Ok(ProvisionedInstance {
            runtime_id: instance.id,
            name: name.to_string(),
            port,
            status: ContainerStatus::Running,
        })
    }

    /// Current normalized status of `runtime_id`. Never fails.
    pub async fn query_status(&self, runtime_id: &str) -> ContainerStatus {
        match self.runtime.inspect(runtime_id).await {
            Ok(instance) => instance.normalized_status(),
            Err(RuntimeError::NotFound(_)) => {
                warn!("Container {} not found at runtime", runtime_id);
                ContainerStatus::Removed
            }
            Err(e) => {
                error!("Error getting status of container {}: {}", runtime_id, e);
                ContainerStatus::Unknown
            }
        }
    }

    pub async fn start(&self, runtime_id: &str) -> bool {
        match self.runtime.start(runtime_id).await {
            Ok(()) => {
                info!("Started container {}", runtime_id);
                true
            }
            Err(e) => {
                error!("Failed to start container {}: {}", runtime_id, e);
                false
            }
        }
    }

    pub async fn stop(&self, runtime_id: &str) -> bool {
        match self.runtime.stop(runtime_id, self.settings.stop_grace).await {
            Ok(()) => {
                info!("Stopped container {}", runtime_id);
                true
            }
            Err(e) => {
                error!("Failed to stop container {}: {}", runtime_id, e);
                false
            }
        }
    }

    /// Force-removes the instance. An instance that is already gone counts
    /// as deleted.
    pub async fn delete(&self, runtime_id: &str) -> bool {
        match self.runtime.remove(runtime_id, true).await {
            Ok(()) => {
                info!("Deleted container {}", runtime_id);
                self.counters.removed.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(RuntimeError::NotFound(_)) => {
                warn!("Container {} already gone at runtime", runtime_id);
                self.counters.removed.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                error!("Failed to delete container {}: {}", runtime_id, e);
                false
            }
        }
    }

    /// Instances the runtime holds for `owner_id`, independent of any
    /// persisted record.
    pub async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<RuntimeInstance>, LifecycleError> {
        let instances = self
            .runtime
            .list(OWNER_LABEL, &owner_id.to_string())
            .await
            .map_err(|e| {
                error!("Error listing containers of user {}: {}", owner_id, e);
                LifecycleError::RuntimeUnavailable(e.to_string())
            })?;
        let managed: Vec<RuntimeInstance> = instances
            .into_iter()
            .filter(|i| i.labels.get(MANAGED_BY_LABEL).map(String::as_str) == Some(MANAGED_BY_VALUE))
            .collect();
        debug!("User {} owns {} runtime instances", owner_id, managed.len());
        Ok(managed)
    }

    /// Last `tail` log lines of the instance, or a short placeholder.
    pub async fn logs(&self, runtime_id: &str, tail: usize) -> String {
        match self.runtime.logs(runtime_id, tail).await {
            Ok(logs) => logs,
            Err(RuntimeError::NotFound(_)) => "Container not found".to_string(),
            Err(e) => {
                error!("Error getting logs of container {}: {}", runtime_id, e);
                "Logs unavailable".to_string()
            }
        }
    }

    /// Best-effort removal of the content directory of `name`.
    pub async fn discard_content(&self, name: &str) {
        let dir = self.content_dir(name);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!("Removed content directory {}", dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove content directory {}: {}", dir.display(), e),
        }
    }

    pub fn stats(&self) -> ContainerStats {
        ContainerStats {
            total_provisioned: self.counters.provisioned.load(Ordering::Relaxed),
            failed_provisions: self.counters.failed.load(Ordering::Relaxed),
            total_removed: self.counters.removed.load(Ordering::Relaxed),
        }
    }

    async fn write_payload(&self, dir: &Path, payload: &str) -> std::io::Result<()> {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(dir.join(INDEX_FILE), payload).await
    }

    fn provision_failed(&self, diagnostic: String) -> LifecycleError {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        LifecycleError::ProvisionError(diagnostic)
    }
}

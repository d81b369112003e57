//! Docker Engine implementation of [`ContainerRuntime`] on top of `bollard`.
//!
//! This is the only module that sees `bollard` types. Every daemon error is
//! translated into a [`RuntimeError`] before it leaves this file.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::models::{
    ContainerInspectResponse, ContainerSummary, HostConfig, PortBinding, RestartPolicy,
    RestartPolicyNameEnum,
};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::stream::TryStreamExt;
use log::{debug, info};
use std::collections::HashMap;
use std::time::Duration;

use crate::configuration::types::RuntimeConfig;
use crate::container_management::runtime::ContainerRuntime;
use crate::container_management::types::{CreateSpec, RuntimeInstance};
use crate::error_handling::types::RuntimeError;

/// Client for a Docker-compatible daemon.
///
/// `bollard::Docker` is a cheap handle over a pooled HTTP client, so one
/// instance serves every request concurrently.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Builds a client for `config.docker_host`. No request is sent yet; use
    /// [`ContainerRuntime::ping`] to verify the daemon is reachable.
    pub fn connect(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        let host = config.docker_host.trim();
        let timeout = config.connect_timeout_secs;
        debug!("Connecting to container runtime at {:?}", host);

        let docker = if host.is_empty() {
            Docker::connect_with_local_defaults()
        } else if host.starts_with("tcp://") || host.starts_with("http://") {
            Docker::connect_with_http(host, timeout, API_DEFAULT_VERSION)
        } else {
            Docker::connect_with_unix(host, timeout, API_DEFAULT_VERSION)
        }
        .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;

        info!("Container runtime client configured for {}", host);
        Ok(Self { docker })
    }

    fn host_config(spec: &CreateSpec) -> HostConfig {
        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            format!("{}/tcp", spec.internal_port),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(spec.host_port.to_string()),
            }]),
        );

        HostConfig {
            port_bindings: Some(port_bindings),
            binds: Some(vec![format!(
                "{}:{}:ro",
                spec.mount_source.display(),
                spec.mount_target
            )]),
            restart_policy: Some(RestartPolicy {
                name: Some(restart_policy_name(&spec.restart_policy)),
                maximum_retry_count: None,
            }),
            ..Default::default()
        }
    }
}

fn restart_policy_name(policy: &str) -> RestartPolicyNameEnum {
    match policy {
        "always" => RestartPolicyNameEnum::ALWAYS,
        "on-failure" => RestartPolicyNameEnum::ON_FAILURE,
        "no" => RestartPolicyNameEnum::NO,
        _ => RestartPolicyNameEnum::UNLESS_STOPPED,
    }
}

fn translate(id: &str, err: BollardError) -> RuntimeError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404,
            message,
        } => RuntimeError::NotFound(format!("{}: {}", id, message)),
        BollardError::DockerResponseServerError {
            status_code: 409,
            message,
        } => RuntimeError::Conflict(message),
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => RuntimeError::Api {
            status: status_code,
            message,
        },
        other => RuntimeError::Unavailable(other.to_string()),
    }
}

/// 304 Not Modified: the instance is already in the requested state.
fn is_not_modified(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 304,
            ..
        }
    )
}

fn from_inspect(id: &str, response: ContainerInspectResponse) -> RuntimeInstance {
    let status = response
        .state
        .and_then(|state| state.status)
        .map(|status| status.to_string())
        .unwrap_or_default();
    let (image, labels) = match response.config {
        Some(config) => (
            config.image.unwrap_or_default(),
            config.labels.unwrap_or_default(),
        ),
        None => (String::new(), HashMap::new()),
    };
    RuntimeInstance {
        id: response.id.unwrap_or_else(|| id.to_string()),
        name: response
            .name
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_default(),
        status,
        image,
        labels,
    }
}

fn from_summary(summary: ContainerSummary) -> RuntimeInstance {
    RuntimeInstance {
        id: summary.id.unwrap_or_default(),
        name: summary
            .names
            .and_then(|names| names.into_iter().next())
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_default(),
        status: summary.state.unwrap_or_default(),
        image: summary.image.unwrap_or_default(),
        labels: summary.labels.unwrap_or_default(),
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))
    }

    async fn create(&self, spec: &CreateSpec) -> Result<RuntimeInstance, RuntimeError> {
        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(format!("{}/tcp", spec.internal_port), HashMap::new());

        let config = Config {
            image: Some(spec.image.clone()),
            labels: Some(spec.labels.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(Self::host_config(spec)),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| translate(&spec.name, e))?;
        for warning in &response.warnings {
            debug!("Runtime warning while creating {}: {}", spec.name, warning);
        }

        Ok(RuntimeInstance {
            id: response.id,
            name: spec.name.clone(),
            status: "created".to_string(),
            image: spec.image.clone(),
            labels: spec.labels.clone(),
        })
    }

    async fn inspect(&self, id: &str) -> Result<RuntimeInstance, RuntimeError> {
        let response = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| translate(id, e))?;
        Ok(from_inspect(id, response))
    }

    async fn start(&self, id: &str) -> Result<(), RuntimeError> {
        match self
            .docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_modified(&e) => Ok(()),
            Err(e) => Err(translate(id, e)),
        }
    }

    async fn stop(&self, id: &str, grace: Duration) -> Result<(), RuntimeError> {
        let options = StopContainerOptions {
            t: i64::try_from(grace.as_secs()).unwrap_or(i64::MAX),
        };
        match self.docker.stop_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_modified(&e) => Ok(()),
            Err(e) => Err(translate(id, e)),
        }
    }

    async fn remove(&self, id: &str, force: bool) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| translate(id, e))
    }

    async fn list(
        &self,
        label_key: &str,
        label_value: &str,
    ) -> Result<Vec<RuntimeInstance>, RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_string(),
            vec![format!("{}={}", label_key, label_value)],
        );
        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };
        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| translate(label_value, e))?;
        Ok(summaries.into_iter().map(from_summary).collect())
    }

    async fn logs(&self, id: &str, tail: usize) -> Result<String, RuntimeError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: tail.to_string(),
            ..Default::default()
        };
        let chunks: Vec<_> = self
            .docker
            .logs(id, Some(options))
            .try_collect()
            .await
            .map_err(|e| translate(id, e))?;
        Ok(chunks.iter().map(|chunk| chunk.to_string()).collect())
    }
}

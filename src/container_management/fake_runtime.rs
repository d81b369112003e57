//! In-memory [`ContainerRuntime`] used by unit tests.
//!
//! Mimics the daemon behaviours the reconciler cares about: name and host
//! port conflicts, idempotent start/stop, not-found errors, and an
//! unreachable daemon. Instances can be crashed or removed out of band.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::container_management::runtime::ContainerRuntime;
use crate::container_management::types::{CreateSpec, RuntimeInstance};
use crate::error_handling::types::RuntimeError;

#[derive(Default)]
struct FakeState {
    instances: HashMap<String, (RuntimeInstance, u16)>,
    next_id: u64,
    unreachable: bool,
    fail_next_create: Option<String>,
    fail_next_start: Option<String>,
    create_delay: Duration,
    calls: Vec<String>,
}

#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    pub fn fail_next_create(&self, message: &str) {
        self.state.lock().unwrap().fail_next_create = Some(message.to_string());
    }

    pub fn fail_next_start(&self, message: &str) {
        self.state.lock().unwrap().fail_next_start = Some(message.to_string());
    }

    pub fn set_create_delay(&self, delay: Duration) {
        self.state.lock().unwrap().create_delay = delay;
    }

    /// Removes an instance behind the service's back.
    pub fn vanish(&self, id: &str) {
        self.state.lock().unwrap().instances.remove(id);
    }

    /// Marks an instance as exited, as if its process died.
    pub fn crash(&self, id: &str) {
        if let Some((instance, _)) = self.state.lock().unwrap().instances.get_mut(id) {
            instance.status = "exited".to_string();
        }
    }

    pub fn native_status(&self, id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .instances
            .get(id)
            .map(|(i, _)| i.status.clone())
    }

    pub fn instance_count(&self) -> usize {
        self.state.lock().unwrap().instances.len()
    }

    pub fn host_port(&self, id: &str) -> Option<u16> {
        self.state.lock().unwrap().instances.get(id).map(|(_, p)| *p)
    }

    /// Names of the trait methods called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn enter(&self, call: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call.to_string());
        if state.unreachable {
            return Err(RuntimeError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.enter("ping")
    }

    async fn create(&self, spec: &CreateSpec) -> Result<RuntimeInstance, RuntimeError> {
        self.enter("create")?;
        let delay = self.state.lock().unwrap().create_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.fail_next_create.take() {
            return Err(RuntimeError::Api {
                status: 500,
                message,
            });
        }
        if state.instances.values().any(|(i, _)| i.name == spec.name) {
            return Err(RuntimeError::Conflict(format!(
                "container name {} is already in use",
                spec.name
            )));
        }
        if state.instances.values().any(|(_, p)| *p == spec.host_port) {
            return Err(RuntimeError::Api {
                status: 500,
                message: format!("port {} is already allocated", spec.host_port),
            });
        }

        state.next_id += 1;
        let instance = RuntimeInstance {
            id: format!("fake{:08}", state.next_id),
            name: spec.name.clone(),
            status: "created".to_string(),
            image: spec.image.clone(),
            labels: spec.labels.clone(),
        };
        state
            .instances
            .insert(instance.id.clone(), (instance.clone(), spec.host_port));
        Ok(instance)
    }

    async fn inspect(&self, id: &str) -> Result<RuntimeInstance, RuntimeError> {
        self.enter("inspect")?;
        let state = self.state.lock().unwrap();
        state
            .instances
            .get(id)
            .map(|(i, _)| i.clone())
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))
    }

    async fn start(&self, id: &str) -> Result<(), RuntimeError> {
        self.enter("start")?;
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.fail_next_start.take() {
            return Err(RuntimeError::Api {
                status: 500,
                message,
            });
        }
        match state.instances.get_mut(id) {
            Some((instance, _)) => {
                instance.status = "running".to_string();
                Ok(())
            }
            None => Err(RuntimeError::NotFound(id.to_string())),
        }
    }

    async fn stop(&self, id: &str, _grace: Duration) -> Result<(), RuntimeError> {
        self.enter("stop")?;
        let mut state = self.state.lock().unwrap();
        match state.instances.get_mut(id) {
            Some((instance, _)) => {
                instance.status = "exited".to_string();
                Ok(())
            }
            None => Err(RuntimeError::NotFound(id.to_string())),
        }
    }

    async fn remove(&self, id: &str, force: bool) -> Result<(), RuntimeError> {
        self.enter("remove")?;
        let mut state = self.state.lock().unwrap();
        match state.instances.get(id) {
            None => Err(RuntimeError::NotFound(id.to_string())),
            Some((instance, _)) if instance.status == "running" && !force => Err(
                RuntimeError::Conflict("cannot remove a running container".to_string()),
            ),
            Some(_) => {
                state.instances.remove(id);
                Ok(())
            }
        }
    }

    async fn list(
        &self,
        label_key: &str,
        label_value: &str,
    ) -> Result<Vec<RuntimeInstance>, RuntimeError> {
        self.enter("list")?;
        let state = self.state.lock().unwrap();
        let mut found: Vec<RuntimeInstance> = state
            .instances
            .values()
            .filter(|(i, _)| i.labels.get(label_key).map(String::as_str) == Some(label_value))
            .map(|(i, _)| i.clone())
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn logs(&self, id: &str, tail: usize) -> Result<String, RuntimeError> {
        self.enter("logs")?;
        let state = self.state.lock().unwrap();
        match state.instances.get(id) {
            Some((instance, _)) => Ok(format!(
                "{} log (last {} lines)\n",
                instance.name, tail
            )),
            None => Err(RuntimeError::NotFound(id.to_string())),
        }
    }
}

use super::{ContainerRegistry, DEFAULT_PROBE_TIMEOUT, HealthChecker};
use crate::domain::{
    ContainerHandle, ContainerRecord, ContainerRuntime, ContainerSpec, ContainerStatus, Error,
    Result,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Live record shared between the manager and the health checker
pub type SharedRecord = Arc<RwLock<ContainerRecord>>;

/// Owns the authoritative map of live containers.
///
/// Locks are never held across an engine call: the live map only guards
/// membership, and each record carries its own lock.
#[derive(Debug)]
pub struct ContainerManager {
    containers: RwLock<HashMap<String, SharedRecord>>,
    registry: ContainerRegistry,
    health: HealthChecker,
    runtime: Arc<dyn ContainerRuntime>,
}

impl ContainerManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self::with_probe_timeout(runtime, DEFAULT_PROBE_TIMEOUT)
    }

    pub fn with_probe_timeout(runtime: Arc<dyn ContainerRuntime>, probe_timeout: Duration) -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
            registry: ContainerRegistry::new(),
            health: HealthChecker::new(runtime.clone(), probe_timeout),
            runtime,
        }
    }

    pub fn registry(&self) -> &ContainerRegistry {
        &self.registry
    }

    pub fn health(&self) -> &HealthChecker {
        &self.health
    }

    /// Starts `name` from `spec` and returns a snapshot of the running record.
    ///
    /// A failure after the record was created leaves it in the live map with
    /// status `Error`; `stop_container` or `stop_all` clears it.
    pub async fn start_container(&self, name: &str, spec: &ContainerSpec) -> Result<ContainerRecord> {
        let record = {
            let mut containers = self.containers.write();
            if containers.contains_key(name) {
                return Err(Error::AlreadyExists(name.to_string()));
            }
            let record = Arc::new(RwLock::new(ContainerRecord::new(name, spec)));
            containers.insert(name.to_string(), record.clone());
            record
        };

        info!(container = %name, image = %spec.image, "Starting container");

        match self.launch(name, spec, &record).await {
            Ok(()) => {
                self.health.register(name, &record);
                let snapshot = record.read().clone();
                info!(
                    container = %name,
                    host = %snapshot.host,
                    ports = ?snapshot.ports,
                    "Container started successfully"
                );
                Ok(snapshot)
            }
            Err(e) => {
                record.write().set_status(ContainerStatus::Error);
                error!(container = %name, "Failed to start container: {}", e);
                Err(e)
            }
        }
    }

    async fn launch(&self, name: &str, spec: &ContainerSpec, record: &SharedRecord) -> Result<()> {
        let handle = self
            .runtime
            .launch(name, spec)
            .await
            .map_err(|e| Error::runtime(format!("failed to start container {name}"), e))?;
        record.write().handle = Some(handle.clone());

        let host = self
            .runtime
            .host(&handle)
            .await
            .map_err(|e| Error::runtime(format!("failed to get host of container {name}"), e))?;

        let ports = self.resolve_ports(name, spec, &handle).await?;
        record.write().mark_running(host, ports);
        Ok(())
    }

    /// All-or-nothing: the first port that cannot be resolved aborts the start
    async fn resolve_ports(
        &self,
        name: &str,
        spec: &ContainerSpec,
        handle: &ContainerHandle,
    ) -> Result<BTreeMap<u16, u16>> {
        let mut ports = BTreeMap::new();
        for &internal in &spec.ports {
            let external = self
                .runtime
                .mapped_port(handle, internal)
                .await
                .map_err(|e| {
                    Error::runtime(format!("failed to get mapped port {internal} of {name}"), e)
                })?;
            debug!(container = %name, "Port {} -> {}", internal, external);
            ports.insert(internal, external);
        }
        Ok(ports)
    }

    pub fn get_container(&self, name: &str) -> Option<ContainerRecord> {
        let record = self.containers.read().get(name).cloned()?;
        let snapshot = record.read().clone();
        Some(snapshot)
    }

    pub fn list_containers(&self) -> BTreeMap<String, ContainerRecord> {
        let records: Vec<SharedRecord> = self.containers.read().values().cloned().collect();
        records
            .iter()
            .map(|record| {
                let snapshot = record.read().clone();
                (snapshot.name.clone(), snapshot)
            })
            .collect()
    }

    pub fn get_container_endpoint(&self, name: &str, internal_port: u16) -> Result<String> {
        let record = self
            .get_container(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        record.endpoint(internal_port).ok_or(Error::PortNotFound {
            name: name.to_string(),
            port: internal_port,
        })
    }

    /// Stops and forgets `name`. When the engine fails to terminate it, the
    /// record stays in the live map with status `Error`.
    pub async fn stop_container(&self, name: &str) -> Result<()> {
        let record = self
            .containers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        info!(container = %name, "Stopping container");
        let handle = {
            let mut record = record.write();
            record.set_status(ContainerStatus::Stopping);
            record.handle.clone()
        };

        // Never probe a container mid-teardown
        self.health.deregister(name);

        if let Some(handle) = handle {
            if let Err(e) = self.runtime.terminate(&handle).await {
                record.write().set_status(ContainerStatus::Error);
                return Err(Error::runtime(format!("failed to stop container {name}"), e));
            }
        }

        record.write().set_status(ContainerStatus::Stopped);
        self.containers.write().remove(name);

        info!(container = %name, "Container stopped successfully");
        Ok(())
    }

    /// Best-effort teardown of every live container
    pub async fn stop_all(&self) {
        let names: Vec<String> = self.containers.read().keys().cloned().collect();
        if names.is_empty() {
            return;
        }

        info!("Stopping {} container(s)", names.len());
        for name in names {
            if let Err(e) = self.stop_container(&name).await {
                error!(container = %name, "Failed to stop container: {}", e);
            }
        }
    }
}

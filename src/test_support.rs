use crate::domain::{ContainerHandle, ContainerRuntime, ContainerSpec};
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Offset used for ports that were not mapped explicitly
const DEFAULT_PORT_OFFSET: u16 = 30000;

#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct MockContainer {
    pub name: String,
    pub spec: ContainerSpec,
    pub running: bool,
}

/// In-memory container engine. Handles carry the container name as id, and
/// every call is recorded as `operation:name`.
#[derive(Debug)]
pub struct MockRuntime {
    containers: RwLock<HashMap<String, MockContainer>>,
    commands: RwLock<Vec<String>>,
    fail_on: RwLock<Option<String>>,
    ports: RwLock<HashMap<u16, u16>>,
    host: String,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
            commands: RwLock::new(Vec::new()),
            fail_on: RwLock::new(None),
            ports: RwLock::new(HashMap::new()),
            host: "127.0.0.1".to_string(),
        }
    }

    /// Publishes `internal` on `external` for every container launched afterwards
    pub fn map_port(&self, internal: u16, external: u16) {
        self.ports.write().unwrap().insert(internal, external);
    }

    pub fn set_fail_on(&self, operation: &str) {
        *self.fail_on.write().unwrap() = Some(operation.to_string());
    }

    pub fn clear_fail_on(&self) {
        *self.fail_on.write().unwrap() = None;
    }

    /// Simulates the backing process dying (or coming back)
    pub fn set_running(&self, name: &str, running: bool) {
        if let Some(container) = self.containers.write().unwrap().get_mut(name) {
            container.running = running;
        }
    }

    pub fn get_commands(&self) -> Vec<String> {
        self.commands.read().unwrap().clone()
    }

    pub fn container_exists(&self, name: &str) -> bool {
        self.containers.read().unwrap().contains_key(name)
    }

    fn record_command(&self, cmd: &str) {
        self.commands.write().unwrap().push(cmd.to_string());
    }

    fn check_fail(&self, operation: &str) -> Result<()> {
        if let Some(ref fail_on) = *self.fail_on.read().unwrap() {
            if fail_on == operation {
                bail!("Mock failure on: {}", operation);
            }
        }
        Ok(())
    }

    fn require(&self, handle: &ContainerHandle) -> Result<MockContainer> {
        match self.containers.read().unwrap().get(&handle.id) {
            Some(container) => Ok(container.clone()),
            None => bail!("no such container: {}", handle.id),
        }
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn launch(&self, name: &str, spec: &ContainerSpec) -> Result<ContainerHandle> {
        self.record_command(&format!("launch:{}", name));
        self.check_fail("launch")?;

        self.containers.write().unwrap().insert(
            name.to_string(),
            MockContainer {
                name: name.to_string(),
                spec: spec.clone(),
                running: true,
            },
        );
        Ok(ContainerHandle::new(name))
    }

    async fn host(&self, handle: &ContainerHandle) -> Result<String> {
        self.record_command(&format!("host:{}", handle.id));
        self.check_fail("host")?;
        Ok(self.host.clone())
    }

    async fn mapped_port(&self, handle: &ContainerHandle, internal_port: u16) -> Result<u16> {
        self.record_command(&format!("mapped_port:{}:{}", handle.id, internal_port));
        self.check_fail("mapped_port")?;

        let container = self.require(handle)?;
        if !container.spec.ports.contains(&internal_port) {
            bail!("port {} not published by {}", internal_port, handle.id);
        }

        let mapped = self.ports.read().unwrap().get(&internal_port).copied();
        Ok(mapped.unwrap_or(DEFAULT_PORT_OFFSET + internal_port))
    }

    async fn is_running(&self, handle: &ContainerHandle) -> Result<bool> {
        self.record_command(&format!("is_running:{}", handle.id));
        self.check_fail("is_running")?;
        Ok(self.require(handle)?.running)
    }

    async fn terminate(&self, handle: &ContainerHandle) -> Result<()> {
        self.record_command(&format!("terminate:{}", handle.id));
        self.check_fail("terminate")?;

        self.containers.write().unwrap().remove(&handle.id);
        Ok(())
    }

    async fn is_available(&self) -> bool {
        self.record_command("is_available");
        true
    }
}

use crate::containers::ContainerManager;
use crate::domain::{ContainerRecord, ContainerSpec, Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Ties a service to the one backing container it owns
#[derive(Debug)]
pub struct ContainerBinding {
    container_name: String,
    spec: ContainerSpec,
    manager: Arc<ContainerManager>,
    started: AtomicBool,
}

impl ContainerBinding {
    pub fn new(manager: Arc<ContainerManager>, container_name: &str, spec: ContainerSpec) -> Self {
        Self {
            container_name: container_name.to_string(),
            spec,
            manager,
            started: AtomicBool::new(false),
        }
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub async fn start_container(&self) -> Result<ContainerRecord> {
        let record = self
            .manager
            .start_container(&self.container_name, &self.spec)
            .await?;
        self.started.store(true, Ordering::SeqCst);
        Ok(record)
    }

    /// Stops the bound container; a no-op when it was never started
    pub async fn stop_container(&self) -> Result<()> {
        if !self.started.load(Ordering::SeqCst) {
            return Ok(());
        }

        info!(container = %self.container_name, "Stopping bound container");
        self.manager.stop_container(&self.container_name).await?;
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn endpoint(&self, internal_port: u16) -> Result<String> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(Error::NotInitialized(self.container_name.clone()));
        }
        self.manager
            .get_container_endpoint(&self.container_name, internal_port)
    }

    /// Healthy while the bound container is `Running`
    pub fn health(&self) -> Result<()> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(Error::NotInitialized(self.container_name.clone()));
        }

        let record = self
            .manager
            .get_container(&self.container_name)
            .ok_or_else(|| Error::NotFound(self.container_name.clone()))?;

        if !record.is_running() {
            return Err(Error::NotRunning {
                name: self.container_name.clone(),
                status: record.status,
            });
        }

        Ok(())
    }
}

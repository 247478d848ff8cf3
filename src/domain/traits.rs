use super::{ContainerHandle, ContainerSpec};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for container engine operations
#[async_trait]
pub trait ContainerRuntime: Send + Sync + Debug {
    /// Launch a container named `name` from `spec`, publishing every port in `spec.ports`
    async fn launch(&self, name: &str, spec: &ContainerSpec) -> Result<ContainerHandle>;

    /// Host through which the published ports are reachable
    async fn host(&self, handle: &ContainerHandle) -> Result<String>;

    /// External port bound to `internal_port`
    async fn mapped_port(&self, handle: &ContainerHandle, internal_port: u16) -> Result<u16>;

    /// Whether the backing process is still running
    async fn is_running(&self, handle: &ContainerHandle) -> Result<bool>;

    /// Stop and remove the container
    async fn terminate(&self, handle: &ContainerHandle) -> Result<()>;

    /// Check if the engine is usable on this machine
    async fn is_available(&self) -> bool;
}

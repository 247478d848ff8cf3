pub mod cli;
pub mod containers;
pub mod domain;
pub mod gateway;
pub mod infra;
pub mod runtime;

// Make test_support available for integration tests
pub mod test_support;

pub use containers::{ContainerManager, HealthChecker};
pub use domain::{ContainerRecord, ContainerRuntime, ContainerSpec, ContainerStatus, Error, Result};
pub use gateway::StorageService;
pub use infra::{AppConfig, PodmanAdapter};
pub use runtime::{Server, Service};

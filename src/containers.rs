mod health;
mod manager;
mod registry;

pub use health::{DEFAULT_PROBE_TIMEOUT, HealthChecker};
pub use manager::{ContainerManager, SharedRecord};
pub use registry::ContainerRegistry;

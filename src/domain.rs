mod container;
pub mod error;
mod lifecycle;
pub mod traits;

pub use container::{
    ContainerHandle, ContainerRecord, ContainerSpec, ContainerStatus, ReadinessProbe,
};
pub use error::{Error, Result};
pub use lifecycle::{Phase, ServiceState};
pub use traits::ContainerRuntime;

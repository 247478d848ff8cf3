//! Error kinds shared by the container layer, the runtime and the gateway.
//!
//! Callers branch on the variant, never on the message. Failures coming out of
//! the container engine keep their `anyhow` chain inside [`Error::Runtime`].

use super::{ContainerStatus, Phase, ServiceState};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("container {0} already exists")]
    AlreadyExists(String),

    #[error("container {0} not found")]
    NotFound(String),

    #[error("port {port} not found for container {name}")]
    PortNotFound { name: String, port: u16 },

    #[error("container {0} not registered for health checking")]
    NotRegistered(String),

    #[error("container {name} is not running (status: {status})")]
    NotRunning { name: String, status: ContainerStatus },

    #[error("health check for {name} failed: {reason}")]
    Unhealthy { name: String, reason: String },

    #[error("container {0} not initialized")]
    NotInitialized(String),

    #[error("service {name} cannot move from {from} to {to}")]
    InvalidTransition {
        name: String,
        from: ServiceState,
        to: ServiceState,
    },

    #[error("service {name} is in error state: {reason}")]
    ServiceFailed { name: String, reason: String },

    #[error("failed to {phase} service {service}: {source}")]
    Lifecycle {
        phase: Phase,
        service: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to translate request: {0}")]
    Translation(String),

    #[error("proxy error: {0}")]
    Proxy(String),

    #[error("{context}: {source:#}")]
    Runtime {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("http server error: {0}")]
    Server(#[source] std::io::Error),
}

impl Error {
    pub fn runtime(context: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Runtime {
            context: context.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

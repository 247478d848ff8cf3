mod bootstrap;
mod server;
mod service;

pub use bootstrap::{build_server, register_services};
pub use server::{DEFAULT_SHUTDOWN_GRACE, HealthReport, Server};
pub use service::{Service, ServiceLifecycle, ServiceRegistry};

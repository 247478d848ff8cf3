pub mod config;
pub mod podman_adapter;

pub use config::{AppConfig, RuntimeConfig, ServerConfig, ServiceConfig, load_config};
pub use podman_adapter::PodmanAdapter;

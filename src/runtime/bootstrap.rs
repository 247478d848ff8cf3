use super::Server;
use crate::containers::ContainerManager;
use crate::domain::ContainerRuntime;
use crate::gateway::StorageService;
use crate::infra::AppConfig;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Builds a server whose container manager drives `runtime`, with every
/// enabled service from `config` registered.
pub fn build_server(config: &AppConfig, runtime: Arc<dyn ContainerRuntime>) -> Server {
    let manager = Arc::new(ContainerManager::with_probe_timeout(
        runtime,
        config.runtime.probe_timeout(),
    ));

    let mut server = Server::new(&config.server.bind_addr(), manager)
        .with_shutdown_grace(config.server.shutdown_grace());
    register_services(&mut server, config);
    server
}

/// Loads the container definitions and registers each enabled service.
///
/// A service whose container is not defined, or whose kind is unknown, is
/// logged and skipped; the others still register. Returns how many services
/// were registered.
pub fn register_services(server: &mut Server, config: &AppConfig) -> usize {
    let manager = server.container_manager();
    manager.registry().load_from_config(&config.containers);

    let mut registered = 0;
    for (name, service_config) in config.enabled_services() {
        let Some(spec) = manager.registry().get(&service_config.container) else {
            error!(
                service = %name,
                container = %service_config.container,
                "Container configuration not found, skipping service"
            );
            continue;
        };

        match name.as_str() {
            StorageService::NAME => {
                let service = StorageService::new(
                    manager.clone(),
                    &service_config.container,
                    spec,
                    service_config,
                );
                server.register_service(Arc::new(service));
                info!(service = %name, "Storage service registered");
                registered += 1;
            }
            other => warn!(service = %other, "No implementation for service, skipping"),
        }
    }

    registered
}

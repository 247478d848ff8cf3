use crate::domain::ContainerRuntime;
use crate::infra::{PodmanAdapter, load_config};
use anyhow::Result;
use std::path::Path;

pub async fn run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    println!("Configuration OK: {}", config_path.display());
    println!("  server: {}", config.server.bind_addr());
    for (name, spec) in &config.containers {
        println!("  container {} ({}) ports {:?}", name, spec.image, spec.ports);
    }
    for (name, service) in config.enabled_services() {
        println!("  service {} -> {}", name, service.container);
    }

    let engine = PodmanAdapter::new(
        &config.runtime.engine,
        &config.runtime.host,
        config.runtime.startup_timeout(),
    );
    if engine.is_available().await {
        println!("  engine: {} available", config.runtime.engine);
    } else {
        println!("  engine: {} NOT available", config.runtime.engine);
    }
    Ok(())
}

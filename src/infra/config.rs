use crate::domain::ContainerSpec;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CONFIG_PATH: &str = "configs/default.yaml";

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_grace_secs() -> u64 {
    5
}

fn default_engine() -> String {
    "podman".to_string()
}

fn default_engine_host() -> String {
    "127.0.0.1".to_string()
}

fn default_startup_timeout_secs() -> u64 {
    60
}

fn default_probe_timeout_secs() -> u64 {
    5
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Time in-flight requests and shutdown steps get before being abandoned
    #[serde(default = "default_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_grace_secs: default_grace_secs(),
        }
    }
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Container engine CLI (podman or a docker-compatible binary)
    #[serde(default = "default_engine")]
    pub engine: String,
    /// Host through which published container ports are reached
    #[serde(default = "default_engine_host")]
    pub host: String,
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            host: default_engine_host(),
            startup_timeout_secs: default_startup_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl RuntimeConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ServiceConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Name of the entry under `containers` backing this service
    pub container: String,
    /// Service-specific options
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
}

impl ServiceConfig {
    pub fn option_u16(&self, key: &str) -> Option<u16> {
        self.config
            .get(key)
            .and_then(serde_json::Value::as_u64)
            .and_then(|v| u16::try_from(v).ok())
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
    #[serde(default)]
    pub containers: BTreeMap<String, ContainerSpec>,
}

impl AppConfig {
    /// Checks everything the runtime cannot recover from later.
    ///
    /// Services pointing at undefined containers pass validation:
    /// bootstrap logs and skips them.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("server.port must be greater than zero");
        }

        for (name, spec) in &self.containers {
            validate_name(name)?;

            if spec.image.trim().is_empty() {
                bail!("Container '{}' has no 'image'", name);
            }

            if spec.ports.contains(&0) {
                bail!("Container '{}' declares port 0", name);
            }

            if let Some(probe) = &spec.wait_for {
                if probe.port > 0 && !spec.ports.contains(&probe.port) {
                    bail!(
                        "Container '{}' probes port {} which is not in its ports {:?}",
                        name,
                        probe.port,
                        spec.ports
                    );
                }
            }
        }

        Ok(())
    }

    /// Enabled services in name order
    pub fn enabled_services(&self) -> impl Iterator<Item = (&String, &ServiceConfig)> {
        self.services.iter().filter(|(_, svc)| svc.enabled)
    }
}

fn validate_name(name: &str) -> Result<()> {
    let Some(first_char) = name.chars().next() else {
        bail!("Empty container name found");
    };

    if !first_char.is_alphanumeric() {
        bail!("Container name '{}' must start with a letter or digit", name);
    }

    if let Some(c) = name
        .chars()
        .find(|c| !c.is_alphanumeric() && *c != '_' && *c != '.' && *c != '-')
    {
        bail!("Container name '{}' contains invalid character '{}'", name, c);
    }

    Ok(())
}

/// Expands `~` in a user supplied path
pub fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

/// Loads and validates the configuration file. `.toml` files are parsed as
/// TOML, anything else as YAML.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let path = expand_path(path);
    let content = fs::read_to_string(&path).with_context(|| format!("reading {:?}", path))?;

    let is_toml = path.extension().and_then(|ext| ext.to_str()) == Some("toml");
    let config: AppConfig = if is_toml {
        toml::from_str(&content).with_context(|| format!("parsing {:?}", path))?
    } else {
        serde_yml::from_str(&content).with_context(|| format!("parsing {:?}", path))?
    };

    config
        .validate()
        .with_context(|| format!("validating {:?}", path))?;

    debug!(
        "Loaded {} container(s) and {} service(s) from {:?}",
        config.containers.len(),
        config.services.len(),
        path
    );

    Ok(config)
}

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Readiness probe declared for a container (`wait_for` in the config file)
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
pub struct ReadinessProbe {
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub path: Option<String>,
}

impl ReadinessProbe {
    /// Port and path of the HTTP probe, when both are set
    pub fn http_target(&self) -> Option<(u16, &str)> {
        match self.path.as_deref() {
            Some(path) if self.port > 0 && !path.is_empty() => Some((self.port, path)),
            _ => None,
        }
    }
}

/// Immutable description of a backing container, loaded from configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
pub struct ContainerSpec {
    pub image: String,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub wait_for: Option<ReadinessProbe>,
}

impl ContainerSpec {
    pub fn http_probe(&self) -> Option<(u16, &str)> {
        self.wait_for.as_ref().and_then(ReadinessProbe::http_target)
    }
}

/// Opaque reference to a launched container, handed out by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
}

impl ContainerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone)]
pub struct ContainerRecord {
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
    pub host: String,
    /// internal -> external, populated only while `Running`
    pub ports: BTreeMap<u16, u16>,
    pub started_at: SystemTime,
    pub spec: ContainerSpec,
    pub handle: Option<ContainerHandle>,
}

impl ContainerRecord {
    pub fn new(name: &str, spec: &ContainerSpec) -> Self {
        Self {
            name: name.to_string(),
            image: spec.image.clone(),
            status: ContainerStatus::Starting,
            host: String::new(),
            ports: BTreeMap::new(),
            started_at: SystemTime::now(),
            spec: spec.clone(),
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == ContainerStatus::Running
    }

    /// Moves the record to `status`. Leaving `Running` drops the port mapping.
    pub fn set_status(&mut self, status: ContainerStatus) {
        self.status = status;
        if status != ContainerStatus::Running {
            self.ports.clear();
        }
    }

    pub fn mark_running(&mut self, host: String, ports: BTreeMap<u16, u16>) {
        self.host = host;
        self.status = ContainerStatus::Running;
        self.ports = ports;
    }

    pub fn endpoint(&self, internal_port: u16) -> Option<String> {
        self.ports
            .get(&internal_port)
            .map(|external| format!("http://{}:{}", self.host, external))
    }
}

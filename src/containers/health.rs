use super::SharedRecord;
use crate::domain::{ContainerRecord, ContainerRuntime, Error, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// On-demand health probing of running containers.
///
/// Registrations are weak: the lifecycle manager owns the records and
/// deregisters a container before dropping it.
#[derive(Debug)]
pub struct HealthChecker {
    registrations: RwLock<HashMap<String, Weak<RwLock<ContainerRecord>>>>,
    runtime: Arc<dyn ContainerRuntime>,
    client: reqwest::Client,
    timeout: Duration,
}

impl HealthChecker {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, timeout: Duration) -> Self {
        Self {
            registrations: RwLock::new(HashMap::new()),
            runtime,
            client: reqwest::Client::new(),
            timeout,
        }
    }

    pub fn register(&self, name: &str, record: &SharedRecord) {
        self.registrations
            .write()
            .insert(name.to_string(), Arc::downgrade(record));
    }

    pub fn deregister(&self, name: &str) {
        self.registrations.write().remove(name);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registrations.read().contains_key(name)
    }

    pub async fn check_health(&self, name: &str) -> Result<()> {
        let record = self
            .registrations
            .read()
            .get(name)
            .and_then(Weak::upgrade)
            .ok_or_else(|| Error::NotRegistered(name.to_string()))?;
        let snapshot: ContainerRecord = record.read().clone();

        if !snapshot.is_running() {
            return Err(Error::NotRunning {
                name: name.to_string(),
                status: snapshot.status,
            });
        }

        match snapshot.spec.http_probe() {
            Some((port, path)) => self.check_http(&snapshot, port, path).await,
            None => self.check_running(&snapshot).await,
        }
    }

    /// Probes every registered container, one after the other
    pub async fn check_all_health(&self) -> BTreeMap<String, Result<()>> {
        let names: Vec<String> = self.registrations.read().keys().cloned().collect();

        let mut results = BTreeMap::new();
        for name in names {
            let result = self.check_health(&name).await;
            results.insert(name, result);
        }
        results
    }

    async fn check_http(&self, record: &ContainerRecord, port: u16, path: &str) -> Result<()> {
        let external = record.ports.get(&port).ok_or_else(|| Error::PortNotFound {
            name: record.name.clone(),
            port,
        })?;

        let separator = if path.starts_with('/') { "" } else { "/" };
        let url = format!("http://{}:{}{}{}", record.host, external, separator, path);
        debug!("Probing {} at {}", record.name, url);

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Unhealthy {
                name: record.name.clone(),
                reason: format!("health check request failed: {e}"),
            })?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(Error::Unhealthy {
                name: record.name.clone(),
                reason: format!("health check returned status {}", status.as_u16()),
            });
        }

        Ok(())
    }

    async fn check_running(&self, record: &ContainerRecord) -> Result<()> {
        let Some(handle) = &record.handle else {
            return Err(Error::Unhealthy {
                name: record.name.clone(),
                reason: "container has no runtime handle".to_string(),
            });
        };

        match self.runtime.is_running(handle).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::Unhealthy {
                name: record.name.clone(),
                reason: "container is not running".to_string(),
            }),
            Err(e) => Err(Error::Unhealthy {
                name: record.name.clone(),
                reason: format!("{e:#}"),
            }),
        }
    }
}

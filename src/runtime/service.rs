use crate::domain::{Error, Result, ServiceState};
use async_trait::async_trait;
use axum::routing::MethodRouter;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;

/// Capability contract every emulated service implements.
///
/// The server drives `initialize`, `start` and `stop` sequentially, and mounts
/// `handler` on every path returned by `routes` (plus its whole subtree).
#[async_trait]
pub trait Service: Send + Sync {
    /// Service name (e.g. "storage")
    fn name(&self) -> &str;

    /// Prepares the service and its dependencies (backing containers)
    async fn initialize(&self) -> Result<()>;

    async fn start(&self) -> Result<()>;

    /// Gracefully shuts the service down
    async fn stop(&self) -> Result<()>;

    /// Current health; `Err` carries the reason the service is degraded
    async fn health(&self) -> Result<()>;

    /// Handler for every request under `routes`
    fn handler(&self) -> MethodRouter;

    /// Path prefixes owned by this service
    fn routes(&self) -> Vec<String>;
}

/// State machine shared by service implementations.
///
/// Once a transition fails the service stays in `Error` and every later call
/// reports that failure instead of running.
#[derive(Debug)]
pub struct ServiceLifecycle {
    name: String,
    inner: Mutex<LifecycleInner>,
}

#[derive(Debug)]
struct LifecycleInner {
    state: ServiceState,
    failure: Option<String>,
}

impl ServiceLifecycle {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inner: Mutex::new(LifecycleInner {
                state: ServiceState::Created,
                failure: None,
            }),
        }
    }

    pub fn state(&self) -> ServiceState {
        self.inner.lock().state
    }

    /// Fails with `ServiceFailed` once the service is in `Error`
    pub fn ensure_healthy_state(&self) -> Result<()> {
        let inner = self.inner.lock();
        match (&inner.state, &inner.failure) {
            (ServiceState::Error, failure) => Err(Error::ServiceFailed {
                name: self.name.clone(),
                reason: failure.clone().unwrap_or_default(),
            }),
            _ => Ok(()),
        }
    }

    /// Runs `step` and moves to `target` when it succeeds, or to `Error` when it fails
    pub async fn transition<F>(&self, target: ServiceState, step: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        self.ensure_healthy_state()?;

        let current = self.state();
        if !target.allowed_from().contains(&current) {
            return Err(Error::InvalidTransition {
                name: self.name.clone(),
                from: current,
                to: target,
            });
        }

        let result = step.await;

        let mut inner = self.inner.lock();
        match &result {
            Ok(()) => inner.state = target,
            Err(e) => {
                inner.state = ServiceState::Error;
                inner.failure = Some(e.to_string());
            }
        }
        result
    }
}

/// Registered services in registration order
#[derive(Default)]
pub struct ServiceRegistry {
    services: Vec<Arc<dyn Service>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `service`. A later registration with the same name replaces the
    /// earlier one and keeps its position.
    pub fn register(&mut self, service: Arc<dyn Service>) {
        match self.services.iter_mut().find(|s| s.name() == service.name()) {
            Some(existing) => *existing = service,
            None => self.services.push(service),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.services.iter().find(|s| s.name() == name).cloned()
    }

    pub fn all(&self) -> &[Arc<dyn Service>] {
        &self.services
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

//! Orchestration runtime: two-phase startup, HTTP dispatch, aggregated health
//! and shutdown sequencing.

use super::{Service, ServiceRegistry};
use crate::containers::ContainerManager;
use crate::domain::{Error, Phase, Result};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const HEALTH_ROUTE: &str = "/health";

/// Body of `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub services: BTreeMap<String, String>,
}

pub struct Server {
    registry: ServiceRegistry,
    containers: Arc<ContainerManager>,
    bind_addr: String,
    grace: Duration,
}

impl Server {
    pub fn new(bind_addr: &str, containers: Arc<ContainerManager>) -> Self {
        Self {
            registry: ServiceRegistry::new(),
            containers,
            bind_addr: bind_addr.to_string(),
            grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Time in-flight requests and each shutdown step get before being abandoned
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn register_service(&mut self, service: Arc<dyn Service>) {
        info!(service = %service.name(), routes = ?service.routes(), "Registering service");
        self.registry.register(service);
    }

    pub fn container_manager(&self) -> Arc<ContainerManager> {
        self.containers.clone()
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Mounts every service route (exact, trailing slash and `/*path` subtree)
    /// plus `/health`.
    /// A route claimed by several services belongs to the last one registered.
    pub fn router(&self) -> Router {
        let mut owners: BTreeMap<String, Arc<dyn Service>> = BTreeMap::new();
        for service in self.registry.all() {
            for route in service.routes() {
                let route = route.trim_end_matches('/').to_string();
                if !route.starts_with('/') || route == HEALTH_ROUTE {
                    warn!(service = %service.name(), "Skipping unusable route {:?}", route);
                    continue;
                }
                if let Some(previous) = owners.insert(route.clone(), service.clone()) {
                    if previous.name() != service.name() {
                        warn!(
                            "Route {} moved from service {} to {}",
                            route,
                            previous.name(),
                            service.name()
                        );
                    }
                }
            }
        }

        let mut router = Router::new();
        for (route, service) in owners {
            let handler = service.handler();
            router = router
                .route(&route, handler.clone())
                .route(&format!("{route}/"), handler.clone())
                .route(&format!("{route}/*path"), handler);
        }

        let services: Arc<[Arc<dyn Service>]> = self.registry.all().into();
        router
            .route(
                HEALTH_ROUTE,
                get(move || {
                    let services = services.clone();
                    async move { Json(health_report(&services).await) }
                }),
            )
            .layer(TraceLayer::new_for_http())
    }

    /// Brings every service up, then serves HTTP on the configured address
    /// until `shutdown` is cancelled. Returns `Error::Cancelled` after a clean
    /// shutdown.
    pub async fn start(&self, shutdown: CancellationToken) -> Result<()> {
        info!("Starting server on {}", self.bind_addr);
        self.bring_up(&shutdown).await?;

        let listener = match TcpListener::bind(&self.bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind {}: {}", self.bind_addr, e);
                self.tear_down(self.registry.all()).await;
                return Err(Error::Server(e));
            }
        };

        self.serve(listener, shutdown).await
    }

    /// Same as [`Server::start`] on an already bound listener
    pub async fn start_with_listener(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<()> {
        self.bring_up(&shutdown).await?;
        self.serve(listener, shutdown).await
    }

    /// Initialize phase then start phase, in registration order. The first
    /// failure rolls back every service reached so far.
    async fn bring_up(&self, shutdown: &CancellationToken) -> Result<()> {
        let services = self.registry.all();

        for phase in [Phase::Initialize, Phase::Start] {
            for (idx, service) in services.iter().enumerate() {
                info!(service = %service.name(), "Running {} phase", phase);

                let step = async {
                    match phase {
                        Phase::Initialize => service.initialize().await,
                        Phase::Start => service.start().await,
                    }
                };

                let result = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => Err(Error::Cancelled),
                    result = step => result,
                };

                if let Err(e) = result {
                    let reached = match phase {
                        Phase::Initialize => &services[..=idx],
                        Phase::Start => services,
                    };
                    error!(service = %service.name(), "Failed to {} service: {}", phase, e);
                    self.tear_down(reached).await;

                    return Err(match e {
                        Error::Cancelled => Error::Cancelled,
                        e => Error::Lifecycle {
                            phase,
                            service: service.name().to_string(),
                            source: Box::new(e),
                        },
                    });
                }
            }
        }

        Ok(())
    }

    async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let app = self.router();
        if let Ok(addr) = listener.local_addr() {
            info!("HTTP server listening on {}", addr);
        }

        let signal = shutdown.clone();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await
        });

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("Shutting down server due to cancellation");
                match timeout(self.grace, &mut server).await {
                    Ok(Ok(Ok(()))) => {}
                    Ok(Ok(Err(e))) => error!("Error during server shutdown: {}", e),
                    Ok(Err(e)) => error!("Server task failed: {}", e),
                    Err(_) => {
                        warn!("In-flight requests still running after {:?}, aborting", self.grace);
                        server.abort();
                    }
                }
                self.tear_down(self.registry.all()).await;
                Err(Error::Cancelled)
            }
            joined = &mut server => {
                // Graceful shutdown can finish before the cancel arm is polled
                if shutdown.is_cancelled() && matches!(joined, Ok(Ok(()))) {
                    info!("Server stopped after cancellation");
                    self.tear_down(self.registry.all()).await;
                    return Err(Error::Cancelled);
                }

                let err = match joined {
                    Ok(Err(e)) => e,
                    Ok(Ok(())) => std::io::Error::other("server exited unexpectedly"),
                    Err(e) => std::io::Error::other(e),
                };
                error!("HTTP server failed: {}", err);
                self.tear_down(self.registry.all()).await;
                Err(Error::Server(err))
            }
        }
    }

    /// Stops `services` in reverse order, then sweeps every container still
    /// alive. Failures are logged; teardown always runs to completion.
    async fn tear_down(&self, services: &[Arc<dyn Service>]) {
        for service in services.iter().rev() {
            info!(service = %service.name(), "Stopping service");
            match self.bounded(service.stop()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(service = %service.name(), "Error stopping service: {}", e),
                Err(_) => error!(
                    service = %service.name(),
                    "Service did not stop within {:?}", self.grace
                ),
            }
        }

        if self.bounded(self.containers.stop_all()).await.is_err() {
            error!("Containers did not stop within {:?}", self.grace);
        }
    }

    async fn bounded<F: Future>(&self, fut: F) -> std::result::Result<F::Output, tokio::time::error::Elapsed> {
        timeout(self.grace, fut).await
    }
}

async fn health_report(services: &[Arc<dyn Service>]) -> HealthReport {
    let mut report = BTreeMap::new();
    for service in services {
        let status = match service.health().await {
            Ok(()) => "healthy".to_string(),
            Err(e) => format!("degraded: {e}"),
        };
        report.insert(service.name().to_string(), status);
    }

    HealthReport {
        status: "ok",
        services: report,
    }
}

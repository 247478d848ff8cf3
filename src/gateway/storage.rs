use super::{ContainerBinding, ReverseProxy, StorageTranslator};
use crate::containers::ContainerManager;
use crate::domain::{ContainerSpec, Result, ServiceState};
use crate::infra::ServiceConfig;
use crate::runtime::{Service, ServiceLifecycle};
use async_trait::async_trait;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, any};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Cloud Storage emulation backed by an S3-compatible container
pub struct StorageService {
    inner: Arc<StorageInner>,
}

struct StorageInner {
    lifecycle: ServiceLifecycle,
    binding: ContainerBinding,
    translator: StorageTranslator,
    proxy: RwLock<Option<Arc<ReverseProxy>>>,
    backend_port: u16,
}

impl StorageService {
    pub const NAME: &'static str = "storage";
    pub const DEFAULT_BACKEND_PORT: u16 = 9000;

    pub fn new(
        manager: Arc<ContainerManager>,
        container_name: &str,
        spec: ContainerSpec,
        config: &ServiceConfig,
    ) -> Self {
        let backend_port = config
            .option_u16("backend_port")
            .unwrap_or(Self::DEFAULT_BACKEND_PORT);

        Self {
            inner: Arc::new(StorageInner {
                lifecycle: ServiceLifecycle::new(Self::NAME),
                binding: ContainerBinding::new(manager, container_name, spec),
                translator: StorageTranslator::new(),
                proxy: RwLock::new(None),
                backend_port,
            }),
        }
    }

    pub fn state(&self) -> ServiceState {
        self.inner.lifecycle.state()
    }

    /// Backend URL requests are forwarded to, once initialized
    pub fn backend_endpoint(&self) -> Option<String> {
        self.inner
            .proxy
            .read()
            .as_ref()
            .map(|proxy| proxy.target().to_string())
    }
}

impl StorageInner {
    async fn handle(&self, mut req: Request) -> Response {
        debug!(method = %req.method(), path = %req.uri().path(), "Storage request");

        if let Err(e) = self.translator.translate(&mut req) {
            error!("Failed to translate request: {}", e);
            return translation_failed();
        }

        let Some(proxy) = self.proxy.read().clone() else {
            warn!("Storage backend not ready");
            return unavailable();
        };

        match proxy.forward(req).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Proxy error: {}", e);
                unavailable()
            }
        }
    }
}

fn translation_failed() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Failed to translate request").into_response()
}

fn unavailable() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "Service temporarily unavailable").into_response()
}

#[async_trait]
impl Service for StorageService {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn initialize(&self) -> Result<()> {
        let inner = &self.inner;
        inner
            .lifecycle
            .transition(ServiceState::Initialized, async {
                inner.binding.start_container().await?;
                let endpoint = inner.binding.endpoint(inner.backend_port)?;
                let proxy = ReverseProxy::new(&endpoint)?;
                info!(
                    container = %inner.binding.container_name(),
                    "Storage backend at {}", endpoint
                );
                *inner.proxy.write() = Some(Arc::new(proxy));
                Ok(())
            })
            .await
    }

    async fn start(&self) -> Result<()> {
        self.inner
            .lifecycle
            .transition(ServiceState::Started, async { Ok(()) })
            .await
    }

    async fn stop(&self) -> Result<()> {
        let inner = &self.inner;
        inner
            .lifecycle
            .transition(ServiceState::Stopped, async {
                inner.proxy.write().take();
                inner.binding.stop_container().await
            })
            .await
    }

    async fn health(&self) -> Result<()> {
        self.inner.lifecycle.ensure_healthy_state()?;
        self.inner.binding.health()
    }

    fn handler(&self) -> MethodRouter {
        let inner = self.inner.clone();
        any(move |req: Request| {
            let inner = inner.clone();
            async move { inner.handle(req).await }
        })
    }

    fn routes(&self) -> Vec<String> {
        vec![
            "/storage".to_string(),
            "/upload/storage".to_string(),
            "/batch/storage".to_string(),
        ]
    }
}

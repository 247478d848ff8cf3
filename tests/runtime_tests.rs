use async_trait::async_trait;
use axum::routing::{MethodRouter, any};
use localcloud::containers::ContainerManager;
use localcloud::domain::{Error, Phase, Result};
use localcloud::runtime::{Server, Service};
use localcloud::test_support::MockRuntime;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type Events = Arc<Mutex<Vec<String>>>;

/// Service that records every lifecycle call and answers with its own name
struct FakeService {
    name: String,
    routes: Vec<String>,
    events: Events,
    fail_on: Option<&'static str>,
    healthy: bool,
}

impl FakeService {
    fn new(name: &str, route: &str, events: &Events) -> Self {
        Self {
            name: name.to_string(),
            routes: vec![route.to_string()],
            events: events.clone(),
            fail_on: None,
            healthy: true,
        }
    }

    fn failing_on(mut self, step: &'static str) -> Self {
        self.fail_on = Some(step);
        self
    }

    fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    fn step(&self, step: &str) -> Result<()> {
        self.events.lock().push(format!("{step}:{}", self.name));
        if self.fail_on == Some(step) {
            return Err(Error::ServiceFailed {
                name: self.name.clone(),
                reason: format!("{step} exploded"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Service for FakeService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> Result<()> {
        self.step("init")
    }

    async fn start(&self) -> Result<()> {
        self.step("start")
    }

    async fn stop(&self) -> Result<()> {
        self.step("stop")
    }

    async fn health(&self) -> Result<()> {
        if self.healthy {
            Ok(())
        } else {
            Err(Error::Unhealthy {
                name: self.name.clone(),
                reason: "backend down".into(),
            })
        }
    }

    fn handler(&self) -> MethodRouter {
        let name = self.name.clone();
        any(move || {
            let name = name.clone();
            async move { name }
        })
    }

    fn routes(&self) -> Vec<String> {
        self.routes.clone()
    }
}

fn new_server() -> (Server, Arc<MockRuntime>) {
    let mock = Arc::new(MockRuntime::new());
    let manager = Arc::new(ContainerManager::new(mock.clone()));
    let server = Server::new("127.0.0.1:0", manager).with_shutdown_grace(Duration::from_secs(2));
    (server, mock)
}

async fn spawn(server: Server) -> (SocketAddr, CancellationToken, JoinHandle<Result<()>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let token = CancellationToken::new();
    let shutdown = token.clone();
    let handle = tokio::spawn(async move { server.start_with_listener(listener, shutdown).await });
    (addr, token, handle)
}

fn events(events: &Events) -> Vec<String> {
    events.lock().clone()
}

#[tokio::test]
async fn test_two_phase_startup_and_reverse_shutdown() {
    let log = Events::default();
    let (mut server, _) = new_server();
    server.register_service(Arc::new(FakeService::new("a", "/alpha", &log)));
    server.register_service(Arc::new(FakeService::new("b", "/beta", &log)));

    let (addr, token, handle) = spawn(server).await;
    let body = reqwest::get(format!("http://{addr}/alpha"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "a");

    token.cancel();
    let result = handle.await.unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));

    assert_eq!(
        events(&log),
        ["init:a", "init:b", "start:a", "start:b", "stop:b", "stop:a"]
    );
}

#[tokio::test]
async fn test_initialize_failure_rolls_back_reached_services() {
    let log = Events::default();
    let (mut server, _) = new_server();
    server.register_service(Arc::new(FakeService::new("a", "/alpha", &log)));
    server.register_service(Arc::new(FakeService::new("b", "/beta", &log).failing_on("init")));
    server.register_service(Arc::new(FakeService::new("c", "/gamma", &log)));

    let (_, _token, handle) = spawn(server).await;
    let err = handle.await.unwrap().unwrap_err();

    match err {
        Error::Lifecycle { phase, service, source } => {
            assert_eq!(phase, Phase::Initialize);
            assert_eq!(service, "b");
            assert!(matches!(*source, Error::ServiceFailed { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }

    let log = events(&log);
    assert_eq!(log, ["init:a", "init:b", "stop:b", "stop:a"]);
    assert!(!log.contains(&"init:c".to_string()));
}

#[tokio::test]
async fn test_start_failure_stops_every_service() {
    let log = Events::default();
    let (mut server, _) = new_server();
    server.register_service(Arc::new(FakeService::new("a", "/alpha", &log).failing_on("start")));
    server.register_service(Arc::new(FakeService::new("b", "/beta", &log)));

    let (_, _token, handle) = spawn(server).await;
    let err = handle.await.unwrap().unwrap_err();

    assert!(matches!(err, Error::Lifecycle { phase: Phase::Start, .. }));
    assert!(err.to_string().starts_with("failed to start service a"));
    assert_eq!(events(&log), ["init:a", "init:b", "start:a", "stop:b", "stop:a"]);
}

#[tokio::test]
async fn test_cancel_before_startup() {
    let log = Events::default();
    let (mut server, _) = new_server();
    server.register_service(Arc::new(FakeService::new("a", "/alpha", &log)));

    let token = CancellationToken::new();
    token.cancel();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

    let result = server.start_with_listener(listener, token).await;
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(!events(&log).contains(&"start:a".to_string()));
}

#[tokio::test]
async fn test_health_endpoint_aggregates_services() {
    let log = Events::default();
    let (mut server, _) = new_server();
    server.register_service(Arc::new(FakeService::new("a", "/alpha", &log)));
    server.register_service(Arc::new(FakeService::new("b", "/beta", &log).unhealthy()));

    let (addr, token, handle) = spawn(server).await;
    let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(response.status(), 200);

    let report: serde_json::Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
    assert_eq!(report["status"], "ok");
    assert_eq!(report["services"]["a"], "healthy");
    assert_eq!(
        report["services"]["b"],
        "degraded: health check for b failed: backend down"
    );

    token.cancel();
    let _ = handle.await.unwrap();
}

#[tokio::test]
async fn test_routing_subtrees_and_last_registration_wins() {
    let log = Events::default();
    let (mut server, _) = new_server();
    server.register_service(Arc::new(FakeService::new("a", "/shared", &log)));
    server.register_service(Arc::new(FakeService::new("b", "/shared", &log)));
    server.register_service(Arc::new(FakeService::new("c", "/own", &log)));

    let (addr, token, handle) = spawn(server).await;
    let get = move |path: &'static str| async move {
        let response = reqwest::get(format!("http://{addr}{path}")).await.unwrap();
        (response.status().as_u16(), response.text().await.unwrap())
    };

    assert_eq!(get("/shared").await, (200, "b".to_string()));
    assert_eq!(get("/shared/deep/path").await, (200, "b".to_string()));
    assert_eq!(get("/own/x").await, (200, "c".to_string()));
    assert_eq!(get("/unknown").await.0, 404);

    token.cancel();
    let _ = handle.await.unwrap();
}

#[tokio::test]
async fn test_reregistering_a_name_replaces_the_service() {
    let log = Events::default();
    let (mut server, _) = new_server();
    server.register_service(Arc::new(FakeService::new("a", "/first", &log)));
    server.register_service(Arc::new(FakeService::new("a", "/second", &log)));

    assert_eq!(server.services().len(), 1);
    assert_eq!(server.services().get("a").unwrap().routes(), ["/second"]);
}

#[tokio::test]
async fn test_bind_failure_tears_down_services() {
    let log = Events::default();
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap();

    let manager = Arc::new(ContainerManager::new(Arc::new(MockRuntime::new())));
    let mut server = Server::new(&addr.to_string(), manager);
    server.register_service(Arc::new(FakeService::new("a", "/alpha", &log)));

    let err = server.start(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, Error::Server(_)));
    assert_eq!(events(&log), ["init:a", "start:a", "stop:a"]);
}

#[tokio::test]
async fn test_shutdown_sweeps_leftover_containers() {
    let log = Events::default();
    let (mut server, mock) = new_server();
    server.register_service(Arc::new(FakeService::new("a", "/alpha", &log)));
    let manager = server.container_manager();
    manager
        .start_container(
            "orphan",
            &localcloud::domain::ContainerSpec {
                image: "busybox".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let (_, token, handle) = spawn(server).await;
    token.cancel();
    let _ = handle.await.unwrap();

    assert!(manager.list_containers().is_empty());
    assert!(mock.get_commands().contains(&"terminate:orphan".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancellation_always_reports_cancelled() {
    for _ in 0..50 {
        let log = Events::default();
        let (mut server, _) = new_server();
        server.register_service(Arc::new(FakeService::new("a", "/alpha", &log)));

        let (_, token, handle) = spawn(server).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        token.cancel();

        let result = handle.await.unwrap();
        assert!(
            result.as_ref().is_err_and(Error::is_cancelled),
            "expected cancellation, got {result:?}"
        );
    }
}

#[tokio::test]
async fn test_trailing_slash_reaches_the_service() {
    let log = Events::default();
    let (mut server, _) = new_server();
    server.register_service(Arc::new(FakeService::new("a", "/alpha", &log)));

    let (addr, token, handle) = spawn(server).await;
    let response = reqwest::get(format!("http://{addr}/alpha/")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "a");

    token.cancel();
    let _ = handle.await.unwrap();
}

use localcloud::domain::Error;
use localcloud::infra::{AppConfig, load_config};
use localcloud::runtime::build_server;
use localcloud::test_support::MockRuntime;
use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONFIG: &str = r#"
server:
  port: 8080
  shutdown_grace_secs: 2
services:
  storage:
    enabled: true
    container: minio
    config:
      backend_port: 9000
containers:
  minio:
    image: quay.io/minio/minio
    ports: [9000]
    command: [server, /data]
"#;

fn load() -> AppConfig {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("localcloud.yaml");
    fs::write(&file, CONFIG).unwrap();
    load_config(&file).unwrap()
}

struct Gateway {
    addr: SocketAddr,
    token: CancellationToken,
    handle: JoinHandle<localcloud::Result<()>>,
    mock: Arc<MockRuntime>,
}

impl Gateway {
    /// Serves the storage gateway with the minio container published on `backend_port`
    async fn start(backend_port: u16) -> Self {
        let mock = Arc::new(MockRuntime::new());
        mock.map_port(9000, backend_port);
        let server = build_server(&load(), mock.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = CancellationToken::new();
        let shutdown = token.clone();
        let handle = tokio::spawn(async move { server.start_with_listener(listener, shutdown).await });

        Self { addr, token, handle, mock }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn shutdown(self) -> Arc<MockRuntime> {
        self.token.cancel();
        let result = self.handle.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
        self.mock
    }
}

#[tokio::test]
async fn test_bucket_request_is_translated_and_scrubbed() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/test-bucket"))
        .respond_with(ResponseTemplate::new(200).set_body_string("bucket listing"))
        .expect(1)
        .mount(&backend)
        .await;

    let gateway = Gateway::start(backend.address().port()).await;
    let response = reqwest::Client::new()
        .get(gateway.url("/storage/v1/b/test-bucket"))
        .header("authorization", "Bearer token")
        .header("x-goog-api-key", "key")
        .header("x-goog-user-project", "project")
        .header("x-custom", "kept")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "bucket listing");

    let received = backend.received_requests().await.unwrap();
    let headers = &received[0].headers;
    assert!(headers.get("authorization").is_none());
    assert!(headers.get("x-goog-api-key").is_none());
    assert!(headers.get("x-goog-user-project").is_none());
    assert_eq!(headers.get("x-custom").unwrap(), "kept");
    assert!(headers.get("x-forwarded-host").is_some());

    let mock = gateway.shutdown().await;
    assert!(mock.get_commands().contains(&"terminate:minio".to_string()));
}

#[tokio::test]
async fn test_object_download_keeps_query() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bucket/dir/file.txt"))
        .and(query_param("alt", "media"))
        .respond_with(ResponseTemplate::new(200).set_body_string("contents"))
        .expect(1)
        .mount(&backend)
        .await;

    let gateway = Gateway::start(backend.address().port()).await;
    let response = reqwest::get(gateway.url("/storage/v1/b/bucket/o/dir/file.txt?alt=media"))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "contents");
    gateway.shutdown().await;
}

#[tokio::test]
async fn test_upload_forwards_body() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bucket/"))
        .and(query_param("name", "a.txt"))
        .and(body_string("hello world"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&backend)
        .await;

    let gateway = Gateway::start(backend.address().port()).await;
    let response = reqwest::Client::new()
        .post(gateway.url("/upload/storage/v1/b/bucket/o?uploadType=media&name=a.txt"))
        .body("hello world")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    gateway.shutdown().await;
}

#[tokio::test]
async fn test_backend_status_is_passed_through() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("NoSuchBucket"))
        .mount(&backend)
        .await;

    let gateway = Gateway::start(backend.address().port()).await;
    let response = reqwest::get(gateway.url("/storage/v1/b/missing")).await.unwrap();

    assert_eq!(response.status(), 404);
    assert_eq!(response.text().await.unwrap(), "NoSuchBucket");
    gateway.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_backend_is_service_unavailable() {
    let closed_port = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    };

    let gateway = Gateway::start(closed_port).await;
    let response = reqwest::get(gateway.url("/storage/v1/b/bucket")).await.unwrap();

    assert_eq!(response.status(), 503);
    assert_eq!(response.text().await.unwrap(), "Service temporarily unavailable");
    gateway.shutdown().await;
}

#[tokio::test]
async fn test_health_reports_storage() {
    let backend = MockServer::start().await;
    let gateway = Gateway::start(backend.address().port()).await;

    let report: serde_json::Value = reqwest::get(gateway.url("/health"))
        .await
        .unwrap()
        .text()
        .await
        .map(|body| serde_json::from_str(&body).unwrap())
        .unwrap();

    assert_eq!(report["status"], "ok");
    assert_eq!(report["services"]["storage"], "healthy");
    gateway.shutdown().await;
}

#[tokio::test]
async fn test_engine_failure_aborts_startup() {
    let mock = Arc::new(MockRuntime::new());
    mock.set_fail_on("launch");
    let server = build_server(&load(), mock.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let err = server
        .start_with_listener(listener, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Lifecycle { ref service, .. } if service == "storage"));
    assert!(server.container_manager().list_containers().is_empty());
}

#[tokio::test]
async fn test_trailing_slash_routes_are_proxied() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("buckets"))
        .mount(&backend)
        .await;

    let gateway = Gateway::start(backend.address().port()).await;
    let response = reqwest::get(gateway.url("/storage/")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "buckets");

    // Unmatched backend paths answer 404 from the backend, not the router
    for route in ["/upload/storage/", "/batch/storage/"] {
        reqwest::get(gateway.url(route)).await.unwrap();
    }
    let received = backend.received_requests().await.unwrap();
    assert_eq!(received.len(), 3);

    gateway.shutdown().await;
}

use std::time::{Duration, Instant};

use axum::Router;
use axum::http::HeaderMap;
use axum::routing::post;
use onepost::{Client, PostErrorKind, ReqwestTransport};
use tokio::net::TcpListener;
use tokio::time::sleep;

#[tokio::test]
async fn e2e_payload_without_newlines_round_trips_through_echo() {
    let server = TestServer::start().await;
    let client = Client::new();
    let payload = r#"{"jsonrpc":"2.0","id":1,"method":"echo"}"#;

    let body = client
        .invoke(payload, &server.url("/echo"), None)
        .await
        .expect("echo response");

    assert_eq!(body, payload);
}

#[tokio::test]
async fn e2e_transmitted_body_has_newlines_removed() {
    let server = TestServer::start().await;
    let client = Client::new();
    let payload = "{\n  \"note\": \"line one\"\r\n}";

    let body = client
        .invoke(payload, &server.url("/echo"), None)
        .await
        .expect("echo response");

    assert_eq!(body, "{  \"note\": \"line one\"}");
}

#[tokio::test]
async fn e2e_authorization_header_is_forwarded_verbatim() {
    let server = TestServer::start().await;
    let client = Client::new();

    let body = client
        .invoke("{}", &server.url("/auth"), Some("dXNlcjpwYXNz"))
        .await
        .expect("auth echo response");

    assert_eq!(body, "Basic dXNlcjpwYXNz");
}

#[tokio::test]
async fn e2e_authorization_header_is_absent_without_credential() {
    let server = TestServer::start().await;
    let client = Client::new();

    let body = client
        .invoke("{}", &server.url("/auth"), None)
        .await
        .expect("auth echo response");

    assert_eq!(body, "absent");
}

#[tokio::test]
async fn e2e_unreachable_endpoint_fails_without_hanging() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe listener");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let client = Client::new();
    let start = Instant::now();
    let err = client
        .invoke("{}", &format!("http://{addr}/echo"), None)
        .await
        .expect_err("closed port should refuse the connection");

    assert_eq!(err.kind(), PostErrorKind::Connect);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn e2e_explicit_timeout_fires_against_a_slow_endpoint() {
    let server = TestServer::start().await;
    let transport = ReqwestTransport::with_client(reqwest::Client::new());
    let client = Client::with_transport(transport).with_timeout(Duration::from_millis(200));

    let err = client
        .invoke("{}", &server.url("/slow"), None)
        .await
        .expect_err("short timeout should trigger");

    assert_eq!(err.kind(), PostErrorKind::Timeout);
}

#[tokio::test]
async fn e2e_concurrent_invocations_are_independent() {
    let server_a = TestServer::start().await;
    let server_b = TestServer::start().await;
    let client = Client::new();
    let payload_a = r#"{"tag":"alpha"}"#;
    let payload_b = r#"{"tag":"beta"}"#;

    let url_a = server_a.url("/echo");
    let url_b = server_b.url("/echo");
    let (a, b) = tokio::join!(
        client.invoke(payload_a, &url_a, None),
        client.invoke(payload_b, &url_b, None),
    );

    assert_eq!(a.expect("first echo"), payload_a);
    assert_eq!(b.expect("second echo"), payload_b);
}

struct TestServer {
    base_url: String,
    task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start() -> Self {
        let app = Router::new()
            .route("/echo", post(echo_handler))
            .route("/auth", post(auth_handler))
            .route("/slow", post(slow_handler));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let base_url = format!("http://{}", addr);

        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { base_url, task }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn echo_handler(body: String) -> String {
    body
}

async fn auth_handler(headers: HeaderMap) -> String {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| "absent".to_string())
}

async fn slow_handler() -> &'static str {
    sleep(Duration::from_millis(1500)).await;
    r#"{"ok":true}"#
}

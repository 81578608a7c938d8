//! End-to-end tests: a real gateway in front of an embedded hyper backend,
//! driven with reqwest.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use header_gate_lib::config::{
    Backend, Config, LoggingConfig, PolicyAttachment, Route, TelemetryConfig, TimeoutConfig,
};
use header_gate_lib::policy::header_gate::{TEMPLATE_POLICY_EXECUTED_HEADER, TEMPLATE_POLICY_HEADER};
use header_gate_lib::proxy::serve;
use header_gate_lib::telemetry::{handle_metrics, init_metrics, Metrics};
use header_gate_lib::Phase;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

const BACKEND_BODY: &str = "backend response";
const SAW_MARKER: &str = "x-backend-saw-marker";
const BACKEND_PATH: &str = "x-backend-path";
const BACKEND_HOST: &str = "x-backend-host";

/// Backend that echoes what it received in response headers.
///
/// Paths ending in `/fail` answer with `x-template-policy: FAILURE`.
async fn start_backend(
    hits: Arc<AtomicUsize>,
) -> Result<SocketAddr, Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                continue;
            };
            let hits = hits.clone();
            tokio::spawn(async move {
                let svc = service_fn(move |req: Request<Incoming>| {
                    let hits = hits.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        let marker = req
                            .headers()
                            .get_all(TEMPLATE_POLICY_EXECUTED_HEADER)
                            .iter()
                            .filter_map(|v| v.to_str().ok())
                            .collect::<Vec<_>>()
                            .join(",");

                        let host = req
                            .headers()
                            .get(hyper::header::HOST)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();

                        let mut builder = Response::builder()
                            .header(BACKEND_PATH, req.uri().path())
                            .header(BACKEND_HOST, host)
                            .header(SAW_MARKER, marker);
                        if req.uri().path().ends_with("/fail") {
                            builder = builder.header(TEMPLATE_POLICY_HEADER, "FAILURE");
                        }
                        let resp = builder
                            .body(Full::new(Bytes::from_static(BACKEND_BODY.as_bytes())))
                            .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())));
                        Ok::<_, Infallible>(resp)
                    }
                });
                let _ = ConnBuilder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), svc)
                    .await;
            });
        }
    });

    Ok(addr)
}

/// An address nothing listens on
async fn closed_addr() -> Result<SocketAddr, Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

fn template_policy(phases: Vec<Phase>) -> PolicyAttachment {
    let mut configuration = toml::Table::new();
    configuration.insert("errorKey".to_string(), toml::Value::String("failure".to_string()));
    PolicyAttachment { policy: "template-policy".to_string(), phases, configuration }
}

fn route(prefix: &str, backend: &str, policies: Vec<PolicyAttachment>) -> Route {
    Route {
        prefix: prefix.to_string(),
        backend: backend.to_string(),
        replace_path: Some("/endpoint".to_string()),
        policies,
    }
}

struct Gateway {
    base: String,
    backend: String,
    hits: Arc<AtomicUsize>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<header_gate_lib::Result<()>>,
}

impl Gateway {
    async fn start(
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Self::start_with(metrics, false).await
    }

    async fn start_with(
        metrics: Option<Arc<Metrics>>,
        preserve_host: bool,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let hits = Arc::new(AtomicUsize::new(0));
        let backend = start_backend(hits.clone()).await?.to_string();
        let down = closed_addr().await?.to_string();

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let listen = listener.local_addr()?;

        let config = Config {
            listen,
            backends: vec![Backend { address: backend.clone() }, Backend { address: down.clone() }],
            routes: vec![
                route("/test-response", &backend, vec![template_policy(vec![Phase::Response])]),
                route("/test", &backend, vec![template_policy(vec![Phase::Request])]),
                route("/down", &down, vec![template_policy(vec![Phase::Request])]),
                route("/open", &backend, vec![]),
            ],
            preserve_host,
            policies: vec![],
            logging: LoggingConfig::default(),
            timeout: TimeoutConfig { shutdown_secs: 1, ..TimeoutConfig::default() },
            telemetry: TelemetryConfig::default(),
        };

        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(serve(listener, Arc::new(config), metrics, rx));

        Ok(Self { base: format!("http://{listen}"), backend, hits, shutdown, task })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().no_proxy().build()
}

fn header<'a>(resp: &'a reqwest::Response, name: &str) -> Option<&'a str> {
    resp.headers().get(name).and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn test_request_without_trigger_reaches_backend_with_marker() -> TestResult {
    let gw = Gateway::start(None).await?;
    let client = client()?;

    let resp = client.get(gw.url("/test")).send().await?;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(header(&resp, SAW_MARKER), Some("ok"));
    assert_eq!(header(&resp, BACKEND_PATH), Some("/endpoint"));
    // Request-scoped only, so the response is not stamped
    assert!(resp.headers().get(TEMPLATE_POLICY_EXECUTED_HEADER).is_none());
    assert_eq!(resp.text().await?, BACKEND_BODY);
    assert_eq!(gw.hits(), 1);
    Ok(())
}

#[tokio::test]
async fn test_request_with_trigger_is_rejected_before_backend() -> TestResult {
    let gw = Gateway::start(None).await?;
    let client = client()?;

    let resp = client
        .get(gw.url("/test"))
        .header(TEMPLATE_POLICY_HEADER, "failure")
        .send()
        .await?;
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(resp.text().await?, "Invalid header");
    assert_eq!(gw.hits(), 0);
    Ok(())
}

#[tokio::test]
async fn test_request_trigger_is_case_insensitive_and_multi_valued() -> TestResult {
    let gw = Gateway::start(None).await?;
    let client = client()?;

    let resp = client
        .get(gw.url("/test"))
        .header(TEMPLATE_POLICY_HEADER, "Failure")
        .send()
        .await?;
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    let resp = client
        .get(gw.url("/test"))
        .header(TEMPLATE_POLICY_HEADER, "other")
        .header(TEMPLATE_POLICY_HEADER, "FAILURE")
        .send()
        .await?;
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    let resp = client
        .get(gw.url("/test"))
        .header(TEMPLATE_POLICY_HEADER, "other")
        .send()
        .await?;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(gw.hits(), 1);
    Ok(())
}

#[tokio::test]
async fn test_response_with_trigger_becomes_server_error() -> TestResult {
    let gw = Gateway::start(None).await?;
    let client = client()?;

    let resp = client.get(gw.url("/test-response/fail")).send().await?;
    assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    // The upstream response is discarded entirely
    assert!(resp.headers().get(BACKEND_PATH).is_none());
    assert_eq!(resp.text().await?, "Invalid header");
    assert_eq!(gw.hits(), 1);
    Ok(())
}

#[tokio::test]
async fn test_response_without_trigger_is_stamped() -> TestResult {
    let gw = Gateway::start(None).await?;
    let client = client()?;

    // The request trigger is ignored on a response-scoped route
    let resp = client
        .get(gw.url("/test-response"))
        .header(TEMPLATE_POLICY_HEADER, "failure")
        .send()
        .await?;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(header(&resp, TEMPLATE_POLICY_EXECUTED_HEADER), Some("ok"));
    assert_eq!(header(&resp, SAW_MARKER), Some(""));
    assert_eq!(resp.text().await?, BACKEND_BODY);
    Ok(())
}

#[tokio::test]
async fn test_route_without_policies_passes_through() -> TestResult {
    let gw = Gateway::start(None).await?;
    let client = client()?;

    let resp = client
        .get(gw.url("/open/fail"))
        .header(TEMPLATE_POLICY_HEADER, "failure")
        .send()
        .await?;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(header(&resp, SAW_MARKER), Some(""));
    assert_eq!(header(&resp, BACKEND_PATH), Some("/endpoint/fail"));
    assert_eq!(header(&resp, TEMPLATE_POLICY_HEADER), Some("FAILURE"));
    Ok(())
}

#[tokio::test]
async fn test_unknown_route_is_not_found() -> TestResult {
    let gw = Gateway::start(None).await?;
    let resp = client()?.get(gw.url("/nope")).send().await?;
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    assert_eq!(gw.hits(), 0);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_backend_is_bad_gateway() -> TestResult {
    let gw = Gateway::start(None).await?;
    let client = client()?;

    let resp = client.get(gw.url("/down")).send().await?;
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_GATEWAY);

    // A rejected request never gets as far as the backend
    let resp = client
        .get(gw.url("/down"))
        .header(TEMPLATE_POLICY_HEADER, "failure")
        .send()
        .await?;
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_host_header_follows_preserve_host() -> TestResult {
    let client = client()?;

    let preserving = Gateway::start_with(None, true).await?;
    let resp = client
        .get(preserving.url("/test"))
        .header(hyper::header::HOST, "client.example")
        .send()
        .await?;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(header(&resp, BACKEND_HOST), Some("client.example"));

    let rewriting = Gateway::start(None).await?;
    let resp = client
        .get(rewriting.url("/test"))
        .header(hyper::header::HOST, "client.example")
        .send()
        .await?;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(header(&resp, BACKEND_HOST), Some(rewriting.backend.as_str()));
    Ok(())
}

#[tokio::test]
async fn test_policy_outcomes_are_exported_as_metrics() -> TestResult {
    let (metrics, registry) = init_metrics()?;
    let gw = Gateway::start(Some(metrics)).await?;
    let client = client()?;

    client.get(gw.url("/test")).send().await?;
    client
        .get(gw.url("/test"))
        .header(TEMPLATE_POLICY_HEADER, "failure")
        .send()
        .await?;

    let resp = handle_metrics(&registry)?;
    let body = resp.into_body().collect().await?.to_bytes();
    let text = String::from_utf8(body.to_vec())?;
    assert!(text.contains("header_gate_policy_executions_total"), "{text}");
    assert!(text.contains("outcome=\"interrupt\""), "{text}");
    assert!(text.contains("outcome=\"continue\""), "{text}");
    assert!(text.contains("header_gate_requests_total"), "{text}");
    Ok(())
}

#[tokio::test]
async fn test_shutdown_stops_serving() -> TestResult {
    let gw = Gateway::start(None).await?;
    let client = client()?;
    assert_eq!(client.get(gw.url("/test")).send().await?.status(), reqwest::StatusCode::OK);
    drop(client);

    gw.shutdown.send(true)?;
    tokio::time::timeout(Duration::from_secs(5), gw.task).await???;
    Ok(())
}

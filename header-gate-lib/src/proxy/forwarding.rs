use std::sync::Arc;
use std::time::Duration;

use http::{header::HOST, Request, Response};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::time::Instant;

use crate::config::TimeoutConfig;
use crate::proxy::context::RouteEntry;
use crate::proxy::http_result::{HttpError, HttpResult};
use crate::proxy::synthetic_response::RespBody;
use crate::telemetry::Metrics;

pub type HttpClient = Client<HttpConnector, Incoming>;

pub struct ForwardConfig<'a> {
    pub matched_prefix: &'a str,
    pub replace_path: Option<&'a str>,
    pub preserve_host: bool,
    pub metrics: Option<&'a Arc<Metrics>>,
}

/// Build the shared upstream client
pub fn create_client(timeout: &TimeoutConfig) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(Duration::from_millis(timeout.connect_ms)));
    if timeout.keep_alive.enabled {
        connector.set_keepalive(Some(Duration::from_secs(timeout.keep_alive.timeout_secs)));
    } else {
        connector.set_keepalive(None);
    }

    Client::builder(TokioExecutor::new()).build(connector)
}

/// First route whose prefix matches the path
pub fn pick_route<'a>(path: &str, routes: &'a [RouteEntry]) -> Option<&'a RouteEntry> {
    routes.iter().find(|r| path.starts_with(&r.route.prefix))
}

/// Replace the matched prefix of `path_and_query` with `replace_path`, if any
///
/// Example: prefix = "/test", replace_path = "/endpoint"
///   "/test?a=1" → "/endpoint?a=1"
pub fn rewrite_path(
    path_and_query: &str,
    matched_prefix: &str,
    replace_path: Option<&str>,
) -> HttpResult<String> {
    let Some(new_path) = replace_path else {
        return Ok(path_and_query.to_string());
    };

    let remaining = path_and_query
        .strip_prefix(matched_prefix)
        .ok_or_else(|| HttpError::InvalidUri("Path and query is broken".to_string()))?;

    let mut rewritten = String::with_capacity(new_path.len().saturating_add(remaining.len()));
    rewritten.push_str(new_path);
    rewritten.push_str(remaining);
    if !rewritten.starts_with('/') {
        rewritten.insert(0, '/');
    }
    Ok(rewritten)
}

pub async fn forward(
    req: Request<Incoming>,
    backend: &str,
    client: &HttpClient,
    config: ForwardConfig<'_>,
) -> HttpResult<Response<RespBody>> {
    let start = Instant::now();

    let org_pq = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let new_pq = rewrite_path(org_pq, config.matched_prefix, config.replace_path)?;

    let uri = format!("http://{backend}{new_pq}")
        .parse::<http::Uri>()
        .map_err(|e| HttpError::InvalidUri(e.to_string()))?;

    let (mut parts, body) = req.into_parts();
    parts.uri = uri;
    if !config.preserve_host {
        // The client derives Host from the upstream URI when none is set
        parts.headers.remove(HOST);
    }

    let result = client.request(Request::from_parts(parts, body)).await;
    let duration = start.elapsed().as_secs_f64();

    match result {
        Ok(resp) => {
            if let Some(m) = config.metrics {
                m.record_backend_request(
                    backend,
                    resp.status().as_u16(),
                    config.matched_prefix,
                    duration,
                );
            }
            Ok(resp.map(|b| b.boxed()))
        }
        Err(e) => {
            let error = HttpError::FailedToGetResponseFromBackend(e.to_string());
            if let Some(m) = config.metrics {
                m.record_backend_error(backend, error.error_type(), config.matched_prefix);
            }
            Err(error)
        }
    }
}

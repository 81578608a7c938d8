use std::net::SocketAddr;
use std::sync::Arc;

use http::{HeaderMap, StatusCode};
use hyper::body::Incoming;
use hyper::{Request, Response};
use tokio::time::Instant;
use tracing::debug;

use crate::policy::{ChainResult, ExecutionFailure, Phase};
use crate::proxy::context::{GatewayContext, RouteEntry};
use crate::proxy::forwarding::{forward, pick_route, ForwardConfig};
use crate::proxy::http_result::{HttpError, HttpResult};
use crate::proxy::synthetic_response::{interrupt_response, RespBody};
use crate::telemetry::metrics::values;
use crate::telemetry::Metrics;

/// Run the route's chain for one phase and record the outcome.
///
/// Returns the failure when a policy interrupted the exchange.
fn run_policies(
    entry: &RouteEntry,
    phase: Phase,
    headers: &mut HeaderMap,
    metrics: Option<&Arc<Metrics>>,
    peer: SocketAddr,
) -> Option<ExecutionFailure> {
    if entry.chain.is_empty() {
        return None;
    }

    let route = entry.route.prefix.as_str();
    match entry.chain.execute(phase, headers) {
        ChainResult::Continue => {
            if let Some(m) = metrics {
                for policy in entry.chain.ids_for(phase) {
                    m.record_policy_execution(policy, phase.as_str(), values::OUTCOME_CONTINUE, route);
                }
            }
            None
        }
        ChainResult::Interrupted { policy, failure } => {
            debug!(
                ?peer,
                route,
                policy,
                %phase,
                status = failure.status.as_u16(),
                "Exchange interrupted by policy"
            );
            if let Some(m) = metrics {
                m.record_policy_execution(policy, phase.as_str(), values::OUTCOME_INTERRUPT, route);
                m.record_error(values::ERROR_POLICY_INTERRUPT);
            }
            Some(failure)
        }
    }
}

/// Handle request routing, policy phases and forwarding
pub async fn handle_proxy_request(
    mut req: Request<Incoming>,
    ctx: &GatewayContext,
    peer: SocketAddr,
) -> HttpResult<Response<RespBody>> {
    let start = Instant::now();
    let method = req.method().to_string();
    let protocol = format!("{:?}", req.version());
    let metrics = ctx.metrics.as_ref();

    let Some(entry) = pick_route(req.uri().path(), &ctx.routes) else {
        let error = HttpError::NoMatchingRoute;
        if let Some(m) = metrics {
            m.record_error(error.error_type());
        }
        return Err(error);
    };
    let route = entry.route.prefix.as_str();

    let result = match run_policies(entry, Phase::Request, req.headers_mut(), metrics, peer) {
        // Upstream is never called and the response phase does not run
        Some(failure) => Ok(interrupt_response(&failure)),
        None => {
            let forwarded = forward(
                req,
                &entry.route.backend,
                &ctx.client,
                ForwardConfig {
                    matched_prefix: route,
                    replace_path: entry.route.replace_path.as_deref(),
                    preserve_host: ctx.preserve_host,
                    metrics,
                },
            )
            .await;

            match forwarded {
                Ok(mut response) => {
                    match run_policies(entry, Phase::Response, response.headers_mut(), metrics, peer)
                    {
                        // The upstream response is dropped here
                        Some(failure) => Ok(interrupt_response(&failure)),
                        None => Ok(response),
                    }
                }
                Err(e) => {
                    debug!(?peer, route, error = %e, "Forwarding failed");
                    Err(e)
                }
            }
        }
    };

    let duration = start.elapsed().as_secs_f64();
    let status_code = match &result {
        Ok(resp) => resp.status().as_u16(),
        Err(e) => StatusCode::from(e.clone()).as_u16(),
    };

    if let Some(m) = metrics {
        m.record_request(&method, status_code, &protocol, route);
        m.record_request_duration(duration, &method, status_code, &protocol, route);
    }

    result
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{GateError, Result};
use crate::proxy::context::GatewayContext;
use crate::proxy::handler::handle_proxy_request;
use crate::proxy::synthetic_response::synthetic_error_response;
use crate::telemetry::Metrics;

/// Guard to decrement active connections counter when dropped
struct ConnectionGuard {
    active: Arc<AtomicUsize>,
    metrics: Option<Arc<Metrics>>,
}

impl ConnectionGuard {
    fn new(active: Arc<AtomicUsize>, metrics: Option<Arc<Metrics>>) -> Self {
        active.fetch_add(1, Ordering::Relaxed);
        if let Some(ref m) = metrics {
            m.record_connection_opened();
        }
        Self { active, metrics }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        if let Some(ref m) = self.metrics {
            m.record_connection_closed();
        }
    }
}

/// Bind `config.listen` and serve until `shutdown` flips
pub async fn run(
    config: Arc<Config>,
    metrics: Option<Arc<Metrics>>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let listener = TcpListener::bind(config.listen)
        .await
        .map_err(GateError::Io)?;
    serve(listener, config, metrics, shutdown).await
}

/// Serve HTTP/1.1 and HTTP/2 on an already bound listener
pub async fn serve(
    listener: TcpListener,
    config: Arc<Config>,
    metrics: Option<Arc<Metrics>>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let addr = listener.local_addr().map_err(GateError::Io)?;
    let ctx = Arc::new(GatewayContext::from_config(&config, metrics.clone())?);
    let builder = ConnBuilder::new(TokioExecutor::new());

    // Track active connections for graceful shutdown
    let active_connections = Arc::new(AtomicUsize::new(0));

    info!(?addr, routes = ctx.routes.len(), "starting header gate (h1/h2)");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                // A dropped sender also ends the accept loop
                if changed.is_err() || *shutdown.borrow() {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
            }
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok((stream, peer)) => (stream, peer),
                    Err(e) => {
                        warn!(error = %e, "accept error");
                        continue;
                    }
                };

                let guard = ConnectionGuard::new(active_connections.clone(), metrics.clone());
                let builder = builder.clone();
                let ctx = ctx.clone();

                tokio::spawn(async move {
                    let _guard = guard;
                    let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let ctx = ctx.clone();
                        async move {
                            match handle_proxy_request(req, &ctx, peer).await {
                                Ok(resp) => Ok::<_, hyper::Error>(resp),
                                Err(e) => Ok::<_, hyper::Error>(synthetic_error_response(e.into())),
                            }
                        }
                    });

                    if let Err(e) = builder.serve_connection(TokioIo::new(stream), svc).await {
                        warn!(?peer, error = %e, "serve_connection error");
                    }
                });
            }
        }
    }

    info!(
        "Waiting for active connections to finish (timeout: {}s)",
        config.timeout.shutdown_secs
    );
    let shutdown_timeout = Duration::from_secs(config.timeout.shutdown_secs);
    let start = std::time::Instant::now();

    loop {
        let active = active_connections.load(Ordering::Relaxed);
        if active == 0 {
            info!("All connections closed, shutdown complete");
            break;
        }

        if start.elapsed() >= shutdown_timeout {
            warn!(
                active_connections = active,
                "Shutdown timeout reached, {} connections still active", active
            );
            break;
        }

        info!(active_connections = active, "Waiting for connections to close");
        sleep(Duration::from_millis(100)).await;
    }

    info!("Header gate stopped");
    Ok(())
}

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use header_gate_lib::config::load_from_path;
use header_gate_lib::proxy;
use header_gate_lib::telemetry::{init_metrics, init_tracing, start_observability_server};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "HTTP gateway running the template-policy header gate")]
struct Cli {
    /// Path to configuration TOML file
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "HEADER_GATE_CONFIG",
        default_value = "config/header-gate.toml"
    )]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match load_from_path(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("failed to load configuration from {}: {err}", cli.config.display());
            std::process::exit(1);
        }
    };

    if let Err(e) = init_tracing(
        &cfg.logging.level,
        cfg.logging.show_target,
        &cfg.telemetry.otel_log_level,
    ) {
        eprintln!("Failed to initialize tracing: {e}");
    }

    info!(
        ?cfg.listen,
        backends = cfg.backends.len(),
        routes = cfg.routes.len(),
        global_policies = cfg.policies.len(),
        "configuration loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics = match cfg.telemetry.metrics_port {
        Some(port) => match init_metrics() {
            Ok((metrics, registry)) => {
                let backends = Arc::new(cfg.backends.clone());
                let shutdown = shutdown_rx.clone();
                tokio::spawn(async move {
                    if let Err(e) =
                        start_observability_server(port, registry, backends, shutdown).await
                    {
                        error!(error = %e, "observability server exited with error");
                    }
                });
                Some(metrics)
            }
            Err(e) => {
                warn!(error = %e, "failed to initialize metrics, continuing without them");
                None
            }
        },
        None => None,
    };

    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let cfg = Arc::new(cfg);
    if let Err(err) = proxy::run(cfg, metrics, shutdown_rx).await {
        error!(%err, "header gate exited with error");
        std::process::exit(1);
    }
}

/// Resolve on SIGINT or SIGTERM
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

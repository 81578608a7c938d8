use serde::Deserialize;
use std::net::SocketAddr;

use super::backend::{Backend, Route};
use super::policy::PolicyAttachment;
use super::telemetry::{LoggingConfig, TelemetryConfig};
use super::timeout::TimeoutConfig;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Address and port to listen on
    /// Example: "0.0.0.0:8082" or "127.0.0.1:8080"
    pub listen: SocketAddr,
    /// List of backend servers
    /// At least one backend is required
    pub backends: Vec<Backend>,
    /// Path-based routing rules
    /// If no routes match, requests return 404
    #[serde(default)]
    pub routes: Vec<Route>,
    /// Preserve the original Host header from clients when forwarding to backends
    /// Default: false
    #[serde(default)]
    pub preserve_host: bool,
    /// Policies run for every route, before the route's own policies
    #[serde(default)]
    pub policies: Vec<PolicyAttachment>,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Timeout configuration
    #[serde(default)]
    pub timeout: TimeoutConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

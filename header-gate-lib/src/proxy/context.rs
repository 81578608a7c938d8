use std::sync::Arc;

use crate::config::{Config, PolicyAttachment, Route};
use crate::error::Result;
use crate::policy::PolicyChain;
use crate::proxy::forwarding::{create_client, HttpClient};
use crate::telemetry::Metrics;

/// A route together with its policy chain, built once at startup
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub route: Route,
    pub chain: PolicyChain,
}

impl RouteEntry {
    /// Global policies run first, then the route's own policies
    pub fn build(route: Route, global: &[PolicyAttachment]) -> Result<Self> {
        let chain = PolicyChain::from_attachments(global.iter().chain(route.policies.iter()))?;
        Ok(Self { route, chain })
    }
}

/// Shared read-only state for every connection task
pub struct GatewayContext {
    pub routes: Vec<RouteEntry>,
    pub client: HttpClient,
    pub preserve_host: bool,
    pub metrics: Option<Arc<Metrics>>,
}

impl GatewayContext {
    pub fn from_config(config: &Config, metrics: Option<Arc<Metrics>>) -> Result<Self> {
        let routes = config
            .routes
            .iter()
            .cloned()
            .map(|route| RouteEntry::build(route, &config.policies))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            routes,
            client: create_client(&config.timeout),
            preserve_host: config.preserve_host,
            metrics,
        })
    }
}

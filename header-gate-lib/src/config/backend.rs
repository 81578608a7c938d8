use serde::Deserialize;

use super::policy::PolicyAttachment;

/// Backend server configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Backend {
    /// Backend server address (host:port format)
    /// Example: "backend-1:9000" or "192.168.1.10:8080"
    pub address: String,
}

/// Route configuration for path-based routing
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Route {
    /// URL path prefix to match (e.g., "/api", "/static")
    /// Routes are matched in order, first match wins
    pub prefix: String,
    /// Backend address to route matching requests to
    /// Must match one of the backend addresses defined in `backends`
    pub backend: String,
    /// Path that will be used to replace the "prefix" part of incoming url
    /// Example: prefix = "/test", replace_path = "/endpoint"
    ///   Request: /test/users → Backend: /endpoint/users
    #[serde(default)]
    pub replace_path: Option<String>,
    /// Policies attached to this route, run after the global ones
    #[serde(default)]
    pub policies: Vec<PolicyAttachment>,
}

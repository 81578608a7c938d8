use serde::Deserialize;

use crate::policy::Phase;

/// A policy attached to the gateway or to a single route
///
/// ```toml
/// [[routes.policies]]
/// policy = "template-policy"
/// phases = ["request"]
/// configuration = { errorKey = "failure" }
/// ```
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PolicyAttachment {
    /// Policy id (e.g., "template-policy")
    pub policy: String,
    /// Phases the policy runs in
    /// Default: both request and response
    #[serde(default = "default_phases")]
    pub phases: Vec<Phase>,
    /// Policy specific configuration, handed to the policy at construction
    #[serde(default)]
    pub configuration: toml::Table,
}

fn default_phases() -> Vec<Phase> {
    vec![Phase::Request, Phase::Response]
}

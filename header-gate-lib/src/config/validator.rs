use std::collections::HashSet;

use http::uri::PathAndQuery;

use crate::config::{Config, PolicyAttachment};
use crate::error::{GateError, Result};
use crate::policy::registry::build_policy;

pub fn validate(config: &Config) -> Result<()> {
    if config.backends.is_empty() {
        return Err(GateError::NoBackends);
    }
    if config.backends.iter().any(|b| b.address.trim().is_empty()) {
        return Err(GateError::Config("backend address cannot be empty".into()));
    }
    if config.timeout.connect_ms == 0 {
        return Err(GateError::Config("connect_ms must be > 0".into()));
    }

    let backend_addresses: HashSet<&str> =
        config.backends.iter().map(|b| b.address.as_str()).collect();

    for route in &config.routes {
        if !route.prefix.starts_with('/') {
            return Err(GateError::Config(format!(
                "Route prefix must start with '/': {}",
                route.prefix
            )));
        }
        if !backend_addresses.contains(route.backend.as_str()) {
            return Err(GateError::Config(format!(
                "Route references unknown backend: {}",
                route.backend
            )));
        }
        if let Some(replace_path) = &route.replace_path {
            replace_path.parse::<PathAndQuery>()?;
        }
        validate_policies(&route.policies)?;
    }

    validate_policies(&config.policies)
}

fn validate_policies(attachments: &[PolicyAttachment]) -> Result<()> {
    for attachment in attachments {
        if attachment.phases.is_empty() {
            return Err(GateError::Config(format!(
                "Policy {} must run in at least one phase",
                attachment.policy
            )));
        }
        build_policy(attachment)?;
    }
    Ok(())
}

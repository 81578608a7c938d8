use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::header_gate::{HeaderGate, TEMPLATE_POLICY_ID};
use super::Policy;
use crate::config::PolicyAttachment;
use crate::error::{GateError, Result};

/// Build the policy named by an attachment from its configuration table
pub fn build_policy(attachment: &PolicyAttachment) -> Result<Arc<dyn Policy>> {
    match attachment.policy.as_str() {
        TEMPLATE_POLICY_ID => Ok(Arc::new(HeaderGate::new(parse_configuration(attachment)?))),
        other => Err(GateError::UnknownPolicy(other.to_string())),
    }
}

fn parse_configuration<T: DeserializeOwned>(attachment: &PolicyAttachment) -> Result<T> {
    toml::Value::Table(attachment.configuration.clone())
        .try_into()
        .map_err(|e| {
            GateError::Config(format!(
                "Invalid configuration for policy {}: {e}",
                attachment.policy
            ))
        })
}

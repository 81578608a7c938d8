use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{Decision, ExecutionFailure, Phase, Policy};

pub const TEMPLATE_POLICY_ID: &str = "template-policy";
pub const TEMPLATE_POLICY_HEADER: &str = "x-template-policy";
pub const TEMPLATE_POLICY_EXECUTED_HEADER: &str = "x-template-policy-executed";
pub const EXECUTED_VALUE: &str = "ok";
pub const ERROR_MESSAGE: &str = "Invalid header";

/// Configuration of the header gate
///
/// ```toml
/// configuration = { errorKey = "failure" }
/// ```
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct HeaderGateConfig {
    /// Value of `x-template-policy` that interrupts the exchange
    #[serde(rename = "errorKey")]
    pub error_key: String,
}

/// Interrupts the exchange when `x-template-policy` carries the configured
/// error key, otherwise stamps `x-template-policy-executed: ok`.
#[derive(Debug, Clone)]
pub struct HeaderGate {
    config: HeaderGateConfig,
}

impl HeaderGate {
    pub fn new(config: HeaderGateConfig) -> Self {
        Self { config }
    }

    /// True if any `x-template-policy` value equals the error key, ignoring case.
    ///
    /// Header name lookup is already case-insensitive in `HeaderMap`; only the
    /// value is folded here.
    pub fn should_interrupt(&self, headers: &HeaderMap) -> bool {
        let error_key = self.config.error_key.as_bytes();
        headers
            .get_all(TEMPLATE_POLICY_HEADER)
            .iter()
            .any(|value| value.as_bytes().eq_ignore_ascii_case(error_key))
    }

    pub fn evaluate(&self, headers: &mut HeaderMap, phase: Phase) -> Decision {
        if self.should_interrupt(headers) {
            let status = interrupt_status(phase);
            debug!(
                policy = TEMPLATE_POLICY_ID,
                %phase,
                status = status.as_u16(),
                "Trigger header matched, interrupting exchange"
            );
            return Decision::Interrupt(ExecutionFailure::new(status).message(ERROR_MESSAGE));
        }

        headers.append(
            HeaderName::from_static(TEMPLATE_POLICY_EXECUTED_HEADER),
            HeaderValue::from_static(EXECUTED_VALUE),
        );
        Decision::Continue
    }
}

/// Status used when the gate interrupts in the given phase
pub fn interrupt_status(phase: Phase) -> StatusCode {
    match phase {
        Phase::Request => StatusCode::BAD_REQUEST,
        Phase::Response => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl Policy for HeaderGate {
    fn id(&self) -> &'static str {
        TEMPLATE_POLICY_ID
    }

    fn on_request(&self, headers: &mut HeaderMap) -> Decision {
        self.evaluate(headers, Phase::Request)
    }

    fn on_response(&self, headers: &mut HeaderMap) -> Decision {
        self.evaluate(headers, Phase::Response)
    }
}

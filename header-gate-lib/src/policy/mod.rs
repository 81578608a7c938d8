//! Policies run by the gateway around each exchange.
//!
//! A policy is invoked once per phase: with the request headers before the
//! upstream is called and with the response headers after it answered. It
//! either lets the exchange continue or interrupts it with a status and a
//! message that the host turns into the client response.

pub mod chain;
pub mod header_gate;
pub mod registry;

use std::fmt;

use http::{HeaderMap, StatusCode};
use serde::Deserialize;

pub use chain::{ChainResult, PolicyChain};
pub use header_gate::{HeaderGate, HeaderGateConfig};

/// Stage of the exchange a policy hook runs in
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Request,
    Response,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Request => "request",
            Phase::Response => "response",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status and message the host answers with when a policy interrupts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionFailure {
    pub status: StatusCode,
    pub message: String,
}

impl ExecutionFailure {
    pub fn new(status: StatusCode) -> Self {
        Self { status, message: String::new() }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// Outcome of a single policy hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Interrupt(ExecutionFailure),
}

impl Decision {
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Decision::Interrupt(_))
    }
}

/// A gateway policy.
///
/// Implementations are built once per attachment and shared across
/// concurrent exchanges, so hooks take `&self` and must not mutate shared
/// state. Only the header map of the current phase may be changed.
pub trait Policy: Send + Sync + fmt::Debug {
    fn id(&self) -> &'static str;

    fn on_request(&self, headers: &mut HeaderMap) -> Decision;

    fn on_response(&self, headers: &mut HeaderMap) -> Decision;

    fn on_phase(&self, phase: Phase, headers: &mut HeaderMap) -> Decision {
        match phase {
            Phase::Request => self.on_request(headers),
            Phase::Response => self.on_response(headers),
        }
    }
}

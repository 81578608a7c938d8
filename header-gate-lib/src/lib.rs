#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod policy;
pub mod proxy;
pub mod telemetry;

pub use config::{load_from_path, Backend, Config, PolicyAttachment, Route};
pub use error::{GateError, Result};
pub use policy::{Decision, ExecutionFailure, HeaderGate, HeaderGateConfig, Phase, Policy};
pub use proxy::run;

mod backend;
mod loader;
mod policy;
mod root;
mod telemetry;
mod timeout;
pub mod validator;

pub use backend::{Backend, Route};
pub use loader::load_from_path;
pub use policy::PolicyAttachment;
pub use root::Config;
pub use telemetry::{LoggingConfig, TelemetryConfig};
pub use timeout::{KeepAliveConfig, TimeoutConfig};

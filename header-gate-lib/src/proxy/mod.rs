pub mod context;
pub mod forwarding;
pub mod handler;
pub mod http_result;
pub mod server;
pub mod synthetic_response;

pub use context::{GatewayContext, RouteEntry};
pub use forwarding::{pick_route, rewrite_path};
pub use http_result::HttpError;
pub use server::{run, serve};

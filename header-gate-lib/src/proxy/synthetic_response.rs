use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::Response;

use crate::policy::ExecutionFailure;

pub type RespBody = BoxBody<Bytes, hyper::Error>;

/// Build HTTP response with status code of 4xx and 5xx and an empty body
pub fn synthetic_error_response(status_code: StatusCode) -> Response<RespBody> {
    let mut res = Response::new(full_body(Bytes::new()));
    *res.status_mut() = status_code;
    res
}

/// Build the response for an interrupted exchange: the failure's status with
/// its message as a plain-text body
pub fn interrupt_response(failure: &ExecutionFailure) -> Response<RespBody> {
    let mut res = Response::new(full_body(Bytes::from(failure.message.clone())));
    *res.status_mut() = failure.status;
    res.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    res
}

fn full_body(bytes: Bytes) -> RespBody {
    Full::new(bytes).map_err(|never| match never {}).boxed()
}

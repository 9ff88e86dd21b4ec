//! Per-request correlation ids
//!
//! `SetRequestIdLayer` stamps each request with a `req_` id, `PropagateRequestIdLayer`
//! echoes it in `X-Request-Id`, and [`request_id_middleware`] exposes it to code running
//! inside the request through [`current_request_id`].

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tower_http::request_id::{MakeRequestId, RequestId};

use crate::domain::id::{new_id, IdPrefix};

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

tokio::task_local! {
    static REQUEST_ID: String;
}

/// Generates `req_` ids for `SetRequestIdLayer`
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeGatewayRequestId;

impl MakeRequestId for MakeGatewayRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&new_id(IdPrefix::Request))
            .ok()
            .map(RequestId::new)
    }
}

/// Correlation id of the request being handled, or a fresh one outside a request
pub fn current_request_id() -> String {
    REQUEST_ID
        .try_with(Clone::clone)
        .unwrap_or_else(|_| new_id(IdPrefix::Request))
}

/// Scope the request's id for the rest of the stack
pub async fn request_id_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| new_id(IdPrefix::Request));

    REQUEST_ID.scope(request_id, next.run(request)).await
}

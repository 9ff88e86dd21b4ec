//! API middleware components

pub mod auth;
pub mod logging;
pub mod metrics;
pub mod request_id;

pub use auth::RequireRootKey;
pub use logging::logging_middleware;
pub use metrics::metrics_middleware;
pub use request_id::{
    current_request_id, request_id_middleware, MakeGatewayRequestId, REQUEST_ID_HEADER,
};

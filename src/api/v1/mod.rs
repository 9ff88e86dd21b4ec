//! v1 API endpoints
//!
//! Management routes authenticate with a root key; `keys.verifyKey` is open.

pub mod apis;
pub mod keys;
pub mod permissions;

use axum::{
    routing::{get, post},
    Router,
};

use super::state::AppState;

/// Create v1 API router
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/keys.verifyKey", post(keys::verify_key))
        .route("/keys.createKey", post(keys::create_key))
        .route("/keys", post(keys::create_key))
        .route("/keys.getKey", get(keys::get_key))
        .route("/keys.deleteKey", post(keys::delete_key))
        .route("/keys.removePermissions", post(keys::remove_permissions))
        .route(
            "/permissions.createPermission",
            post(permissions::create_permission),
        )
        .route("/apis.deleteApi", post(apis::delete_api))
}

//! `permissions.*` endpoints

use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

use crate::api::middleware::RequireRootKey;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json, ValidatedJson};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePermissionBody {
    #[validate(length(min = 1, max = 512, message = "must be 1 to 512 characters"))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePermissionResponse {
    pub permission_id: String,
}

/// POST /v1/permissions.createPermission
pub async fn create_permission(
    State(state): State<AppState>,
    RequireRootKey(root): RequireRootKey,
    ValidatedJson(body): ValidatedJson<CreatePermissionBody>,
) -> Result<Json<CreatePermissionResponse>, ApiError> {
    debug!(name = %body.name, "Creating permission");

    let permission_id = state
        .permissions
        .create_permission(&root, &body.name, body.description)
        .await?;

    Ok(Json(CreatePermissionResponse {
        permission_id: permission_id.to_string(),
    }))
}

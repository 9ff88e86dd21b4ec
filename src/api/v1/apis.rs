//! `apis.*` endpoints

use axum::extract::State;
use serde::Deserialize;
use tracing::debug;
use validator::Validate;

use crate::api::middleware::RequireRootKey;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json, ValidatedJson};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DeleteApiBody {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub api_id: String,
}

/// POST /v1/apis.deleteApi
pub async fn delete_api(
    State(state): State<AppState>,
    RequireRootKey(root): RequireRootKey,
    ValidatedJson(body): ValidatedJson<DeleteApiBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    debug!(api_id = %body.api_id, "Deleting API");

    state.apis.delete_api(&root, &body.api_id).await?;
    Ok(Json(serde_json::json!({})))
}

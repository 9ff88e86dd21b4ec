//! `keys.*` endpoints

use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

use crate::api::middleware::RequireRootKey;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json, ValidatedJson};
use crate::domain::api_key::Key;
use crate::domain::rbac::PermissionRef;
use crate::domain::RatelimitConfig;
use crate::infrastructure::api_key::CreateKeyRequest;
use crate::infrastructure::authorization::{VerifyKeyRequest, VerifyKeyResponse};

/// Ratelimit attached to a key; `duration` is in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatelimitBody {
    pub name: String,
    pub limit: u64,
    pub duration: u64,
}

impl From<&RatelimitConfig> for RatelimitBody {
    fn from(config: &RatelimitConfig) -> Self {
        Self {
            name: config.name().to_string(),
            limit: config.limit(),
            duration: config.duration_ms(),
        }
    }
}

/// Single unnamed ratelimit accepted by the legacy `POST /v1/keys` body
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyRatelimitBody {
    pub limit: u64,
    pub duration: u64,
}

/// Name the legacy single ratelimit is stored under
pub const LEGACY_RATELIMIT_NAME: &str = "default";

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeyBody {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub api_id: String,
    #[validate(length(min = 1, max = 8, message = "must be 1 to 8 characters"))]
    pub prefix: Option<String>,
    #[validate(range(min = 16, max = 255, message = "must be between 16 and 255"))]
    pub byte_length: Option<usize>,
    pub owner_id: Option<String>,
    #[validate(length(max = 512, message = "must be at most 512 characters"))]
    pub name: Option<String>,
    pub meta: Option<serde_json::Value>,
    /// Unix epoch milliseconds
    pub expires: Option<i64>,
    #[serde(default)]
    pub ratelimits: Vec<RatelimitBody>,
    pub ratelimit: Option<LegacyRatelimitBody>,
    pub enabled: Option<bool>,
}

impl TryFrom<CreateKeyBody> for CreateKeyRequest {
    type Error = ApiError;

    fn try_from(body: CreateKeyBody) -> Result<Self, Self::Error> {
        let expires = body
            .expires
            .map(|ms| {
                DateTime::<Utc>::from_timestamp_millis(ms)
                    .ok_or_else(|| ApiError::bad_request("expires: not a valid timestamp"))
            })
            .transpose()?;

        if body.ratelimit.is_some()
            && body.ratelimits.iter().any(|r| r.name == LEGACY_RATELIMIT_NAME)
        {
            return Err(ApiError::bad_request(format!(
                "ratelimit: conflicts with the '{}' entry in ratelimits",
                LEGACY_RATELIMIT_NAME
            )));
        }

        let legacy = body
            .ratelimit
            .map(|r| RatelimitConfig::new(LEGACY_RATELIMIT_NAME, r.limit, r.duration));

        let ratelimits = legacy
            .into_iter()
            .chain(
                body.ratelimits
                    .into_iter()
                    .map(|r| RatelimitConfig::new(r.name, r.limit, r.duration)),
            )
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CreateKeyRequest {
            api_id: body.api_id,
            prefix: body.prefix,
            byte_length: body.byte_length,
            owner_id: body.owner_id,
            name: body.name,
            meta: body.meta,
            expires,
            ratelimits,
            enabled: body.enabled,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeyResponse {
    pub key_id: String,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct KeyIdBody {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub key_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RemovePermissionsBody {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub key_id: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub permissions: Vec<PermissionRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetKeyParams {
    #[serde(default)]
    pub key_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyResponse {
    pub id: String,
    pub start: String,
    pub workspace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    /// Unix epoch milliseconds
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
    pub ratelimits: Vec<RatelimitBody>,
    pub enabled: bool,
}

impl From<&Key> for KeyResponse {
    fn from(key: &Key) -> Self {
        Self {
            id: key.id().to_string(),
            start: key.start().to_string(),
            workspace_id: key.workspace_id().to_string(),
            name: key.name().map(str::to_string),
            owner_id: key.owner_id().map(str::to_string),
            meta: key.meta().cloned(),
            created_at: key.created_at().timestamp_millis(),
            expires: key.expires_at().map(|t| t.timestamp_millis()),
            ratelimits: key.ratelimits().iter().map(RatelimitBody::from).collect(),
            enabled: key.enabled(),
        }
    }
}

/// POST /v1/keys.verifyKey
///
/// Every verification outcome is a 200 with a `code`.
pub async fn verify_key(
    State(state): State<AppState>,
    Json(request): Json<VerifyKeyRequest>,
) -> Result<Json<VerifyKeyResponse>, ApiError> {
    if request.key.is_empty() {
        return Err(ApiError::bad_request("key: must not be empty"));
    }

    let response = state.verifier.verify(request).await?;
    Ok(Json(response))
}

/// POST /v1/keys.createKey and POST /v1/keys
pub async fn create_key(
    State(state): State<AppState>,
    RequireRootKey(root): RequireRootKey,
    ValidatedJson(body): ValidatedJson<CreateKeyBody>,
) -> Result<Json<CreateKeyResponse>, ApiError> {
    debug!(api_id = %body.api_id, "Creating key");

    let created = state.keys.create_key(&root, body.try_into()?).await?;

    Ok(Json(CreateKeyResponse {
        key_id: created.key_id.to_string(),
        key: created.key,
    }))
}

/// GET /v1/keys.getKey?keyId=
pub async fn get_key(
    State(state): State<AppState>,
    RequireRootKey(root): RequireRootKey,
    Query(params): Query<GetKeyParams>,
) -> Result<Json<KeyResponse>, ApiError> {
    if params.key_id.is_empty() {
        return Err(ApiError::bad_request("keyId: must not be empty"));
    }

    let key = state.keys.get_key(&root, &params.key_id).await?;
    Ok(Json(KeyResponse::from(&key)))
}

/// POST /v1/keys.deleteKey
pub async fn delete_key(
    State(state): State<AppState>,
    RequireRootKey(root): RequireRootKey,
    ValidatedJson(body): ValidatedJson<KeyIdBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    debug!(key_id = %body.key_id, "Deleting key");

    state.keys.delete_key(&root, &body.key_id).await?;
    Ok(Json(serde_json::json!({})))
}

/// POST /v1/keys.removePermissions
pub async fn remove_permissions(
    State(state): State<AppState>,
    RequireRootKey(root): RequireRootKey,
    ValidatedJson(body): ValidatedJson<RemovePermissionsBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    debug!(
        key_id = %body.key_id,
        count = body.permissions.len(),
        "Removing permissions from key"
    );

    state
        .keys
        .remove_permissions(&root, &body.key_id, &body.permissions)
        .await?;
    Ok(Json(serde_json::json!({})))
}

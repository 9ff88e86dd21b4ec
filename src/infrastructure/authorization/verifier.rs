//! Data-plane key verification

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::api_key::{Key, KeyRepository, KeyState};
use crate::domain::id::ApiId;
use crate::domain::permission::{GrantedPermissions, PermissionQuery};
use crate::domain::ratelimit::{RatelimitDecision, RatelimitRequest};
use crate::domain::rbac::RbacRepository;
use crate::domain::workspace::WorkspaceRepository;
use crate::domain::DomainError;
use crate::infrastructure::api_key::KeyCodec;
use crate::infrastructure::context::GatewayContext;
use crate::infrastructure::observability::record_verification;
use crate::infrastructure::ratelimit::{Clock, RatelimitCheck, Ratelimiter};

/// Outcome of a verification; exactly one applies per call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerifyCode {
    Valid,
    NotFound,
    Forbidden,
    Disabled,
    Expired,
    RateLimited,
}

impl VerifyCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::NotFound => "NOT_FOUND",
            Self::Forbidden => "FORBIDDEN",
            Self::Disabled => "DISABLED",
            Self::Expired => "EXPIRED",
            Self::RateLimited => "RATE_LIMITED",
        }
    }
}

/// Verification pipeline stages, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyState {
    Received,
    Authenticated,
    StateChecked,
    PermissionChecked,
    RateLimitChecked,
    Result(VerifyCode),
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyAuthorization {
    pub permissions: PermissionQuery,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyKeyRequest {
    pub key: String,
    #[serde(default)]
    pub api_id: Option<String>,
    #[serde(default)]
    pub authorization: Option<VerifyAuthorization>,
    /// Limits to check in order; every limit attached to the key when absent
    #[serde(default)]
    pub ratelimits: Option<Vec<RatelimitRequest>>,
}

impl VerifyKeyRequest {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            api_id: None,
            authorization: None,
            ratelimits: None,
        }
    }

    pub fn with_api_id(mut self, api_id: impl Into<String>) -> Self {
        self.api_id = Some(api_id.into());
        self
    }

    pub fn with_permissions(mut self, permissions: PermissionQuery) -> Self {
        self.authorization = Some(VerifyAuthorization { permissions });
        self
    }

    pub fn with_ratelimits(mut self, ratelimits: Vec<RatelimitRequest>) -> Self {
        self.ratelimits = Some(ratelimits);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyKeyResponse {
    pub code: VerifyCode,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ratelimits: Vec<RatelimitDecision>,
}

impl VerifyKeyResponse {
    fn not_found() -> Self {
        Self {
            code: VerifyCode::NotFound,
            valid: false,
            key_id: None,
            name: None,
            owner_id: None,
            meta: None,
            expires: None,
            permissions: Vec::new(),
            enabled: None,
            ratelimits: Vec::new(),
        }
    }

    /// Only the key id, so a failed check reveals nothing about the key's grants
    fn forbidden(key: &Key) -> Self {
        Self {
            code: VerifyCode::Forbidden,
            key_id: Some(key.id().to_string()),
            ..Self::not_found()
        }
    }

    fn for_key(code: VerifyCode, key: &Key, granted: Option<&GrantedPermissions>) -> Self {
        Self {
            code,
            valid: code == VerifyCode::Valid,
            key_id: Some(key.id().to_string()),
            name: key.name().map(str::to_string),
            owner_id: key.owner_id().map(str::to_string),
            meta: key.meta().cloned(),
            expires: key.expires_at(),
            permissions: granted.map(GrantedPermissions::sorted).unwrap_or_default(),
            enabled: Some(key.enabled()),
            ratelimits: Vec::new(),
        }
    }

    fn with_ratelimits(mut self, ratelimits: Vec<RatelimitDecision>) -> Self {
        self.ratelimits = ratelimits;
        self
    }
}

/// Verifies data-plane keys
#[derive(Debug, Clone)]
pub struct KeyVerifier {
    keys: Arc<dyn KeyRepository>,
    workspaces: Arc<dyn WorkspaceRepository>,
    rbac: Arc<dyn RbacRepository>,
    ratelimiter: Arc<Ratelimiter>,
    clock: Arc<dyn Clock>,
}

impl KeyVerifier {
    pub fn new(context: &GatewayContext) -> Self {
        Self {
            keys: Arc::clone(&context.keys),
            workspaces: Arc::clone(&context.workspaces),
            rbac: Arc::clone(&context.rbac),
            ratelimiter: Arc::clone(&context.ratelimiter),
            clock: Arc::clone(&context.clock),
        }
    }

    /// Run the verification pipeline
    ///
    /// Checks run in a fixed order: existence, API ownership, enablement, expiry,
    /// permissions, then rate limits. Errors are reserved for malformed requests and
    /// storage failures; every other outcome is a [`VerifyCode`].
    pub async fn verify(&self, request: VerifyKeyRequest) -> Result<VerifyKeyResponse, DomainError> {
        let response = self.run(request).await?;
        record_verification(response.code.as_str());
        Ok(response)
    }

    async fn run(&self, request: VerifyKeyRequest) -> Result<VerifyKeyResponse, DomainError> {
        trace_state(VerifyState::Received);

        if request.key.is_empty() {
            return Err(DomainError::validation("key must not be empty"));
        }
        if let Some(authorization) = &request.authorization {
            authorization.permissions.validate()?;
        }

        let Some(key) = self.keys.find_by_hash(&KeyCodec::hash(&request.key)).await? else {
            return Ok(finish(VerifyKeyResponse::not_found()));
        };
        if key.is_deleted() {
            return Ok(finish(VerifyKeyResponse::not_found()));
        }

        if let Some(api_id) = &request.api_id
            && !self.key_belongs_to_api(&key, api_id).await?
        {
            return Ok(finish(VerifyKeyResponse::not_found()));
        }
        trace_state(VerifyState::Authenticated);

        match key.state_at(self.clock.now()) {
            KeyState::Usable => {}
            KeyState::Deleted => return Ok(finish(VerifyKeyResponse::not_found())),
            KeyState::Disabled => {
                return Ok(finish(VerifyKeyResponse::for_key(VerifyCode::Disabled, &key, None)));
            }
            KeyState::Expired => {
                return Ok(finish(VerifyKeyResponse::for_key(VerifyCode::Expired, &key, None)));
            }
        }
        trace_state(VerifyState::StateChecked);

        let granted = self.rbac.granted_permissions(key.id()).await?;

        if let Some(authorization) = &request.authorization
            && !authorization.permissions.evaluate(&granted)
        {
            debug!(
                "Permission check failed: key_id={}, required={}",
                key.id(),
                authorization.permissions
            );
            return Ok(finish(VerifyKeyResponse::forbidden(&key)));
        }
        trace_state(VerifyState::PermissionChecked);

        let checks = ratelimit_checks(&key, request.ratelimits.as_deref())?;
        let decisions = self
            .ratelimiter
            .limit_all(key.id().as_str(), &checks)
            .await?;
        trace_state(VerifyState::RateLimitChecked);

        let code = if decisions.iter().all(|d| d.passed) {
            VerifyCode::Valid
        } else {
            VerifyCode::RateLimited
        };

        Ok(finish(
            VerifyKeyResponse::for_key(code, &key, Some(&granted)).with_ratelimits(decisions),
        ))
    }

    async fn key_belongs_to_api(&self, key: &Key, api_id: &str) -> Result<bool, DomainError> {
        let Ok(api_id) = ApiId::parse(api_id) else {
            return Ok(false);
        };

        Ok(self
            .workspaces
            .find_api(&api_id)
            .await?
            .is_some_and(|api| api.keyspace_id == *key.keyspace_id()))
    }
}

/// Resolve requested limits against the key's configs
///
/// All names are resolved before anything is charged.
fn ratelimit_checks(
    key: &Key,
    requests: Option<&[RatelimitRequest]>,
) -> Result<Vec<RatelimitCheck>, DomainError> {
    let Some(requests) = requests else {
        return Ok(key
            .ratelimits()
            .iter()
            .map(|config| RatelimitCheck::new(config.clone(), 1))
            .collect());
    };

    requests
        .iter()
        .map(|request| {
            let config = match request.inline_config()? {
                Some(config) => config,
                None => key.ratelimit(&request.name).cloned().ok_or_else(|| {
                    DomainError::validation(format!(
                        "Ratelimit '{}' is not configured for this key",
                        request.name
                    ))
                })?,
            };
            Ok(RatelimitCheck::new(config, request.cost))
        })
        .collect()
}

fn trace_state(state: VerifyState) {
    debug!("Verification state: {:?}", state);
}

fn finish(response: VerifyKeyResponse) -> VerifyKeyResponse {
    trace_state(VerifyState::Result(response.code));
    response
}

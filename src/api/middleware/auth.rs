//! Root key authentication

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::ApiError;
use crate::domain::audit::AuditContext;
use crate::infrastructure::authorization::RootKeyContext;

/// Extractor that requires a valid root key in `Authorization: Bearer <key>`
///
/// The resolved context carries the caller's location and user agent for audit rows.
#[derive(Debug, Clone)]
pub struct RequireRootKey(pub RootKeyContext);

impl FromRequestParts<AppState> for RequireRootKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)?;

        debug!(
            key_prefix = %token.chars().take(8).collect::<String>(),
            "Authenticating root key"
        );

        let root = state.authenticator.authenticate(&token).await?;

        Ok(RequireRootKey(
            root.with_request_context(request_context(parts)),
        ))
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<String, ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| {
            ApiError::unauthorized("Root key required. Provide via 'Authorization: Bearer <key>'")
        })?
        .to_str()
        .map_err(|_| ApiError::unauthorized("Invalid Authorization header encoding"))?;

    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Malformed Authorization header"))?;

    Ok(token.to_string())
}

/// Location from the first `X-Forwarded-For` hop, else the peer address
fn request_context(parts: &Parts) -> AuditContext {
    let forwarded = parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let location = forwarded.or_else(|| {
        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    })
    .unwrap_or_default();

    let user_agent = parts
        .headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    AuditContext {
        location,
        user_agent,
    }
}

//! Application state for shared services

use crate::infrastructure::api_key::KeyService;
use crate::infrastructure::authorization::{KeyVerifier, RootKeyAuthenticator};
use crate::infrastructure::context::GatewayContext;
use crate::infrastructure::rbac::PermissionService;
use crate::infrastructure::workspace::ApiService;

/// Services shared by every handler; each holds `Arc` handles into one [`GatewayContext`]
#[derive(Debug, Clone)]
pub struct AppState {
    pub context: GatewayContext,
    pub authenticator: RootKeyAuthenticator,
    pub verifier: KeyVerifier,
    pub keys: KeyService,
    pub permissions: PermissionService,
    pub apis: ApiService,
}

impl AppState {
    pub fn new(context: GatewayContext) -> Self {
        Self {
            authenticator: RootKeyAuthenticator::new(&context),
            verifier: KeyVerifier::new(&context),
            keys: KeyService::new(&context),
            permissions: PermissionService::new(&context),
            apis: ApiService::new(&context),
            context,
        }
    }
}

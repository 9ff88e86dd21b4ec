//! Authorization pipeline
//!
//! Root keys authorize management operations; data-plane keys are checked by
//! [`KeyVerifier`].

mod root_key;
mod verifier;

pub use root_key::{RootKeyAuthenticator, RootKeyContext};
pub use verifier::{
    KeyVerifier, VerifyAuthorization, VerifyCode, VerifyKeyRequest, VerifyKeyResponse,
    VerifyState,
};

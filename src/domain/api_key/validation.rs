//! Key creation validation utilities

use thiserror::Error;

use crate::domain::DomainError;

/// Errors that can occur while validating key creation parameters
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KeyValidationError {
    #[error("Key prefix exceeds maximum length of {0} characters")]
    PrefixTooLong(usize),

    #[error("Key prefix contains invalid character: '{0}'. Only alphanumeric characters are allowed")]
    InvalidPrefixCharacter(char),

    #[error("Key byte length must be between {min} and {max}, got {actual}")]
    ByteLengthOutOfRange {
        min: usize,
        max: usize,
        actual: usize,
    },
}

impl From<KeyValidationError> for DomainError {
    fn from(err: KeyValidationError) -> Self {
        DomainError::validation(err.to_string())
    }
}

pub const MAX_PREFIX_LENGTH: usize = 8;
pub const MIN_BYTE_LENGTH: usize = 16;
pub const MAX_BYTE_LENGTH: usize = 255;
pub const DEFAULT_BYTE_LENGTH: usize = 16;

/// Validate a key prefix
///
/// Rules:
/// - Empty is allowed (no prefix)
/// - Maximum 8 characters
/// - Only ASCII alphanumeric characters; the `_` separator is added by the codec
pub fn validate_key_prefix(prefix: &str) -> Result<(), KeyValidationError> {
    if prefix.len() > MAX_PREFIX_LENGTH {
        return Err(KeyValidationError::PrefixTooLong(MAX_PREFIX_LENGTH));
    }

    if let Some(c) = prefix.chars().find(|c| !c.is_ascii_alphanumeric()) {
        return Err(KeyValidationError::InvalidPrefixCharacter(c));
    }

    Ok(())
}

/// Validate the number of random bytes in a new key
pub fn validate_byte_length(byte_length: usize) -> Result<(), KeyValidationError> {
    if !(MIN_BYTE_LENGTH..=MAX_BYTE_LENGTH).contains(&byte_length) {
        return Err(KeyValidationError::ByteLengthOutOfRange {
            min: MIN_BYTE_LENGTH,
            max: MAX_BYTE_LENGTH,
            actual: byte_length,
        });
    }

    Ok(())
}

//! Key domain
//!
//! Hashed data-plane and root keys, the repository they are read through, and the
//! validation rules applied when they are created.

mod entity;
mod repository;
mod validation;

pub use entity::{Key, KeyState};
pub use repository::KeyRepository;
pub use validation::{
    validate_byte_length, validate_key_prefix, KeyValidationError, DEFAULT_BYTE_LENGTH,
    MAX_BYTE_LENGTH, MIN_BYTE_LENGTH,
};

//! Key generation and hashing
//!
//! Keys are `{prefix}_{base58(random bytes)}`. Only `base64(sha256(key))` is stored; the
//! plaintext is handed back once at creation.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::domain::api_key::{validate_byte_length, validate_key_prefix, DEFAULT_BYTE_LENGTH};
use crate::domain::DomainError;

/// Number of random characters exposed in `start`
const START_CHARS: usize = 4;

/// Result of generating a new key
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    /// The full key (only shown once at creation)
    pub key: String,
    /// The hashed key for storage
    pub hash: String,
    /// Display-safe leading characters for identification
    pub start: String,
}

/// Creates and hashes keys
#[derive(Debug, Clone, Copy)]
pub struct KeyCodec {
    default_byte_length: usize,
}

impl KeyCodec {
    pub fn new() -> Self {
        Self {
            default_byte_length: DEFAULT_BYTE_LENGTH,
        }
    }

    /// Generate a new key
    ///
    /// `byte_length` falls back to the codec default when `None`.
    pub fn create(
        &self,
        prefix: Option<&str>,
        byte_length: Option<usize>,
    ) -> Result<GeneratedKey, DomainError> {
        let byte_length = byte_length.unwrap_or(self.default_byte_length);
        validate_byte_length(byte_length)?;

        let prefix = prefix.filter(|p| !p.is_empty());
        if let Some(prefix) = prefix {
            validate_key_prefix(prefix)?;
        }

        let mut random_bytes = vec![0u8; byte_length];
        rand::thread_rng().fill_bytes(&mut random_bytes);
        let random = bs58::encode(&random_bytes).into_string();

        Ok(Self::assemble(prefix, &random))
    }

    /// Build a key from a known random part (for testing purposes)
    pub fn from_secret(&self, prefix: Option<&str>, secret: &str) -> GeneratedKey {
        Self::assemble(prefix.filter(|p| !p.is_empty()), secret)
    }

    fn assemble(prefix: Option<&str>, random: &str) -> GeneratedKey {
        let head: String = random.chars().take(START_CHARS).collect();

        let (key, start) = match prefix {
            Some(prefix) => (format!("{prefix}_{random}"), format!("{prefix}_{head}")),
            None => (random.to_string(), head),
        };

        let hash = Self::hash(&key);

        GeneratedKey { key, hash, start }
    }

    /// Hash a plaintext key for storage and lookup
    pub fn hash(key: &str) -> String {
        let digest = Sha256::digest(key.as_bytes());
        STANDARD.encode(digest)
    }
}

impl Default for KeyCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_with_prefix() {
        let generated = KeyCodec::new().create(Some("sk"), None).unwrap();

        assert!(generated.key.starts_with("sk_"));
        assert_eq!(generated.start.len(), "sk_".len() + 4);
        assert!(generated.key.starts_with(&generated.start));
        assert_eq!(generated.hash, KeyCodec::hash(&generated.key));
    }

    #[test]
    fn test_create_without_prefix() {
        let generated = KeyCodec::new().create(None, None).unwrap();

        assert!(!generated.key.contains('_'));
        assert_eq!(generated.start.len(), 4);
        assert!(generated.key.starts_with(&generated.start));

        let empty = KeyCodec::new().create(Some(""), None).unwrap();
        assert!(!empty.key.contains('_'));
    }

    #[test]
    fn test_random_part_is_base58() {
        let generated = KeyCodec::new().create(Some("sk"), Some(32)).unwrap();
        let random = generated.key.strip_prefix("sk_").unwrap();

        assert_eq!(bs58::decode(random).into_vec().unwrap().len(), 32);
    }

    #[test]
    fn test_key_uniqueness() {
        let codec = KeyCodec::new();
        let key1 = codec.create(Some("sk"), None).unwrap();
        let key2 = codec.create(Some("sk"), None).unwrap();

        assert_ne!(key1.key, key2.key);
        assert_ne!(key1.hash, key2.hash);
    }

    #[test]
    fn test_hash_is_base64_sha256() {
        // sha256("") in standard base64
        assert_eq!(
            KeyCodec::hash(""),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
        assert_eq!(KeyCodec::hash("sk_abc"), KeyCodec::hash("sk_abc"));
        assert_ne!(KeyCodec::hash("sk_abc"), KeyCodec::hash("sk_abd"));
    }

    #[test]
    fn test_rejects_invalid_prefix() {
        let codec = KeyCodec::new();

        assert!(matches!(
            codec.create(Some("toolongprefix"), None),
            Err(DomainError::Validation { .. })
        ));
        assert!(matches!(
            codec.create(Some("s-k"), None),
            Err(DomainError::Validation { .. })
        ));
    }

    #[test]
    fn test_rejects_invalid_byte_length() {
        let codec = KeyCodec::new();

        assert!(codec.create(None, Some(15)).is_err());
        assert!(codec.create(None, Some(256)).is_err());
        assert!(codec.create(None, Some(16)).is_ok());
        assert!(codec.create(None, Some(255)).is_ok());
    }

    #[test]
    fn test_from_secret() {
        let generated = KeyCodec::new().from_secret(Some("root"), "abcdef123");

        assert_eq!(generated.key, "root_abcdef123");
        assert_eq!(generated.start, "root_abcd");
        assert_eq!(generated.hash, KeyCodec::hash("root_abcdef123"));
    }
}

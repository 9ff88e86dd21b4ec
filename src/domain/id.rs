//! Prefix-tagged, time-ordered identifiers
//!
//! Every identifier has the shape `{prefix}_{base58(20 bytes)}`. The first four bytes
//! hold the milliseconds elapsed since [`ID_EPOCH_MS`] (big-endian), the remaining
//! sixteen are random. Identifiers created later therefore sort roughly after earlier
//! ones when compared on the decoded bytes. The timestamp is truncated to 32 bits and
//! wraps roughly every 49 days, so ordering only holds within that horizon.

use std::fmt;

use chrono::Utc;
use rand::RngCore;

use crate::domain::DomainError;

/// Custom epoch for identifier timestamps (2023-11-14T22:13:20Z)
pub const ID_EPOCH_MS: i64 = 1_700_000_000_000;

const ID_BYTES: usize = 20;
const TIMESTAMP_BYTES: usize = 4;

/// Closed set of identifier prefixes, one per entity kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdPrefix {
    Key,
    Api,
    Workspace,
    Keyspace,
    Role,
    Permission,
    Ratelimit,
    AuditLog,
    Request,
}

impl IdPrefix {
    pub const ALL: [IdPrefix; 9] = [
        Self::Key,
        Self::Api,
        Self::Workspace,
        Self::Keyspace,
        Self::Role,
        Self::Permission,
        Self::Ratelimit,
        Self::AuditLog,
        Self::Request,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::Api => "api",
            Self::Workspace => "ws",
            Self::Keyspace => "ks",
            Self::Role => "role",
            Self::Permission => "perm",
            Self::Ratelimit => "rl",
            Self::AuditLog => "log",
            Self::Request => "req",
        }
    }

    /// Returns the prefix an identifier was created with, if it is a known one
    pub fn of(id: &str) -> Option<Self> {
        let (prefix, _) = id.split_once('_')?;
        Self::ALL.into_iter().find(|p| p.as_str() == prefix)
    }
}

impl fmt::Display for IdPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generate a new identifier for the given entity kind
pub fn new_id(prefix: IdPrefix) -> String {
    let mut buf = [0u8; ID_BYTES];

    let elapsed = Utc::now().timestamp_millis() - ID_EPOCH_MS;
    buf[..TIMESTAMP_BYTES].copy_from_slice(&(elapsed as u32).to_be_bytes());
    rand::thread_rng().fill_bytes(&mut buf[TIMESTAMP_BYTES..]);

    format!("{}_{}", prefix, bs58::encode(buf).into_string())
}

/// Check that `id` is a well-formed identifier carrying `prefix`
pub fn validate_id(id: &str, prefix: IdPrefix) -> Result<(), DomainError> {
    let encoded = id
        .strip_prefix(prefix.as_str())
        .and_then(|rest| rest.strip_prefix('_'))
        .ok_or_else(|| {
            DomainError::invalid_id(format!("'{}' is not a valid {} id", id, prefix))
        })?;

    let decoded = bs58::decode(encoded)
        .into_vec()
        .map_err(|_| DomainError::invalid_id(format!("'{}' is not base58 encoded", id)))?;

    if decoded.len() != ID_BYTES {
        return Err(DomainError::invalid_id(format!(
            "'{}' has an unexpected length",
            id
        )));
    }

    Ok(())
}

/// Milliseconds since [`ID_EPOCH_MS`] encoded in an identifier
pub fn id_timestamp(id: &str) -> Option<u32> {
    let (_, encoded) = id.split_once('_')?;
    let decoded = bs58::decode(encoded).into_vec().ok()?;
    let bytes: [u8; TIMESTAMP_BYTES] = decoded.get(..TIMESTAMP_BYTES)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh identifier
            pub fn generate() -> Self {
                Self($crate::domain::id::new_id($prefix))
            }

            /// Parse and validate an existing identifier
            pub fn parse(id: impl Into<String>) -> Result<Self, DomainError> {
                let id = id.into();
                $crate::domain::id::validate_id(&id, $prefix)?;
                Ok(Self(id))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(
    /// Workspace (tenant) identifier
    WorkspaceId,
    IdPrefix::Workspace
);
typed_id!(
    /// API identifier
    ApiId,
    IdPrefix::Api
);
typed_id!(
    /// Keyspace identifier
    KeyspaceId,
    IdPrefix::Keyspace
);
typed_id!(
    /// Key identifier
    KeyId,
    IdPrefix::Key
);
typed_id!(PermissionId, IdPrefix::Permission);
typed_id!(RoleId, IdPrefix::Role);
typed_id!(AuditLogId, IdPrefix::AuditLog);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_new_id_has_prefix() {
        for prefix in IdPrefix::ALL {
            let id = new_id(prefix);
            assert!(id.starts_with(&format!("{}_", prefix)));
            assert_eq!(IdPrefix::of(&id), Some(prefix));
        }
    }

    #[test]
    fn test_new_id_unique() {
        let ids: HashSet<String> = (0..100).map(|_| new_id(IdPrefix::Key)).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_validate_id() {
        let id = new_id(IdPrefix::Api);
        assert!(validate_id(&id, IdPrefix::Api).is_ok());
        assert!(validate_id(&id, IdPrefix::Key).is_err());
        assert!(validate_id("api_", IdPrefix::Api).is_err());
        assert!(validate_id("api_0OIl", IdPrefix::Api).is_err());
        assert!(validate_id("api_abc", IdPrefix::Api).is_err());
    }

    #[test]
    fn test_timestamp_is_ordered() {
        let first = new_id(IdPrefix::Key);
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = new_id(IdPrefix::Key);

        let t1 = id_timestamp(&first).unwrap();
        let t2 = id_timestamp(&second).unwrap();
        assert!(t2 > t1);
    }

    #[test]
    fn test_typed_id_roundtrip() {
        let id = KeyId::generate();
        let parsed = KeyId::parse(id.as_str()).unwrap();
        assert_eq!(id, parsed);

        assert!(KeyId::parse(ApiId::generate().as_str()).is_err());
    }

    #[test]
    fn test_typed_id_serde() {
        let id = WorkspaceId::generate();
        let json = serde_json::to_string(&id).unwrap();
        let back: WorkspaceId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);

        let bad: Result<WorkspaceId, _> = serde_json::from_str("\"ws_nope\"");
        assert!(bad.is_err());
    }
}

//! Permission expression engine
//!
//! Evaluates boolean `And` / `Or` trees of permission strings against the set of
//! permissions granted to a key. Granted permissions may contain `*` segments that
//! match any single segment of a required permission.

pub mod actions;
mod matcher;
mod query;

pub use matcher::{grant_matches, GrantedPermissions, WILDCARD};
pub use query::{PermissionLeaf, PermissionQuery, ResourcePermission};

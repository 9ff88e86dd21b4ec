//! Segment-wise wildcard matching of granted permissions

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Grant that allows every permission
pub const WILDCARD: &str = "*";

const SEGMENT_SEPARATOR: char = '.';

/// Check whether a single granted permission covers a required one
///
/// Both strings are split on `.` and compared position by position. A grant segment of
/// exactly `*` matches any required segment; segment counts must be equal. A `*` on the
/// required side has no special meaning and only matches a literal `*` or a wildcard
/// grant segment.
pub fn grant_matches(grant: &str, required: &str) -> bool {
    if grant == WILDCARD || grant == required {
        return true;
    }

    if !grant.contains('*') {
        return false;
    }

    let mut grant_segments = grant.split(SEGMENT_SEPARATOR);
    let mut required_segments = required.split(SEGMENT_SEPARATOR);

    loop {
        match (grant_segments.next(), required_segments.next()) {
            (Some(g), Some(r)) => {
                if g != WILDCARD && g != r {
                    return false;
                }
            }
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// The effective permission set of a key (direct grants plus role-derived grants)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct GrantedPermissions {
    exact: HashSet<String>,
    /// Grants containing wildcard segments, kept apart so exact hits skip the scan
    wildcards: Vec<String>,
}

impl GrantedPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, permission: impl Into<String>) {
        let permission = permission.into();

        if permission != WILDCARD && permission.contains('*') && !self.wildcards.contains(&permission) {
            self.wildcards.push(permission.clone());
        }

        self.exact.insert(permission);
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }

    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.exact.contains(permission)
    }

    /// Whether any grant covers `required`
    pub fn allows(&self, required: &str) -> bool {
        if self.exact.is_empty() {
            return false;
        }

        if self.exact.contains(required) || self.exact.contains(WILDCARD) {
            return true;
        }

        self.wildcards
            .iter()
            .any(|grant| grant_matches(grant, required))
    }

    /// Grants in lexical order, for stable responses
    pub fn sorted(&self) -> Vec<String> {
        let mut all: Vec<String> = self.exact.iter().cloned().collect();
        all.sort();
        all
    }
}

impl<S: Into<String>> FromIterator<S> for GrantedPermissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut granted = Self::new();
        for permission in iter {
            granted.insert(permission);
        }
        granted
    }
}

impl<S: Into<String>> Extend<S> for GrantedPermissions {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for permission in iter {
            self.insert(permission);
        }
    }
}

impl From<Vec<String>> for GrantedPermissions {
    fn from(permissions: Vec<String>) -> Self {
        permissions.into_iter().collect()
    }
}

impl From<GrantedPermissions> for Vec<String> {
    fn from(granted: GrantedPermissions) -> Self {
        granted.sorted()
    }
}

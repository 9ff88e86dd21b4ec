//! Boolean permission queries
//!
//! A query is a tree of `And` / `Or` nodes over leaves. Leaves are either literal
//! permission strings or resource-parameterized generators that produce the permission
//! for a concrete resource at check time, so a single query shape can be reused across
//! resources.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};

use super::matcher::GrantedPermissions;
use crate::domain::DomainError;

/// Maximum nesting accepted from callers
const MAX_DEPTH: usize = 16;

/// Produces a permission string for a resource id
#[derive(Clone)]
pub struct ResourcePermission {
    template: Arc<dyn Fn(&str) -> String + Send + Sync>,
    /// Human-readable form used in logs, e.g. `api.{resourceId}.read_key`
    label: Arc<str>,
}

impl ResourcePermission {
    pub fn new<F>(label: impl Into<Arc<str>>, template: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            template: Arc::new(template),
            label: label.into(),
        }
    }

    pub fn for_resource(&self, resource_id: &str) -> String {
        (self.template)(resource_id)
    }
}

impl fmt::Debug for ResourcePermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResourcePermission").field(&self.label).finish()
    }
}

/// Leaf of a permission query
#[derive(Debug, Clone)]
pub enum PermissionLeaf {
    Literal(String),
    Parameterized(ResourcePermission),
}

impl PermissionLeaf {
    /// The permission this leaf requires, if it can be determined
    ///
    /// Parameterized leaves need a resource id; without one they resolve to nothing.
    fn required(&self, resource_id: Option<&str>) -> Option<String> {
        match self {
            Self::Literal(permission) => Some(permission.clone()),
            Self::Parameterized(generator) => resource_id.map(|id| generator.for_resource(id)),
        }
    }
}

/// A permission query tree
#[derive(Debug, Clone)]
pub enum PermissionQuery {
    And(Vec<PermissionQuery>),
    Or(Vec<PermissionQuery>),
    Leaf(PermissionLeaf),
}

impl PermissionQuery {
    pub fn literal(permission: impl Into<String>) -> Self {
        Self::Leaf(PermissionLeaf::Literal(permission.into()))
    }

    /// A leaf whose permission depends on the resource being checked
    pub fn parameterized<F>(label: impl Into<Arc<str>>, template: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::Leaf(PermissionLeaf::Parameterized(ResourcePermission::new(
            label, template,
        )))
    }

    pub fn and(children: impl IntoIterator<Item = impl Into<PermissionQuery>>) -> Self {
        Self::And(children.into_iter().map(Into::into).collect())
    }

    pub fn or(children: impl IntoIterator<Item = impl Into<PermissionQuery>>) -> Self {
        Self::Or(children.into_iter().map(Into::into).collect())
    }

    /// Evaluate against a granted set with no resource bound
    ///
    /// Parameterized leaves cannot be resolved and never match.
    pub fn evaluate(&self, granted: &GrantedPermissions) -> bool {
        self.eval(None, granted)
    }

    /// Evaluate with parameterized leaves bound to `resource_id`
    pub fn evaluate_for(&self, resource_id: &str, granted: &GrantedPermissions) -> bool {
        self.eval(Some(resource_id), granted)
    }

    // Empty nodes evaluate to false so an empty grant set can never satisfy a query.
    fn eval(&self, resource_id: Option<&str>, granted: &GrantedPermissions) -> bool {
        match self {
            Self::And(children) => {
                !children.is_empty() && children.iter().all(|c| c.eval(resource_id, granted))
            }
            Self::Or(children) => children.iter().any(|c| c.eval(resource_id, granted)),
            Self::Leaf(leaf) => leaf
                .required(resource_id)
                .is_some_and(|permission| granted.allows(&permission)),
        }
    }

    /// Replace parameterized leaves with literals for `resource_id`
    pub fn resolve(&self, resource_id: &str) -> PermissionQuery {
        match self {
            Self::And(children) => Self::And(children.iter().map(|c| c.resolve(resource_id)).collect()),
            Self::Or(children) => Self::Or(children.iter().map(|c| c.resolve(resource_id)).collect()),
            Self::Leaf(PermissionLeaf::Parameterized(generator)) => {
                Self::literal(generator.for_resource(resource_id))
            }
            Self::Leaf(literal) => Self::Leaf(literal.clone()),
        }
    }

    /// Reject shapes that cannot be meaningfully evaluated
    pub fn validate(&self) -> Result<(), DomainError> {
        self.validate_depth(0)
    }

    fn validate_depth(&self, depth: usize) -> Result<(), DomainError> {
        if depth > MAX_DEPTH {
            return Err(DomainError::validation(format!(
                "Permission query is nested deeper than {} levels",
                MAX_DEPTH
            )));
        }

        match self {
            Self::And(children) | Self::Or(children) => {
                if children.is_empty() {
                    return Err(DomainError::validation(
                        "Permission query nodes must have at least one child",
                    ));
                }
                children.iter().try_for_each(|c| c.validate_depth(depth + 1))
            }
            Self::Leaf(PermissionLeaf::Literal(permission)) if permission.trim().is_empty() => Err(
                DomainError::validation("Permission query leaves cannot be empty"),
            ),
            Self::Leaf(_) => Ok(()),
        }
    }
}

impl From<&str> for PermissionQuery {
    fn from(permission: &str) -> Self {
        Self::literal(permission)
    }
}

impl From<String> for PermissionQuery {
    fn from(permission: String) -> Self {
        Self::literal(permission)
    }
}

impl fmt::Display for PermissionQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(children) | Self::Or(children) => {
                let op = if matches!(self, Self::And(_)) { " AND " } else { " OR " };
                f.write_str("(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(op)?;
                    }
                    write!(f, "{}", child)?;
                }
                f.write_str(")")
            }
            Self::Leaf(PermissionLeaf::Literal(permission)) => f.write_str(permission),
            Self::Leaf(PermissionLeaf::Parameterized(generator)) => f.write_str(&generator.label),
        }
    }
}

/// Wire form: a string, `{"and": [...]}` or `{"or": [...]}`
#[derive(Deserialize)]
#[serde(untagged)]
enum RawQuery {
    Literal(String),
    And(AndNode),
    Or(OrNode),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AndNode {
    and: Vec<RawQuery>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct OrNode {
    or: Vec<RawQuery>,
}

impl From<RawQuery> for PermissionQuery {
    fn from(raw: RawQuery) -> Self {
        match raw {
            RawQuery::Literal(permission) => Self::literal(permission),
            RawQuery::And(node) => Self::And(node.and.into_iter().map(Into::into).collect()),
            RawQuery::Or(node) => Self::Or(node.or.into_iter().map(Into::into).collect()),
        }
    }
}

impl<'de> Deserialize<'de> for PermissionQuery {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawQuery::deserialize(deserializer).map(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn granted(permissions: &[&str]) -> GrantedPermissions {
        permissions.iter().copied().collect()
    }

    fn read_key() -> PermissionQuery {
        PermissionQuery::parameterized("api.{resourceId}.read_key", |id| {
            format!("api.{}.read_key", id)
        })
    }

    fn read_api() -> PermissionQuery {
        PermissionQuery::parameterized("api.{resourceId}.read_api", |id| {
            format!("api.{}.read_api", id)
        })
    }

    #[test]
    fn test_truth_table() {
        let a = "a.1.x";
        let b = "b.1.x";
        let c = "c.1.x";

        let cases: Vec<(PermissionQuery, Vec<&str>, bool)> = vec![
            (PermissionQuery::literal(a), vec![a], true),
            (PermissionQuery::literal(a), vec![b], false),
            (PermissionQuery::and([a, b]), vec![a, b], true),
            (PermissionQuery::and([a, b]), vec![a], false),
            (PermissionQuery::or([a, b]), vec![b], true),
            (PermissionQuery::or([a, b]), vec![c], false),
            (
                PermissionQuery::and([PermissionQuery::literal(a), PermissionQuery::or([b, c])]),
                vec![a, c],
                true,
            ),
            (
                PermissionQuery::and([PermissionQuery::literal(a), PermissionQuery::or([b, c])]),
                vec![b, c],
                false,
            ),
            (
                PermissionQuery::or([PermissionQuery::and([a, b]), PermissionQuery::literal(c)]),
                vec![c],
                true,
            ),
            (PermissionQuery::literal(a), vec!["a.*.x"], true),
            (PermissionQuery::literal(a), vec!["*.*.*"], true),
            (PermissionQuery::literal(a), vec!["a.*"], false),
            (PermissionQuery::and([a, b]), vec!["*.1.x"], true),
            (PermissionQuery::or([a, b]), vec![], false),
        ];

        for (query, grants, expected) in cases {
            let grants = granted(&grants);
            assert_eq!(query.evaluate(&grants), expected, "query {}", query);
            // deterministic
            assert_eq!(query.evaluate(&grants), expected, "query {}", query);
        }
    }

    #[test]
    fn test_full_grant_matches_any_query() {
        let grants = granted(&["*"]);

        assert!(PermissionQuery::literal("api.x.create_key").evaluate(&grants));
        assert!(PermissionQuery::and(["a", "b", "c"]).evaluate(&grants));
        assert!(
            PermissionQuery::or([PermissionQuery::and(["a.b", "c.d"]), read_key()])
                .evaluate_for("api_1", &grants)
        );
    }

    #[test]
    fn test_empty_grants_never_match() {
        let grants = GrantedPermissions::new();

        assert!(!PermissionQuery::literal("*").evaluate(&grants));
        assert!(!PermissionQuery::and(["a"]).evaluate(&grants));
        assert!(!PermissionQuery::or([PermissionQuery::And(vec![])]).evaluate(&grants));
        assert!(!PermissionQuery::And(vec![]).evaluate(&grants));
    }

    #[test]
    fn test_parameterized_matches_concrete_resource() {
        let query = PermissionQuery::or([read_key(), read_api()]);

        for resource in ["api_X", "api_123", "api_abc"] {
            let key_permission = format!("api.{}.read_key", resource);
            let api_permission = format!("api.{}.read_api", resource);
            let grants = granted(&[key_permission.as_str(), api_permission.as_str()]);
            assert!(query.evaluate_for(resource, &grants));
        }

        let other = granted(&["api.api_Y.read_key"]);
        assert!(!query.evaluate_for("api_X", &other));
    }

    #[test]
    fn test_parameterized_without_resource_fails_closed() {
        let query = read_key();
        assert!(!query.evaluate(&granted(&["api.api_X.read_key"])));
    }

    #[test]
    fn test_required_wildcard_not_expanded() {
        let query = PermissionQuery::literal("api.*.read_key");
        assert!(!query.evaluate(&granted(&["api.api_X.read_key"])));
        assert!(query.evaluate(&granted(&["api.*.read_key"])));
    }

    #[test]
    fn test_resource_id_with_star_is_embedded_verbatim() {
        let query = read_key();
        let grants = granted(&["api.api_X.read_key"]);
        // resolves to "api.*.read_key", which the grant does not cover
        assert!(!query.evaluate_for("*", &grants));
    }

    #[test]
    fn test_resolve() {
        let query = PermissionQuery::and([PermissionQuery::literal("*"), read_key()]);
        assert_eq!(query.to_string(), "(* AND api.{resourceId}.read_key)");
        assert_eq!(query.resolve("api_1").to_string(), "(* AND api.api_1.read_key)");
    }

    #[test]
    fn test_deserialize() {
        let query: PermissionQuery = serde_json::from_str(
            r#"{"and": ["api.a.read_key", {"or": ["x", "y"]}]}"#,
        )
        .unwrap();
        assert_eq!(query.to_string(), "(api.a.read_key AND (x OR y))");
        assert!(query.validate().is_ok());

        let leaf: PermissionQuery = serde_json::from_str(r#""api.a.read_key""#).unwrap();
        assert_eq!(leaf.to_string(), "api.a.read_key");
    }

    #[test]
    fn test_deserialize_rejects_unknown_shapes() {
        assert!(serde_json::from_str::<PermissionQuery>(r#"{"xor": ["a"]}"#).is_err());
        assert!(serde_json::from_str::<PermissionQuery>(r#"{"and": ["a"], "or": ["b"]}"#).is_err());
        assert!(serde_json::from_str::<PermissionQuery>("42").is_err());
    }

    #[test]
    fn test_validate() {
        assert!(PermissionQuery::And(vec![]).validate().is_err());
        assert!(PermissionQuery::literal(" ").validate().is_err());

        let mut deep = PermissionQuery::literal("a");
        for _ in 0..20 {
            deep = PermissionQuery::And(vec![deep]);
        }
        assert!(deep.validate().is_err());
    }
}

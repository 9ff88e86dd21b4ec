//! Permission queries required by management actions
//!
//! Root keys are checked against these before any storage is touched. Resource-scoped
//! actions accept a full grant, a wildcard over all APIs, or a grant naming the API.

use super::query::PermissionQuery;

fn api_scoped(action: &'static str) -> PermissionQuery {
    PermissionQuery::or([
        PermissionQuery::literal("*"),
        PermissionQuery::literal(format!("api.*.{}", action)),
        PermissionQuery::parameterized(format!("api.{{apiId}}.{}", action), move |api_id| {
            format!("api.{}.{}", api_id, action)
        }),
    ])
}

pub fn create_permission() -> PermissionQuery {
    PermissionQuery::or(["*", "rbac.*.create_permission"])
}

pub fn remove_permission_from_key() -> PermissionQuery {
    PermissionQuery::or(["*", "rbac.*.remove_permission_from_key"])
}

/// Evaluate with the API id of the key's keyspace bound
pub fn create_key() -> PermissionQuery {
    api_scoped("create_key")
}

pub fn delete_key() -> PermissionQuery {
    api_scoped("delete_key")
}

pub fn delete_api() -> PermissionQuery {
    api_scoped("delete_api")
}

/// Reading a key requires both key and API read access
pub fn read_key() -> PermissionQuery {
    PermissionQuery::and([api_scoped("read_key"), api_scoped("read_api")])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::permission::GrantedPermissions;

    fn granted(permissions: &[&str]) -> GrantedPermissions {
        permissions.iter().copied().collect()
    }

    #[test]
    fn test_create_permission() {
        assert!(create_permission().evaluate(&granted(&["*"])));
        assert!(create_permission().evaluate(&granted(&["rbac.*.create_permission"])));
        assert!(!create_permission().evaluate(&granted(&["rbac.*.delete_permission"])));
    }

    #[test]
    fn test_api_scoped_delete_key() {
        let query = delete_key();
        assert!(query.evaluate_for("api_1", &granted(&["api.api_1.delete_key"])));
        assert!(query.evaluate_for("api_1", &granted(&["api.*.delete_key"])));
        assert!(!query.evaluate_for("api_1", &granted(&["api.api_2.delete_key"])));
    }

    #[test]
    fn test_read_key_needs_both() {
        let query = read_key();
        assert!(query.evaluate_for(
            "api_1",
            &granted(&["api.api_1.read_key", "api.api_1.read_api"])
        ));
        assert!(!query.evaluate_for("api_1", &granted(&["api.api_1.read_key"])));
        assert!(query.evaluate_for("api_1", &granted(&["api.*.read_key", "api.api_1.read_api"])));
    }
}

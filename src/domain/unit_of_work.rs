//! Unit of work
//!
//! Mutations are staged in memory and applied together on commit. Either every staged
//! mutation becomes visible or none does; dropping an uncommitted unit discards it.

use async_trait::async_trait;
use std::fmt::{self, Debug};

use crate::domain::api_key::Key;
use crate::domain::audit::AuditLog;
use crate::domain::rbac::{KeyPermission, KeyRole, Permission, Role, RolePermission};
use crate::domain::workspace::{Api, Keyspace, Workspace};
use crate::domain::DomainError;

/// A single staged write
#[derive(Debug, Clone)]
pub enum Mutation {
    InsertWorkspace(Workspace),
    InsertKeyspace(Keyspace),
    InsertApi(Api),
    UpdateApi(Api),
    InsertKey(Key),
    UpdateKey(Key),
    InsertPermission(Permission),
    InsertRole(Role),
    InsertKeyPermission(KeyPermission),
    DeleteKeyPermission(KeyPermission),
    InsertKeyRole(KeyRole),
    InsertRolePermission(RolePermission),
    InsertAuditLog(AuditLog),
}

/// Discriminant of a [`Mutation`], used for fault injection and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    InsertWorkspace,
    InsertKeyspace,
    InsertApi,
    UpdateApi,
    InsertKey,
    UpdateKey,
    InsertPermission,
    InsertRole,
    InsertKeyPermission,
    DeleteKeyPermission,
    InsertKeyRole,
    InsertRolePermission,
    InsertAuditLog,
}

impl Mutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::InsertWorkspace(_) => MutationKind::InsertWorkspace,
            Self::InsertKeyspace(_) => MutationKind::InsertKeyspace,
            Self::InsertApi(_) => MutationKind::InsertApi,
            Self::UpdateApi(_) => MutationKind::UpdateApi,
            Self::InsertKey(_) => MutationKind::InsertKey,
            Self::UpdateKey(_) => MutationKind::UpdateKey,
            Self::InsertPermission(_) => MutationKind::InsertPermission,
            Self::InsertRole(_) => MutationKind::InsertRole,
            Self::InsertKeyPermission(_) => MutationKind::InsertKeyPermission,
            Self::DeleteKeyPermission(_) => MutationKind::DeleteKeyPermission,
            Self::InsertKeyRole(_) => MutationKind::InsertKeyRole,
            Self::InsertRolePermission(_) => MutationKind::InsertRolePermission,
            Self::InsertAuditLog(_) => MutationKind::InsertAuditLog,
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A set of staged mutations with explicit commit and rollback
#[async_trait]
pub trait UnitOfWork: Send {
    fn stage(&mut self, mutation: Mutation);

    fn staged(&self) -> &[Mutation];

    /// Apply every staged mutation atomically
    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    /// Discard every staged mutation
    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}

/// Opens units of work against a backing store
#[async_trait]
pub trait TransactionManager: Send + Sync + Debug {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, DomainError>;

    /// Apply `mutations` in a single unit of work
    async fn execute(&self, mutations: Vec<Mutation>) -> Result<(), DomainError> {
        let mut uow = self.begin().await?;
        for mutation in mutations {
            uow.stage(mutation);
        }
        uow.commit().await
    }
}

/// Staging buffer shared by unit of work implementations
#[derive(Debug, Default)]
pub struct StagedMutations {
    mutations: Vec<Mutation>,
}

impl StagedMutations {
    pub fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    pub fn as_slice(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn into_vec(self) -> Vec<Mutation> {
        self.mutations
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::id::WorkspaceId;

    #[test]
    fn test_mutation_kind() {
        let ws = Workspace::new("acme");
        let keyspace = Keyspace::new(ws.id.clone());
        let api = Api::new(WorkspaceId::generate(), "api", keyspace.id.clone());

        assert_eq!(
            Mutation::InsertWorkspace(ws).kind(),
            MutationKind::InsertWorkspace
        );
        assert_eq!(Mutation::UpdateApi(api).kind(), MutationKind::UpdateApi);
        assert_eq!(MutationKind::InsertAuditLog.to_string(), "InsertAuditLog");
    }

    #[test]
    fn test_staged_mutations() {
        let mut staged = StagedMutations::default();
        assert!(staged.is_empty());

        staged.push(Mutation::InsertWorkspace(Workspace::new("acme")));
        assert_eq!(staged.len(), 1);
        assert_eq!(staged.as_slice()[0].kind(), MutationKind::InsertWorkspace);
        assert_eq!(staged.into_vec().len(), 1);
    }
}

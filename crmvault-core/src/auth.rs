//! Caller verification shared by every backup and restore operation.

use crate::crypto::secure_compare;
use crate::error::{AuthError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Role carried by an actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Member,
}

/// A verified caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Identity recorded as `createdBy` on jobs
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }

    /// Whether the actor may run backups and restores
    pub fn is_privileged(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Resolves a presented credential to an actor
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// `Ok(None)` when the credential is unknown
    async fn resolve(&self, credential: &str) -> Result<Option<Actor>>;
}

/// Verify the caller, then proceed.
#[derive(Clone)]
pub struct AuthGuard {
    authorizer: Arc<dyn Authorizer>,
}

impl AuthGuard {
    pub fn new(authorizer: Arc<dyn Authorizer>) -> Self {
        Self { authorizer }
    }

    /// Resolve the credential and require a privileged actor.
    ///
    /// Missing and unknown credentials are unauthenticated; a known actor
    /// without the admin role is forbidden.
    pub async fn verify(&self, credential: Option<&str>, operation: &str) -> Result<Actor> {
        let credential = credential
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(AuthError::MissingCredential)?;

        let actor = self
            .authorizer
            .resolve(credential)
            .await?
            .ok_or(AuthError::InvalidCredential)?;

        if !actor.is_privileged() {
            tracing::warn!(actor = %actor.id, operation = %operation, "Rejected unprivileged actor");
            return Err(AuthError::forbidden(&actor.id, operation).into());
        }

        Ok(actor)
    }
}

/// A configured bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub token: String,
    pub actor: String,
    pub role: Role,
}

/// Authorizer backed by a fixed list of bearer tokens
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthorizer {
    grants: Vec<TokenGrant>,
}

impl StaticTokenAuthorizer {
    pub fn new(grants: Vec<TokenGrant>) -> Self {
        Self { grants }
    }
}

#[async_trait]
impl Authorizer for StaticTokenAuthorizer {
    async fn resolve(&self, credential: &str) -> Result<Option<Actor>> {
        Ok(self
            .grants
            .iter()
            .find(|grant| secure_compare(&grant.token, credential))
            .map(|grant| Actor::new(&grant.actor, grant.role)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VaultError;

    fn guard() -> AuthGuard {
        AuthGuard::new(Arc::new(StaticTokenAuthorizer::new(vec![
            TokenGrant {
                token: "admin-token".into(),
                actor: "admin@example.com".into(),
                role: Role::Admin,
            },
            TokenGrant {
                token: "member-token".into(),
                actor: "sales@example.com".into(),
                role: Role::Member,
            },
        ])))
    }

    #[tokio::test]
    async fn test_admin_is_allowed() -> Result<()> {
        let actor = guard().verify(Some("admin-token"), "backup").await?;
        assert_eq!(actor.id, "admin@example.com");
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_credential_is_unauthenticated() {
        for credential in [None, Some(""), Some("   ")] {
            let err = guard().verify(credential, "backup").await.unwrap_err();
            assert!(matches!(err, VaultError::Auth(AuthError::MissingCredential)));
        }
    }

    #[tokio::test]
    async fn test_unknown_credential_is_unauthenticated() {
        let err = guard().verify(Some("stolen"), "backup").await.unwrap_err();
        assert!(matches!(err, VaultError::Auth(AuthError::InvalidCredential)));
    }

    #[tokio::test]
    async fn test_member_is_forbidden() {
        let err = guard().verify(Some("member-token"), "restore").await.unwrap_err();
        match err {
            VaultError::Auth(AuthError::Forbidden { actor, operation }) => {
                assert_eq!(actor, "sales@example.com");
                assert_eq!(operation, "restore");
            }
            other => panic!("expected forbidden, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_guard_propagates_authorizer_failure() {
        let mut authorizer = MockAuthorizer::new();
        authorizer
            .expect_resolve()
            .times(1)
            .returning(|_| Err(VaultError::internal("identity service down")));

        let guard = AuthGuard::new(Arc::new(authorizer));
        let err = guard.verify(Some("anything"), "list").await.unwrap_err();
        assert!(matches!(err, VaultError::Internal { .. }));
    }

    #[tokio::test]
    async fn test_guard_skips_authorizer_without_credential() {
        let mut authorizer = MockAuthorizer::new();
        authorizer.expect_resolve().never();

        let guard = AuthGuard::new(Arc::new(authorizer));
        assert!(guard.verify(None, "list").await.is_err());
    }
}

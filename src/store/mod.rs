//! Credential store: users, roles, user-role links and password reset tokens.
//!
//! Two implementations share one trait. `PgCredentialStore` is used in
//! production; `MemoryCredentialStore` backs tests and `--in-memory` mode.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::identity::{Identity, ROLE_ADMIN, ROLE_USER, RoleRef};

mod memory;
mod postgres;

pub use memory::MemoryCredentialStore;
pub use postgres::{PgCredentialStore, apply_schema};

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Full user row, including the password hash. Never serialized.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub password_hash: String,
    pub roles: Vec<RoleRef>,
}

impl UserRecord {
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity::new(self.username.clone(), self.roles.clone())
    }

    #[must_use]
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.to_string(),
            username: self.username.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            roles: self.roles.clone(),
        }
    }
}

/// Password-free projection returned by the HTTP layer.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub roles: Vec<RoleRef>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub password_hash: String,
}

/// Partial update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub password_hash: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    Username,
    Name,
}

impl SortField {
    #[must_use]
    pub fn column(self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::Name => "name",
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserQuery {
    /// Case-insensitive substring match over username and name.
    pub search: Option<String>,
    /// Role tag the user must hold.
    pub role: Option<String>,
    pub page: u32,
    pub page_size: u32,
    pub sort: Option<(SortField, SortOrder)>,
}

impl Default for UserQuery {
    fn default() -> Self {
        Self {
            search: None,
            role: None,
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
            sort: None,
        }
    }
}

impl UserQuery {
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.page_size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome<T> {
    Created(T),
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    /// Either the user or the role does not exist.
    Missing,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Backend name reported by `/health`.
    fn backend(&self) -> &'static str;

    /// Cheap liveness check.
    async fn ping(&self) -> Result<()>;

    /// Look up a user with its role links.
    async fn find_user(&self, username: &str) -> Result<Option<UserRecord>>;

    /// Page of users plus the total number of matches.
    async fn list_users(&self, query: &UserQuery) -> Result<(Vec<UserSummary>, u64)>;

    async fn create_user(&self, user: NewUser) -> Result<CreateOutcome<UserSummary>>;

    async fn update_user(&self, username: &str, update: UserUpdate)
    -> Result<Option<UserSummary>>;

    /// Returns `false` when no such user existed.
    async fn delete_user(&self, username: &str) -> Result<bool>;

    async fn list_roles(&self) -> Result<Vec<RoleRef>>;

    async fn create_role(&self, role: RoleRef) -> Result<CreateOutcome<RoleRef>>;

    /// Removes the role and every link to it.
    async fn delete_role(&self, tag: &str) -> Result<bool>;

    /// Idempotent: linking an already linked pair succeeds.
    async fn assign_role(&self, username: &str, tag: &str) -> Result<LinkOutcome>;

    async fn revoke_role(&self, username: &str, tag: &str) -> Result<bool>;

    async fn has_role(&self, username: &str, tag: &str) -> Result<bool>;

    /// Store the hash of a reset token. Replaces any earlier token for the user.
    async fn store_reset_token(
        &self,
        username: &str,
        token_hash: Vec<u8>,
        ttl_seconds: i64,
    ) -> Result<bool>;

    /// Delete the token and return its username when still valid.
    async fn consume_reset_token(&self, token_hash: &[u8]) -> Result<Option<String>>;
}

/// Insert the default roles when missing.
///
/// # Errors
/// Propagates store failures.
pub async fn seed(store: &dyn CredentialStore) -> Result<()> {
    for role in [
        RoleRef::new(ROLE_ADMIN, "Administrator"),
        RoleRef::new(ROLE_USER, "User"),
    ] {
        // Conflict means the role already exists.
        let _ = store.create_role(role).await?;
    }
    Ok(())
}

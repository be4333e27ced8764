//! Minimal authenticated-user projection shared by sessions and tokens.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const ROLE_SUPERADMIN: &str = "superadmin";
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";

/// A role as carried inside an identity: tag plus display title.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RoleRef {
    pub tag: String,
    pub title: String,
}

impl RoleRef {
    #[must_use]
    pub fn new(tag: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            title: title.into(),
        }
    }
}

/// Authenticated identity attached to a request or stored in a session.
///
/// Never carries a password. `access_token` is only set on the login
/// response path (and in strict mode, inside the session record).
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub username: String,
    #[serde(default)]
    pub roles: Vec<RoleRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl Identity {
    #[must_use]
    pub fn new(username: impl Into<String>, roles: Vec<RoleRef>) -> Self {
        Self {
            username: username.into(),
            roles,
            access_token: None,
        }
    }

    /// Synthetic identity for the configured super-admin override.
    #[must_use]
    pub fn superadmin(username: impl Into<String>) -> Self {
        Self::new(
            username,
            vec![
                RoleRef::new(ROLE_SUPERADMIN, "Super Administrator"),
                RoleRef::new(ROLE_ADMIN, "Administrator"),
                RoleRef::new(ROLE_USER, "User"),
            ],
        )
    }

    #[must_use]
    pub fn has_role(&self, tag: &str) -> bool {
        self.roles.iter().any(|role| role.tag == tag)
    }

    #[must_use]
    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }

    /// Identity without the reflexive token, as signed into a new JWT.
    #[must_use]
    pub fn without_access_token(&self) -> Self {
        Self {
            username: self.username.clone(),
            roles: self.roles.clone(),
            access_token: None,
        }
    }
}

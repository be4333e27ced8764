//! API handlers and shared request validation.

pub mod auth;
pub mod health;
pub mod roles;
pub mod root;
pub mod users;

use axum::response::Response;
use regex::Regex;
use std::sync::LazyLock;

use super::error::forbidden;
use crate::auth::{
    Identity,
    identity::{ROLE_ADMIN, ROLE_SUPERADMIN},
};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 1024;

static USERNAME_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._@+\-]{3,128}$").ok());
static ROLE_TAG_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_\-]{0,63}$").ok());

/// Usernames are 3 to 128 characters of letters, digits and `._@+-`, so an
/// email address is a valid username.
pub fn valid_username(username: &str) -> bool {
    USERNAME_RE.as_ref().is_some_and(|re| re.is_match(username))
}

/// Role tags are lowercase identifiers such as `admin` or `billing-viewer`.
pub fn valid_role_tag(tag: &str) -> bool {
    ROLE_TAG_RE.as_ref().is_some_and(|re| re.is_match(tag))
}

pub fn valid_password(password: &str) -> bool {
    let length = password.chars().count();
    (MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&length)
}

pub fn is_admin(identity: &Identity) -> bool {
    identity.has_role(ROLE_ADMIN) || identity.has_role(ROLE_SUPERADMIN)
}

/// 403 unless the caller holds an admin role.
pub(crate) fn require_admin(identity: &Identity) -> Result<(), Response> {
    if is_admin(identity) {
        Ok(())
    } else {
        Err(forbidden())
    }
}

/// 403 unless the caller is `username` or an admin.
pub(crate) fn require_self_or_admin(identity: &Identity, username: &str) -> Result<(), Response> {
    if identity.username == username || is_admin(identity) {
        Ok(())
    } else {
        Err(forbidden())
    }
}

/// Trim and drop empty strings.
pub(crate) fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

//! # Gatehouse
//!
//! User and role service fronted by a configurable authentication layer.
//!
//! ## Authentication
//!
//! Three flags decide how requests are authenticated:
//!
//! - `session`: server-side sessions referenced by an `HttpOnly` cookie.
//! - `jwt`: HS256 access tokens, read from `Authorization: Bearer` or the
//!   `accessToken` cookie.
//! - `strict`: both of the above must corroborate every request. Requires
//!   `session` and `jwt`.
//!
//! The flags are validated once at startup; an invalid combination stops the
//! process before it binds. See [`auth`] for the decision rules.
//!
//! ## Storage
//!
//! Users, roles, sessions and password reset tokens live in `PostgreSQL`
//! (`sql/schema.sql`). Passwords are stored as Argon2id PHC strings. An
//! in-memory backend is available for development and tests.
//!
//! ## Authorization
//!
//! User and role management is restricted to identities holding `admin` (or
//! the configured super-admin). A user may read and update their own record.

pub mod api;
pub mod auth;
pub mod cli;
pub mod mail;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

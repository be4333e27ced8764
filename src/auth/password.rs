//! Password verification against the super-admin override and the store.

use anyhow::anyhow;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier as _, password_hash::SaltString,
};
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use tracing::debug;

use super::config::AuthConfig;
use super::error::AuthError;
use super::identity::{Identity, ROLE_SUPERADMIN};
use crate::store::CredentialStore;

/// Hash a password into an Argon2id PHC string.
///
/// # Errors
/// Returns an error if hashing fails.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| anyhow!("failed to hash password"))
}

/// Check `password` against a stored PHC string. Malformed hashes never match.
#[must_use]
pub fn verify_password_hash(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Hash compared against when the user does not exist, so both failure
/// paths pay for one Argon2 verification.
fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| hash_password("gatehouse-dummy-password").ok())
        .as_deref()
}

/// Equality over SHA-256 digests without early exit.
fn digest_eq(left: &str, right: &str) -> bool {
    let left = Sha256::digest(left.as_bytes());
    let right = Sha256::digest(right.as_bytes());
    left.iter()
        .zip(right.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

pub struct PasswordVerifier<'a> {
    config: &'a AuthConfig,
    store: &'a dyn CredentialStore,
}

impl<'a> PasswordVerifier<'a> {
    #[must_use]
    pub fn new(config: &'a AuthConfig, store: &'a dyn CredentialStore) -> Self {
        Self { config, store }
    }

    fn superadmin_matches(&self, username: &str, password: &SecretString) -> bool {
        let Some((admin_user, admin_password)) = self.config.superadmin() else {
            return false;
        };
        // Both comparisons always run.
        let user_ok = digest_eq(admin_user, username);
        let password_ok = digest_eq(admin_password.expose_secret(), password.expose_secret());
        user_ok & password_ok
    }

    /// Validate a username/password pair.
    ///
    /// # Errors
    /// `NotFound` or `InvalidCredential` on mismatch, `Store` on lookup failure.
    pub async fn verify(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<Identity, AuthError> {
        if self.superadmin_matches(username, password) {
            debug!("super-admin override accepted");
            return Ok(Identity::superadmin(username));
        }

        let Some(record) = self.store.find_user(username).await? else {
            if let Some(hash) = dummy_hash() {
                let _ = verify_password_hash(password.expose_secret(), hash);
            }
            return Err(AuthError::NotFound);
        };

        if !verify_password_hash(password.expose_secret(), &record.password_hash) {
            return Err(AuthError::InvalidCredential);
        }
        Ok(record.identity())
    }

    /// Load the stored identity for `username`.
    ///
    /// # Errors
    /// `NotFound` when the user no longer exists.
    pub async fn resolve(&self, username: &str) -> Result<Identity, AuthError> {
        self.store
            .find_user(username)
            .await?
            .map(|record| record.identity())
            .ok_or(AuthError::NotFound)
    }

    /// Re-resolve the subject of a previously issued token without a password.
    ///
    /// A stored row always wins. The super-admin identity is only rebuilt when
    /// no row exists and the token was already signed with the super-admin role.
    ///
    /// # Errors
    /// `NotFound` when neither a row nor a super-admin claim matches.
    pub async fn resolve_claimed(&self, claimed: &Identity) -> Result<Identity, AuthError> {
        if let Some(record) = self.store.find_user(&claimed.username).await? {
            return Ok(record.identity());
        }
        if self.is_superadmin(&claimed.username) && claimed.has_role(ROLE_SUPERADMIN) {
            return Ok(Identity::superadmin(&claimed.username));
        }
        Err(AuthError::NotFound)
    }

    /// Whether `username` is the configured super-admin name.
    #[must_use]
    pub fn is_superadmin(&self, username: &str) -> bool {
        is_reserved_username(self.config, username)
    }
}

/// The configured super-admin name cannot be registered as a stored user.
#[must_use]
pub fn is_reserved_username(config: &AuthConfig, username: &str) -> bool {
    config
        .superadmin()
        .is_some_and(|(admin_user, _)| admin_user.eq_ignore_ascii_case(username.trim()))
}

//! HS256 access tokens and the revocation denylist.

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind, get_current_timestamp,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::config::AuthConfig;
use super::error::AuthError;
use super::identity::{Identity, RoleRef};

/// Cookie carrying the access token when JWT mode is enabled.
pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";

/// How long past `exp` a token may still be renewed. Revoked tokens stay on
/// the denylist for the same window.
pub const RENEWAL_WINDOW_SECONDS: u64 = 7 * 24 * 60 * 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifyMode {
    /// Signature, expiry and not-before are all enforced.
    Strict,
    /// Expired tokens still decode. Only the renewal endpoint uses this.
    IgnoreExpiration,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<RoleRef>>,
    pub iat: u64,
    pub exp: u64,
    pub nbf: u64,
}

impl Claims {
    /// Last second at which this token may be exchanged for a new one.
    #[must_use]
    pub fn renewable_until(&self) -> u64 {
        self.exp.saturating_add(RENEWAL_WINDOW_SECONDS)
    }

    fn into_identity(self) -> Identity {
        Identity::new(self.username, self.roles.unwrap_or_default())
    }
}

pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expires_in: u64,
    not_before: u64,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("expires_in", &self.expires_in)
            .field("not_before", &self.not_before)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret().expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            expires_in: config.token_expires_in().as_secs(),
            not_before: config.token_not_before().as_secs(),
        }
    }

    #[must_use]
    pub fn expires_in(&self) -> u64 {
        self.expires_in
    }

    /// Sign `identity` with the current time as `iat`.
    ///
    /// # Errors
    /// Returns `AuthError::Store` if encoding fails.
    pub fn sign(&self, identity: &Identity) -> Result<String, AuthError> {
        self.sign_at(identity, get_current_timestamp())
    }

    /// Sign with an explicit issue time. Identical inputs give identical tokens.
    ///
    /// # Errors
    /// Returns `AuthError::Store` if encoding fails.
    pub fn sign_at(&self, identity: &Identity, issued_at: u64) -> Result<String, AuthError> {
        // Only username and roles are carried; time claims are always recomputed.
        let claims = Claims {
            username: identity.username.clone(),
            roles: (!identity.roles.is_empty()).then(|| identity.roles.clone()),
            iat: issued_at,
            exp: issued_at.saturating_add(self.expires_in),
            nbf: issued_at.saturating_add(self.not_before),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| AuthError::Store(anyhow::anyhow!("failed to sign token: {err}")))
    }

    /// Decode the full claim set.
    ///
    /// # Errors
    /// `TokenExpired` when past `exp` in strict mode or past the renewal
    /// window otherwise, `TokenInvalid` for bad signatures or shapes.
    pub fn decode_claims(&self, token: &str, mode: VerifyMode) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.validate_exp = mode == VerifyMode::Strict;
        validation.set_required_spec_claims(&["exp", "nbf"]);

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            })?;

        if mode == VerifyMode::IgnoreExpiration && claims.renewable_until() < get_current_timestamp()
        {
            return Err(AuthError::TokenExpired);
        }
        Ok(claims)
    }

    /// Decode `token` into the identity it was signed for.
    ///
    /// # Errors
    /// See [`TokenCodec::decode_claims`].
    pub fn verify(&self, token: &str, mode: VerifyMode) -> Result<Identity, AuthError> {
        self.decode_claims(token, mode).map(Claims::into_identity)
    }
}

/// Revoked tokens keyed by digest until their natural expiry.
#[derive(Debug, Default)]
pub struct TokenDenylist {
    entries: Mutex<HashMap<Vec<u8>, u64>>,
}

impl TokenDenylist {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `token` as revoked until `expires_at`. Stale entries are pruned.
    pub async fn revoke(&self, token: &str, expires_at: u64) {
        let now = get_current_timestamp();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, exp| *exp >= now);
        if expires_at >= now {
            entries.insert(token_digest(token), expires_at);
        }
    }

    pub async fn is_revoked(&self, token: &str) -> bool {
        let entries = self.entries.lock().await;
        entries.contains_key(&token_digest(token))
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

fn token_digest(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::config::AuthFlags;
    use anyhow::Result;
    use secrecy::SecretString;

    fn codec() -> TokenCodec {
        let config = AuthConfig::new(
            AuthFlags::new(false, true, false),
            SecretString::from("unit-test-secret".to_string()),
        )
        .with_token_expires_in_seconds(60);
        TokenCodec::new(&config)
    }

    fn alice() -> Identity {
        Identity::new("alice", vec![RoleRef::new("user", "User")])
    }

    #[test]
    fn sign_then_verify_returns_username() -> Result<()> {
        let codec = codec();
        let token = codec.sign(&alice())?;
        let identity = codec.verify(&token, VerifyMode::Strict)?;
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.roles, alice().roles);
        assert_eq!(identity.access_token, None);
        Ok(())
    }

    #[test]
    fn sign_at_is_deterministic() -> Result<()> {
        let codec = codec();
        let now = get_current_timestamp();
        assert_eq!(codec.sign_at(&alice(), now)?, codec.sign_at(&alice(), now)?);
        Ok(())
    }

    #[test]
    fn sign_ignores_reflexive_access_token() -> Result<()> {
        let codec = codec();
        let now = get_current_timestamp();
        let with_token = alice().with_access_token(Some("previous".to_string()));
        assert_eq!(codec.sign_at(&with_token, now)?, codec.sign_at(&alice(), now)?);
        Ok(())
    }

    #[test]
    fn expired_token_fails_strict_but_decodes_for_renewal() -> Result<()> {
        let codec = codec();
        let issued_at = get_current_timestamp() - 600;
        let token = codec.sign_at(&alice(), issued_at)?;

        assert!(matches!(
            codec.verify(&token, VerifyMode::Strict),
            Err(AuthError::TokenExpired)
        ));
        let identity = codec.verify(&token, VerifyMode::IgnoreExpiration)?;
        assert_eq!(identity.username, "alice");
        Ok(())
    }

    #[test]
    fn renewal_window_is_bounded() -> Result<()> {
        let codec = codec();
        let issued_at = get_current_timestamp() - RENEWAL_WINDOW_SECONDS - 120;
        let token = codec.sign_at(&alice(), issued_at)?;
        assert!(matches!(
            codec.verify(&token, VerifyMode::IgnoreExpiration),
            Err(AuthError::TokenExpired)
        ));
        Ok(())
    }

    #[test]
    fn tampered_or_foreign_tokens_are_invalid() -> Result<()> {
        let codec = codec();
        let token = codec.sign(&alice())?;

        let other = TokenCodec::new(&AuthConfig::new(
            AuthFlags::new(false, true, false),
            SecretString::from("another-secret".to_string()),
        ));
        assert!(matches!(
            other.verify(&token, VerifyMode::Strict),
            Err(AuthError::TokenInvalid)
        ));
        assert!(matches!(
            codec.verify("not.a.token", VerifyMode::IgnoreExpiration),
            Err(AuthError::TokenInvalid)
        ));
        Ok(())
    }

    #[test]
    fn not_before_is_enforced() -> Result<()> {
        let config = AuthConfig::new(
            AuthFlags::new(false, true, false),
            SecretString::from("unit-test-secret".to_string()),
        )
        .with_token_not_before_seconds(300);
        let codec = TokenCodec::new(&config);
        let token = codec.sign(&alice())?;
        assert!(matches!(
            codec.verify(&token, VerifyMode::Strict),
            Err(AuthError::TokenInvalid)
        ));
        Ok(())
    }

    #[test]
    fn repeated_verification_is_identical() -> Result<()> {
        let codec = codec();
        let token = codec.sign(&alice())?;
        let first = codec.decode_claims(&token, VerifyMode::Strict)?;
        let second = codec.decode_claims(&token, VerifyMode::Strict)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn denylist_prunes_expired_entries() {
        let denylist = TokenDenylist::new();
        let now = get_current_timestamp();

        denylist.revoke("live", now + 60).await;
        assert!(denylist.is_revoked("live").await);
        assert!(!denylist.is_revoked("other").await);

        // Already expired tokens are not worth remembering.
        denylist.revoke("stale", now - 60).await;
        assert!(!denylist.is_revoked("stale").await);
        assert_eq!(denylist.len().await, 1);
    }
}

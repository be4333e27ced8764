//! Shared auth state handed to handlers and the guard middleware.

use axum::http::HeaderMap;
use std::sync::Arc;

use super::config::AuthConfig;
use super::error::AuthError;
use super::guard::read_cookie;
use super::identity::Identity;
use super::password::PasswordVerifier;
use super::session::{SESSION_COOKIE_NAME, SessionStore};
use super::token::{TokenCodec, TokenDenylist, VerifyMode};
use crate::mail::MailSender;
use crate::store::CredentialStore;

pub struct AuthState {
    config: AuthConfig,
    codec: TokenCodec,
    denylist: TokenDenylist,
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    mailer: Arc<dyn MailSender>,
}

impl AuthState {
    /// Flags are not validated here; call `AuthConfig::validate` at startup.
    #[must_use]
    pub fn new(
        config: AuthConfig,
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        mailer: Arc<dyn MailSender>,
    ) -> Self {
        let codec = TokenCodec::new(&config);
        Self {
            config,
            codec,
            denylist: TokenDenylist::new(),
            credentials,
            sessions,
            mailer,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    #[must_use]
    pub fn denylist(&self) -> &TokenDenylist {
        &self.denylist
    }

    #[must_use]
    pub fn credentials(&self) -> &dyn CredentialStore {
        self.credentials.as_ref()
    }

    #[must_use]
    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    #[must_use]
    pub fn mailer(&self) -> &dyn MailSender {
        self.mailer.as_ref()
    }

    #[must_use]
    pub fn password_verifier(&self) -> PasswordVerifier<'_> {
        PasswordVerifier::new(&self.config, self.credentials.as_ref())
    }

    /// Verify a token and reject it if it was revoked.
    ///
    /// # Errors
    /// `TokenInvalid` for revoked or malformed tokens, `TokenExpired` in strict mode.
    pub async fn verify_token(&self, token: &str, mode: VerifyMode) -> Result<Identity, AuthError> {
        if self.denylist.is_revoked(token).await {
            return Err(AuthError::TokenInvalid);
        }
        self.codec.verify(token, mode)
    }

    /// Denylist `token` until it can no longer be renewed. Undecodable or
    /// already unrenewable tokens are ignored.
    pub async fn revoke_token(&self, token: &str) {
        if let Ok(claims) = self.codec.decode_claims(token, VerifyMode::IgnoreExpiration) {
            self.denylist.revoke(token, claims.renewable_until()).await;
        }
    }

    /// Identity bound to the session cookie on this request, if any.
    ///
    /// # Errors
    /// `Store` when the session store fails.
    pub async fn session_identity(&self, headers: &HeaderMap) -> Result<Option<Identity>, AuthError> {
        let Some(token) = read_cookie(headers, SESSION_COOKIE_NAME) else {
            return Ok(None);
        };
        Ok(self.sessions.lookup(&token).await?)
    }
}

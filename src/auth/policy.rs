//! Login-route policy: validate credentials, then issue a session and/or token.
//!
//! Which artifacts are produced depends only on the flags:
//!
//! - `session` writes a server-side session.
//! - `jwt` mints an access token.
//! - `strict` stores the identity together with its token in the session,
//!   and writes that session even when `session` is off but a token was
//!   issued. Resource guards then find both corroborating artifacts.
//!
//! Login succeeds when at least one artifact was produced.

use secrecy::SecretString;
use tracing::{debug, info};

use super::error::AuthError;
use super::identity::Identity;
use super::state::AuthState;
use super::token::VerifyMode;

pub enum LoginCredentials {
    Password {
        username: String,
        password: SecretString,
    },
    /// A previously issued token, possibly expired.
    Token(String),
}

impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::Token(_) => f.write_str("Token(..)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    /// Identity returned to the caller, carrying the new token when one was minted.
    pub identity: Identity,
    pub session_token: Option<String>,
    pub access_token: Option<String>,
}

pub struct LoginPolicy<'a> {
    state: &'a AuthState,
}

impl<'a> LoginPolicy<'a> {
    #[must_use]
    pub fn new(state: &'a AuthState) -> Self {
        Self { state }
    }

    async fn authenticate(
        &self,
        credentials: LoginCredentials,
    ) -> Result<(Identity, Option<String>), AuthError> {
        let verifier = self.state.password_verifier();
        match credentials {
            LoginCredentials::Password { username, password } => {
                let identity = verifier.verify(&username, &password).await?;
                Ok((identity, None))
            }
            LoginCredentials::Token(token) => {
                let claimed = self
                    .state
                    .verify_token(&token, VerifyMode::IgnoreExpiration)
                    .await?;
                // The subject must still exist; roles are reloaded.
                let identity = verifier.resolve_claimed(&claimed).await?;
                Ok((identity, Some(token)))
            }
        }
    }

    /// Validate `credentials` and produce the login artifacts.
    ///
    /// # Errors
    /// Any credential failure is returned as-is; callers surface it as
    /// `Unauthorized`. Store failures propagate as `Store`.
    pub async fn sign_in(&self, credentials: LoginCredentials) -> Result<LoginOutcome, AuthError> {
        let config = self.state.config();
        let flags = config.flags();

        let (identity, previous_token) = self.authenticate(credentials).await?;
        let identity = identity.without_access_token();

        let access_token = if flags.jwt {
            Some(self.state.codec().sign(&identity)?)
        } else {
            None
        };

        let write_session = flags.session || (flags.strict && access_token.is_some());
        let session_token = if write_session {
            let stored = if flags.strict {
                identity.clone().with_access_token(access_token.clone())
            } else {
                identity.clone()
            };
            Some(
                self.state
                    .sessions()
                    .create(&stored, config.session_ttl())
                    .await?,
            )
        } else {
            None
        };

        if session_token.is_none() && access_token.is_none() {
            return Err(AuthError::Unauthorized);
        }

        // Signing is deterministic per second, so a renewal can reproduce the same token.
        if let (Some(previous), Some(minted)) = (previous_token.as_deref(), access_token.as_deref())
        {
            if previous != minted {
                self.state.revoke_token(previous).await;
                debug!("renewed access token, previous token revoked");
            }
        }

        info!(
            username = %identity.username,
            session = session_token.is_some(),
            token = access_token.is_some(),
            "sign-in succeeded"
        );

        Ok(LoginOutcome {
            identity: identity.with_access_token(access_token.clone()),
            session_token,
            access_token,
        })
    }

    /// Destroy the session and revoke the token presented on this request.
    ///
    /// # Errors
    /// Returns `Store` when the session store fails.
    pub async fn sign_out(
        &self,
        session_token: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<(), AuthError> {
        if let Some(token) = session_token {
            self.state.sessions().destroy(token).await?;
        }
        if let Some(token) = access_token {
            self.state.revoke_token(token).await;
        }
        Ok(())
    }
}

use thiserror::Error;

/// Invalid combination of authentication flags. Fatal at startup.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "strict authentication requires both authentication methods (session, jwt) to be enabled"
    )]
    StrictRequiresBoth,
    #[error("at least one authentication method (session, jwt) must be enabled")]
    NoMethodEnabled,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("invalid credentials")]
    InvalidCredential,
    #[error("user not found")]
    NotFound,
    #[error("token expired")]
    TokenExpired,
    #[error("invalid token")]
    TokenInvalid,
    #[error("unauthorized")]
    Unauthorized,
    #[error("store failure: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl AuthError {
    /// Credential and token failures all surface to callers as `Unauthorized`.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredential
                | Self::NotFound
                | Self::TokenExpired
                | Self::TokenInvalid
                | Self::Unauthorized
        )
    }

    /// Caller-facing message. Does not distinguish unknown users from bad passwords.
    #[must_use]
    pub fn public_message(&self) -> String {
        if self.is_unauthorized() {
            "Unauthorized access".to_string()
        } else {
            match self {
                Self::Configuration(err) => err.to_string(),
                _ => "Internal server error".to_string(),
            }
        }
    }
}

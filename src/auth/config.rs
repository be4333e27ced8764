//! Process-wide authentication configuration, read-only after startup.

use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use super::error::ConfigError;
use super::guard::{self, RouteKind};

const DEFAULT_TOKEN_EXPIRES_IN_SECONDS: u64 = 60 * 60;
const DEFAULT_TOKEN_NOT_BEFORE_SECONDS: u64 = 0;
const DEFAULT_SESSION_TTL_SECONDS: u64 = 12 * 60 * 60;
const DEFAULT_API_PREFIX: &str = "/api/";
const DEFAULT_LOGIN_REDIRECT: &str = "/login?status=failed";
const DEFAULT_FRONTEND_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_MAIL_FROM: &str = "no-reply@gatehouse.dev";
const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 30 * 60;

/// The three independent switches that drive guard selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AuthFlags {
    pub session: bool,
    pub jwt: bool,
    pub strict: bool,
}

impl AuthFlags {
    #[must_use]
    pub const fn new(session: bool, jwt: bool, strict: bool) -> Self {
        Self {
            session,
            jwt,
            strict,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    flags: AuthFlags,
    jwt_secret: SecretString,
    token_expires_in: Duration,
    token_not_before: Duration,
    session_ttl: Duration,
    superadmin_username: Option<String>,
    superadmin_password: Option<SecretString>,
    api_prefix: String,
    login_redirect: String,
    cookie_secure: bool,
    frontend_base_url: String,
    mail_from: String,
    reset_token_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(flags: AuthFlags, jwt_secret: SecretString) -> Self {
        Self {
            flags,
            jwt_secret,
            token_expires_in: Duration::from_secs(DEFAULT_TOKEN_EXPIRES_IN_SECONDS),
            token_not_before: Duration::from_secs(DEFAULT_TOKEN_NOT_BEFORE_SECONDS),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECONDS),
            superadmin_username: None,
            superadmin_password: None,
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            login_redirect: DEFAULT_LOGIN_REDIRECT.to_string(),
            cookie_secure: false,
            frontend_base_url: DEFAULT_FRONTEND_BASE_URL.to_string(),
            mail_from: DEFAULT_MAIL_FROM.to_string(),
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_token_expires_in_seconds(mut self, seconds: u64) -> Self {
        self.token_expires_in = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_token_not_before_seconds(mut self, seconds: u64) -> Self {
        self.token_not_before = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.session_ttl = Duration::from_secs(seconds);
        self
    }

    /// Both values must be present for the override to apply.
    #[must_use]
    pub fn with_superadmin(
        mut self,
        username: Option<String>,
        password: Option<SecretString>,
    ) -> Self {
        self.superadmin_username = username.filter(|u| !u.is_empty());
        self.superadmin_password = password.filter(|p| !p.expose_secret().is_empty());
        self
    }

    #[must_use]
    pub fn with_api_prefix(mut self, prefix: String) -> Self {
        self.api_prefix = prefix;
        self
    }

    #[must_use]
    pub fn with_login_redirect(mut self, target: String) -> Self {
        self.login_redirect = target;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn with_frontend_base_url(mut self, url: String) -> Self {
        self.frontend_base_url = url;
        self
    }

    #[must_use]
    pub fn with_mail_from(mut self, from: String) -> Self {
        self.mail_from = from;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    /// Reject flag combinations no guard can serve.
    ///
    /// # Errors
    /// Returns `ConfigError` when strict mode lacks a method or no method is enabled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        guard::select(self.flags, RouteKind::Resource).map(|_| ())
    }

    #[must_use]
    pub fn flags(&self) -> AuthFlags {
        self.flags
    }

    #[must_use]
    pub fn jwt_secret(&self) -> &SecretString {
        &self.jwt_secret
    }

    #[must_use]
    pub fn token_expires_in(&self) -> Duration {
        self.token_expires_in
    }

    #[must_use]
    pub fn token_not_before(&self) -> Duration {
        self.token_not_before
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// The override pair, only when both halves are configured.
    #[must_use]
    pub fn superadmin(&self) -> Option<(&str, &SecretString)> {
        match (&self.superadmin_username, &self.superadmin_password) {
            (Some(username), Some(password)) => Some((username.as_str(), password)),
            _ => None,
        }
    }

    #[must_use]
    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    #[must_use]
    pub fn login_redirect(&self) -> &str {
        &self.login_redirect
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn mail_from(&self) -> &str {
        &self.mail_from
    }

    #[must_use]
    pub fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> SecretString {
        SecretString::from("test-secret".to_string())
    }

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new(AuthFlags::new(true, true, false), secret());

        assert_eq!(
            config.token_expires_in(),
            Duration::from_secs(DEFAULT_TOKEN_EXPIRES_IN_SECONDS)
        );
        assert_eq!(config.token_not_before(), Duration::ZERO);
        assert_eq!(
            config.session_ttl(),
            Duration::from_secs(DEFAULT_SESSION_TTL_SECONDS)
        );
        assert_eq!(config.api_prefix(), "/api/");
        assert_eq!(config.login_redirect(), "/login?status=failed");
        assert!(!config.cookie_secure());
        assert!(config.superadmin().is_none());

        let config = config
            .with_token_expires_in_seconds(120)
            .with_token_not_before_seconds(5)
            .with_session_ttl_seconds(30)
            .with_cookie_secure(true)
            .with_login_redirect("/signin".to_string());

        assert_eq!(config.token_expires_in(), Duration::from_secs(120));
        assert_eq!(config.token_not_before(), Duration::from_secs(5));
        assert_eq!(config.session_ttl(), Duration::from_secs(30));
        assert!(config.cookie_secure());
        assert_eq!(config.login_redirect(), "/signin");
    }

    #[test]
    fn superadmin_requires_both_halves() {
        let config = AuthConfig::new(AuthFlags::new(true, false, false), secret())
            .with_superadmin(Some("root".to_string()), None);
        assert!(config.superadmin().is_none());

        let config = config.with_superadmin(
            Some("root".to_string()),
            Some(SecretString::from(String::new())),
        );
        assert!(config.superadmin().is_none());

        let config = config.with_superadmin(
            Some("root".to_string()),
            Some(SecretString::from("hunter2".to_string())),
        );
        assert_eq!(config.superadmin().map(|(u, _)| u), Some("root"));
    }

    #[test]
    fn validate_rejects_invalid_flags() {
        let strict_without_jwt = AuthConfig::new(AuthFlags::new(true, false, true), secret());
        assert_eq!(
            strict_without_jwt.validate(),
            Err(ConfigError::StrictRequiresBoth)
        );

        let nothing = AuthConfig::new(AuthFlags::new(false, false, false), secret());
        assert_eq!(nothing.validate(), Err(ConfigError::NoMethodEnabled));

        let ok = AuthConfig::new(AuthFlags::new(false, true, false), secret());
        assert_eq!(ok.validate(), Ok(()));
    }
}

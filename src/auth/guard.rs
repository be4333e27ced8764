//! Guard selection and per-request evaluation.
//!
//! `select` maps the flags (and whether the route is the login route) to one
//! `GuardVariant`. `evaluate` runs that variant against a request and returns
//! an `AuthResult` that the HTTP layer turns into a response.

use axum::http::{
    HeaderMap,
    header::{AUTHORIZATION, COOKIE},
};
use tracing::debug;

use super::config::AuthFlags;
use super::error::{AuthError, ConfigError};
use super::identity::Identity;
use super::policy::{LoginCredentials, LoginOutcome, LoginPolicy};
use super::state::AuthState;
use super::token::{ACCESS_TOKEN_COOKIE, VerifyMode};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardVariant {
    /// Validates submitted credentials; never looks at existing sessions.
    LoginGuard,
    SessionOnly,
    JwtOnly,
    SessionAndJwt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteKind {
    Login,
    Resource,
}

/// Pick the guard for a route.
///
/// # Errors
/// `StrictRequiresBoth` when strict mode lacks a method, `NoMethodEnabled`
/// when neither method is on. Checked before the route kind is considered.
pub fn select(flags: AuthFlags, route: RouteKind) -> Result<GuardVariant, ConfigError> {
    if flags.strict && !(flags.session && flags.jwt) {
        return Err(ConfigError::StrictRequiresBoth);
    }
    if !flags.session && !flags.jwt {
        return Err(ConfigError::NoMethodEnabled);
    }
    Ok(match (route, flags.session, flags.jwt) {
        (RouteKind::Login, _, _) => GuardVariant::LoginGuard,
        (RouteKind::Resource, true, true) => GuardVariant::SessionAndJwt,
        (RouteKind::Resource, true, false) => GuardVariant::SessionOnly,
        (RouteKind::Resource, false, _) => GuardVariant::JwtOnly,
    })
}

pub struct RequestContext<'a> {
    pub path: &'a str,
    pub headers: &'a HeaderMap,
    /// Only present on the login route.
    pub credentials: Option<LoginCredentials>,
}

impl<'a> RequestContext<'a> {
    #[must_use]
    pub fn new(path: &'a str, headers: &'a HeaderMap) -> Self {
        Self {
            path,
            headers,
            credentials: None,
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: LoginCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

#[derive(Debug)]
pub enum AuthResult {
    /// Resource guard passed; the identity goes into the request context.
    Authenticated(Identity),
    /// Login guard passed and produced artifacts.
    SignedIn(LoginOutcome),
    RejectWithError(AuthError),
    /// Redirect target for non-API paths.
    RejectWithRedirect(String),
}

/// Run `variant` for one request.
pub async fn evaluate(
    variant: GuardVariant,
    ctx: RequestContext<'_>,
    state: &AuthState,
) -> AuthResult {
    let RequestContext {
        path,
        headers,
        credentials,
    } = ctx;

    match variant {
        GuardVariant::LoginGuard => {
            let Some(credentials) = credentials else {
                return reject(path, state, AuthError::Unauthorized);
            };
            match LoginPolicy::new(state).sign_in(credentials).await {
                Ok(outcome) => AuthResult::SignedIn(outcome),
                Err(err) => reject(path, state, err),
            }
        }
        GuardVariant::SessionOnly => match session_check(headers, state).await {
            Ok(identity) => AuthResult::Authenticated(identity),
            Err(err) => reject(path, state, err),
        },
        GuardVariant::JwtOnly => match jwt_check(headers, state).await {
            Ok(identity) => AuthResult::Authenticated(identity),
            Err(err) => reject(path, state, err),
        },
        GuardVariant::SessionAndJwt => {
            if state.config().flags().strict {
                strict_check(path, headers, state).await
            } else {
                // Token identity takes precedence; the session is only consulted as fallback.
                match jwt_check(headers, state).await {
                    Ok(identity) => AuthResult::Authenticated(identity),
                    Err(token_err) => match session_check(headers, state).await {
                        Ok(identity) => AuthResult::Authenticated(identity),
                        Err(session_err) => reject(path, state, worst(token_err, session_err)),
                    },
                }
            }
        }
    }
}

async fn strict_check(path: &str, headers: &HeaderMap, state: &AuthState) -> AuthResult {
    let token = jwt_check(headers, state).await;
    let session = session_check(headers, state).await;
    match (token, session) {
        (Ok(token_identity), Ok(session_identity)) => {
            if token_identity.username == session_identity.username {
                AuthResult::Authenticated(token_identity)
            } else {
                debug!("session and token belong to different users");
                reject(path, state, AuthError::Unauthorized)
            }
        }
        (Err(token_err), Err(session_err)) => reject(path, state, worst(token_err, session_err)),
        (Err(err), Ok(_)) | (Ok(_), Err(err)) => reject(path, state, err),
    }
}

/// Prefer surfacing a store failure over an ordinary credential miss.
fn worst(first: AuthError, second: AuthError) -> AuthError {
    if first.is_unauthorized() { second } else { first }
}

async fn session_check(headers: &HeaderMap, state: &AuthState) -> Result<Identity, AuthError> {
    state
        .session_identity(headers)
        .await?
        .ok_or(AuthError::Unauthorized)
}

async fn jwt_check(headers: &HeaderMap, state: &AuthState) -> Result<Identity, AuthError> {
    let token = resolve_incoming_token(headers).ok_or(AuthError::Unauthorized)?;
    state.verify_token(&token, VerifyMode::Strict).await
}

fn reject(path: &str, state: &AuthState, err: AuthError) -> AuthResult {
    let config = state.config();
    if err.is_unauthorized() && !is_api_path(path, config.api_prefix()) {
        return AuthResult::RejectWithRedirect(config.login_redirect().to_string());
    }
    AuthResult::RejectWithError(err)
}

/// True for paths under the API prefix. The bare prefix without its trailing
/// slash counts as well.
#[must_use]
pub fn is_api_path(path: &str, api_prefix: &str) -> bool {
    path.starts_with(api_prefix) || path == api_prefix.trim_end_matches('/')
}

/// Bearer header first, then the `accessToken` cookie.
#[must_use]
pub fn resolve_incoming_token(headers: &HeaderMap) -> Option<String> {
    extract_bearer_token(headers).or_else(|| read_cookie(headers, ACCESS_TOKEN_COOKIE))
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Read a cookie value by name across all `Cookie` headers.
#[must_use]
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (key, val) = pair.trim().split_once('=')?;
            (key.trim() == name).then(|| val.trim().to_string())
        })
        .find(|val| !val.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::config::AuthConfig;
    use crate::auth::session::{MemorySessionStore, SESSION_COOKIE_NAME};
    use crate::mail::LogMailSender;
    use crate::store::MemoryCredentialStore;
    use anyhow::Result;
    use axum::http::HeaderValue;
    use secrecy::SecretString;
    use std::sync::Arc;

    #[test]
    fn select_is_total_over_all_flag_combinations() {
        for session in [false, true] {
            for jwt in [false, true] {
                for strict in [false, true] {
                    let flags = AuthFlags::new(session, jwt, strict);
                    let resource = select(flags, RouteKind::Resource);
                    let login = select(flags, RouteKind::Login);

                    if strict && !(session && jwt) {
                        assert_eq!(resource, Err(ConfigError::StrictRequiresBoth));
                        assert_eq!(login, Err(ConfigError::StrictRequiresBoth));
                    } else if !session && !jwt {
                        assert_eq!(resource, Err(ConfigError::NoMethodEnabled));
                        assert_eq!(login, Err(ConfigError::NoMethodEnabled));
                    } else {
                        assert_eq!(login, Ok(GuardVariant::LoginGuard));
                        let expected = match (session, jwt) {
                            (true, true) => GuardVariant::SessionAndJwt,
                            (true, false) => GuardVariant::SessionOnly,
                            _ => GuardVariant::JwtOnly,
                        };
                        assert_eq!(resource, Ok(expected));
                    }
                }
            }
        }
    }

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("accessToken=from-cookie"));
        assert_eq!(
            resolve_incoming_token(&headers).as_deref(),
            Some("from-cookie")
        );

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(
            resolve_incoming_token(&headers).as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn empty_bearer_falls_back_to_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        headers.insert(COOKIE, HeaderValue::from_static("accessToken=c"));
        assert_eq!(resolve_incoming_token(&headers).as_deref(), Some("c"));
    }

    #[test]
    fn read_cookie_scans_all_headers() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark; lang=en"));
        headers.append(COOKIE, HeaderValue::from_static("gatehouse_session=abc=="));
        assert_eq!(read_cookie(&headers, "lang").as_deref(), Some("en"));
        assert_eq!(
            read_cookie(&headers, "gatehouse_session").as_deref(),
            Some("abc==")
        );
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn api_paths_are_detected_by_prefix() {
        assert!(is_api_path("/api/user/list", "/api/"));
        assert!(is_api_path("/api", "/api/"));
        assert!(!is_api_path("/home", "/api/"));
        assert!(!is_api_path("/apiary", "/api/"));
    }

    fn state(flags: AuthFlags) -> AuthState {
        let config = AuthConfig::new(flags, SecretString::from("guard-secret".to_string()));
        AuthState::new(
            config,
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(MemorySessionStore::new()),
            Arc::new(LogMailSender),
        )
    }

    fn cookie_headers(cookies: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(cookies)?);
        Ok(headers)
    }

    #[tokio::test]
    async fn missing_credentials_reject_by_path() {
        let state = state(AuthFlags::new(true, false, false));
        let headers = HeaderMap::new();

        let api = evaluate(
            GuardVariant::SessionOnly,
            RequestContext::new("/api/auth/session", &headers),
            &state,
        )
        .await;
        assert!(matches!(
            api,
            AuthResult::RejectWithError(AuthError::Unauthorized)
        ));

        let page = evaluate(
            GuardVariant::SessionOnly,
            RequestContext::new("/home", &headers),
            &state,
        )
        .await;
        assert!(
            matches!(page, AuthResult::RejectWithRedirect(ref target) if target == "/login?status=failed")
        );
    }

    #[tokio::test]
    async fn jwt_only_accepts_valid_token() -> Result<()> {
        let state = state(AuthFlags::new(false, true, false));
        let token = state.codec().sign(&Identity::new("alice", Vec::new()))?;
        let headers = cookie_headers(&format!("accessToken={token}"))?;

        let result = evaluate(
            GuardVariant::JwtOnly,
            RequestContext::new("/api/auth/session", &headers),
            &state,
        )
        .await;
        assert!(matches!(result, AuthResult::Authenticated(ref id) if id.username == "alice"));
        Ok(())
    }

    #[tokio::test]
    async fn session_and_jwt_prefers_token_identity() -> Result<()> {
        let state = state(AuthFlags::new(true, true, false));
        let session = state
            .sessions()
            .create(
                &Identity::new("session-user", Vec::new()),
                std::time::Duration::from_secs(60),
            )
            .await?;
        let token = state.codec().sign(&Identity::new("token-user", Vec::new()))?;

        let both = cookie_headers(&format!(
            "{SESSION_COOKIE_NAME}={session}; accessToken={token}"
        ))?;
        let result = evaluate(
            GuardVariant::SessionAndJwt,
            RequestContext::new("/api/x", &both),
            &state,
        )
        .await;
        assert!(matches!(result, AuthResult::Authenticated(ref id) if id.username == "token-user"));

        let session_only = cookie_headers(&format!("{SESSION_COOKIE_NAME}={session}"))?;
        let result = evaluate(
            GuardVariant::SessionAndJwt,
            RequestContext::new("/api/x", &session_only),
            &state,
        )
        .await;
        assert!(
            matches!(result, AuthResult::Authenticated(ref id) if id.username == "session-user")
        );
        Ok(())
    }

    #[tokio::test]
    async fn strict_requires_both_artifacts() -> Result<()> {
        let state = state(AuthFlags::new(true, true, true));
        let alice = Identity::new("alice", Vec::new());
        let token = state.codec().sign(&alice)?;
        let session = state
            .sessions()
            .create(&alice, std::time::Duration::from_secs(60))
            .await?;

        let token_only = cookie_headers(&format!("accessToken={token}"))?;
        let result = evaluate(
            GuardVariant::SessionAndJwt,
            RequestContext::new("/api/x", &token_only),
            &state,
        )
        .await;
        assert!(matches!(result, AuthResult::RejectWithError(_)));

        let both = cookie_headers(&format!(
            "{SESSION_COOKIE_NAME}={session}; accessToken={token}"
        ))?;
        let result = evaluate(
            GuardVariant::SessionAndJwt,
            RequestContext::new("/api/x", &both),
            &state,
        )
        .await;
        assert!(matches!(result, AuthResult::Authenticated(_)));
        Ok(())
    }

    #[tokio::test]
    async fn strict_rejects_mismatched_users() -> Result<()> {
        let state = state(AuthFlags::new(true, true, true));
        let token = state.codec().sign(&Identity::new("alice", Vec::new()))?;
        let session = state
            .sessions()
            .create(
                &Identity::new("bob", Vec::new()),
                std::time::Duration::from_secs(60),
            )
            .await?;
        let headers = cookie_headers(&format!(
            "{SESSION_COOKIE_NAME}={session}; accessToken={token}"
        ))?;
        let result = evaluate(
            GuardVariant::SessionAndJwt,
            RequestContext::new("/api/x", &headers),
            &state,
        )
        .await;
        assert!(matches!(
            result,
            AuthResult::RejectWithError(AuthError::Unauthorized)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn login_guard_without_credentials_is_rejected() {
        let state = state(AuthFlags::new(true, false, false));
        let headers = HeaderMap::new();
        let result = evaluate(
            GuardVariant::LoginGuard,
            RequestContext::new("/api/auth/sign-in", &headers),
            &state,
        )
        .await;
        assert!(matches!(
            result,
            AuthResult::RejectWithError(AuthError::Unauthorized)
        ));
    }
}

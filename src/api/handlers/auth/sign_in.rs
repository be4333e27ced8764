//! Login routes. Both run the login guard; they differ only in the
//! credentials they accept.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, Uri, header::SET_COOKIE},
    response::{IntoResponse, Redirect, Response},
};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{error, instrument};

use super::{
    cookies::{access_token_cookie, session_cookie},
    types::{SignInRequest, TokenSignInRequest},
};
use crate::{
    api::error::auth_error_response,
    auth::{
        AuthError, AuthResult, AuthState, Identity, LoginCredentials, LoginOutcome,
        RequestContext, RouteKind, evaluate, select,
    },
};

#[utoipa::path(
    post,
    path = "/api/auth/sign-in",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in. Session and/or access-token cookies are set.", body = Identity),
        (status = 401, description = "Unauthorized access"),
    ),
    tag = "auth"
)]
#[instrument(skip_all, fields(username = %request.username))]
pub async fn sign_in(
    uri: Uri,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<SignInRequest>,
) -> impl IntoResponse {
    let credentials = LoginCredentials::Password {
        username: request.username.trim().to_string(),
        password: SecretString::from(request.password),
    };
    login(&auth_state, uri.path(), &headers, credentials).await
}

#[utoipa::path(
    post,
    path = "/api/auth/sign-in-with-token",
    request_body = TokenSignInRequest,
    responses(
        (status = 200, description = "Token renewed. The presented token is revoked.", body = Identity),
        (status = 401, description = "Unauthorized access"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn sign_in_with_token(
    uri: Uri,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<TokenSignInRequest>,
) -> impl IntoResponse {
    let credentials = LoginCredentials::Token(request.access_token.trim().to_string());
    login(&auth_state, uri.path(), &headers, credentials).await
}

async fn login(
    auth_state: &AuthState,
    path: &str,
    headers: &HeaderMap,
    credentials: LoginCredentials,
) -> Response {
    let variant = match select(auth_state.config().flags(), RouteKind::Login) {
        Ok(variant) => variant,
        Err(err) => return auth_error_response(&AuthError::from(err)),
    };

    let ctx = RequestContext::new(path, headers).with_credentials(credentials);
    match evaluate(variant, ctx, auth_state).await {
        AuthResult::SignedIn(outcome) => signed_in(auth_state, outcome),
        AuthResult::RejectWithError(err) => auth_error_response(&err),
        AuthResult::RejectWithRedirect(target) => Redirect::to(&target).into_response(),
        // The login guard never yields a bare identity.
        AuthResult::Authenticated(_) => auth_error_response(&AuthError::Unauthorized),
    }
}

fn signed_in(auth_state: &AuthState, outcome: LoginOutcome) -> Response {
    let config = auth_state.config();
    let mut response_headers = HeaderMap::new();

    if let Some(token) = outcome.session_token.as_deref() {
        match session_cookie(config, token) {
            Ok(cookie) => {
                response_headers.append(SET_COOKIE, cookie);
            }
            Err(err) => {
                error!("Failed to set session cookie: {err}");
                return auth_error_response(&AuthError::Store(anyhow::anyhow!(
                    "invalid session cookie"
                )));
            }
        }
    }

    if let Some(token) = outcome.access_token.as_deref() {
        match access_token_cookie(config, token) {
            Ok(cookie) => {
                response_headers.append(SET_COOKIE, cookie);
            }
            Err(err) => {
                error!("Failed to set access token cookie: {err}");
                return auth_error_response(&AuthError::Store(anyhow::anyhow!(
                    "invalid access token cookie"
                )));
            }
        }
    }

    (StatusCode::OK, response_headers, Json(outcome.identity)).into_response()
}

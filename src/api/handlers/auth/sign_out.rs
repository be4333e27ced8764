use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{error, instrument};

use super::cookies::{clear_access_token_cookie, clear_session_cookie};
use crate::auth::{
    AuthState, LoginPolicy,
    guard::{read_cookie, resolve_incoming_token},
    session::SESSION_COOKIE_NAME,
};

#[utoipa::path(
    post,
    path = "/api/auth/sign-out",
    responses(
        (status = 204, description = "Session destroyed, access token revoked, cookies cleared")
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn sign_out(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let session_token = read_cookie(&headers, SESSION_COOKIE_NAME);
    let access_token = resolve_incoming_token(&headers);

    if let Err(err) = LoginPolicy::new(&auth_state)
        .sign_out(session_token.as_deref(), access_token.as_deref())
        .await
    {
        error!("Failed to sign out: {err}");
    }

    // Always clear the cookies, even if the session record was missing.
    let config = auth_state.config();
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(config) {
        response_headers.append(SET_COOKIE, cookie);
    }
    if let Ok(cookie) = clear_access_token_cookie(config) {
        response_headers.append(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

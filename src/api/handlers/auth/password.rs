//! Password reset flow.
//!
//! Flow Overview:
//! 1) `forgot-password` stores the hash of a random token for a known user and
//!    mails a link carrying the raw token. The response never reveals whether
//!    the user exists.
//! 2) `reset-password` consumes the token (single use, TTL bound) and stores a
//!    new Argon2 hash for its user.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use super::types::{ForgotPasswordRequest, MessageResponse, ResetPasswordRequest};
use crate::{
    api::{
        error::{bad_request, internal_error, json_error},
        handlers::valid_password,
    },
    auth::{
        AuthState,
        password::hash_password,
        session::{generate_session_token, hash_session_token},
    },
    mail::{build_reset_url, password_reset_message},
    store::UserUpdate,
};

const FORGOT_PASSWORD_MESSAGE: &str =
    "If the account exists, a password reset link has been sent.";

#[utoipa::path(
    post,
    path = "/api/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Accepted. The same answer is given for unknown users.", body = MessageResponse),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn forgot_password(
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<ForgotPasswordRequest>,
) -> impl IntoResponse {
    let username = request.username.trim();
    if let Err(err) = send_reset_link(&auth_state, username).await {
        error!("Failed to issue password reset: {err:#}");
    }
    (
        StatusCode::OK,
        Json(MessageResponse::new(FORGOT_PASSWORD_MESSAGE)),
    )
}

async fn send_reset_link(auth_state: &AuthState, username: &str) -> anyhow::Result<()> {
    let config = auth_state.config();
    let store = auth_state.credentials();

    let token = generate_session_token()?;
    let stored = store
        .store_reset_token(
            username,
            hash_session_token(&token),
            config.reset_token_ttl_seconds(),
        )
        .await?;
    if !stored {
        debug!("password reset requested for unknown user");
        return Ok(());
    }

    let reset_url = build_reset_url(config.frontend_base_url(), &token);
    let message = password_reset_message(config.mail_from(), username, &reset_url);
    auth_state.mailer().send(&message)?;
    info!("password reset link sent");
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Invalid or expired token, or invalid password"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn reset_password(
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<ResetPasswordRequest>,
) -> impl IntoResponse {
    if !valid_password(&request.password) {
        return bad_request("Password must be between 8 and 1024 characters");
    }
    let token = request.token.trim();
    if token.is_empty() {
        return invalid_token();
    }

    let store = auth_state.credentials();
    let username = match store.consume_reset_token(&hash_session_token(token)).await {
        Ok(Some(username)) => username,
        Ok(None) => return invalid_token(),
        Err(err) => return internal_error("Failed to consume reset token", &err),
    };

    let password_hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => return internal_error("Failed to hash password", &err),
    };

    let update = UserUpdate {
        password_hash: Some(password_hash),
        ..UserUpdate::default()
    };
    match store.update_user(&username, update).await {
        Ok(Some(_)) => {
            info!("password reset completed");
            (
                StatusCode::OK,
                Json(MessageResponse::new("Password updated")),
            )
                .into_response()
        }
        // The user was deleted after the token was issued.
        Ok(None) => invalid_token(),
        Err(err) => internal_error("Failed to update password", &err),
    }
}

fn invalid_token() -> Response {
    json_error(
        StatusCode::BAD_REQUEST,
        "invalid_token",
        "Reset token is invalid or expired",
    )
}

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use std::sync::Arc;
use tracing::{info, instrument};

use super::types::SignUpRequest;
use crate::{
    api::{
        error::{bad_request, internal_error, json_error},
        handlers::{normalize_optional, valid_password, valid_username},
    },
    auth::{
        AuthState,
        identity::ROLE_USER,
        password::{hash_password, is_reserved_username},
    },
    store::{CreateOutcome, CredentialStore, NewUser, UserSummary},
};

#[utoipa::path(
    post,
    path = "/api/auth/sign-up",
    request_body = SignUpRequest,
    responses(
        (status = 201, description = "User registered with the `user` role", body = UserSummary),
        (status = 400, description = "Invalid username or password"),
        (status = 409, description = "Username already taken"),
    ),
    tag = "auth"
)]
#[instrument(skip_all, fields(username = %request.username))]
pub async fn sign_up(
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<SignUpRequest>,
) -> impl IntoResponse {
    let username = request.username.trim().to_string();
    if !valid_username(&username) {
        return bad_request("Invalid username");
    }
    if is_reserved_username(auth_state.config(), &username) {
        return json_error(StatusCode::CONFLICT, "conflict", "Username already taken");
    }
    if !valid_password(&request.password) {
        return bad_request("Password must be between 8 and 1024 characters");
    }

    let password_hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => return internal_error("Failed to hash password", &err),
    };

    let new_user = NewUser {
        username,
        name: normalize_optional(request.name),
        avatar: normalize_optional(request.avatar),
        password_hash,
    };

    match register(auth_state.credentials(), new_user, &[ROLE_USER]).await {
        Ok(Some(summary)) => {
            info!("user registered");
            (StatusCode::CREATED, Json(summary)).into_response()
        }
        Ok(None) => json_error(StatusCode::CONFLICT, "conflict", "Username already taken"),
        Err(err) => internal_error("Failed to register user", &err),
    }
}

/// Create the user and link `roles`. `None` when the username is taken.
/// Unknown role tags are skipped.
pub(crate) async fn register(
    store: &dyn CredentialStore,
    user: NewUser,
    roles: &[&str],
) -> anyhow::Result<Option<UserSummary>> {
    let username = user.username.clone();
    let created = match store.create_user(user).await? {
        CreateOutcome::Created(summary) => summary,
        CreateOutcome::Conflict => return Ok(None),
    };
    if roles.is_empty() {
        return Ok(Some(created));
    }
    for tag in roles {
        store.assign_role(&username, tag).await?;
    }
    // Reload so the response carries the linked roles.
    Ok(Some(
        store
            .find_user(&username)
            .await?
            .map_or(created, |record| record.summary()),
    ))
}

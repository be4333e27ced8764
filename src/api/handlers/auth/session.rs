use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::instrument;

use super::types::UnlockSessionRequest;
use crate::{
    api::error::auth_error_response,
    auth::{AuthState, Identity},
};

#[utoipa::path(
    get,
    path = "/api/auth/session",
    responses(
        (status = 200, description = "Identity bound to this request", body = Identity),
        (status = 401, description = "Unauthorized access"),
    ),
    tag = "auth"
)]
pub async fn session(Extension(identity): Extension<Identity>) -> impl IntoResponse {
    (StatusCode::OK, Json(identity.without_access_token()))
}

#[utoipa::path(
    post,
    path = "/api/auth/unlock-session",
    request_body = UnlockSessionRequest,
    responses(
        (status = 200, description = "Password confirmed for the current identity", body = Identity),
        (status = 401, description = "Unauthorized access"),
    ),
    tag = "auth"
)]
#[instrument(skip_all, fields(username = %identity.username))]
pub async fn unlock_session(
    auth_state: Extension<Arc<AuthState>>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<UnlockSessionRequest>,
) -> impl IntoResponse {
    let password = SecretString::from(request.password);
    match auth_state
        .password_verifier()
        .verify(&identity.username, &password)
        .await
    {
        Ok(verified) => (StatusCode::OK, Json(verified)).into_response(),
        Err(err) => auth_error_response(&err),
    }
}

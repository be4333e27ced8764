//! JSON error bodies shared by handlers and the guard middleware.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::auth::AuthError;

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Credential and token failures become 401 with one shared message;
/// everything else is a 500.
pub fn auth_error_response(err: &AuthError) -> Response {
    if err.is_unauthorized() {
        return json_error(StatusCode::UNAUTHORIZED, "unauthorized", err.public_message());
    }
    error!("Authentication failed: {err}");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        err.public_message(),
    )
}

pub fn internal_error(context: &str, err: &anyhow::Error) -> Response {
    error!("{context}: {err:#}");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "Internal server error",
    )
}

pub fn forbidden() -> Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", "Forbidden")
}

pub fn not_found(message: impl Into<String>) -> Response {
    json_error(StatusCode::NOT_FOUND, "not_found", message)
}

pub fn bad_request(message: impl Into<String>) -> Response {
    json_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

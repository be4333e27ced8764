use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;

use super::{require_admin, valid_role_tag};
use crate::{
    api::error::{bad_request, internal_error, json_error, not_found},
    auth::{AuthState, Identity, RoleRef},
    store::CreateOutcome,
};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateRoleRequest {
    pub tag: String,
    pub title: String,
}

#[utoipa::path(
    get,
    path = "/api/role",
    responses(
        (status = 200, description = "All roles (admin-only).", body = [RoleRef]),
        (status = 401, description = "Unauthorized access"),
        (status = 403, description = "Forbidden."),
    ),
    tag = "role"
)]
pub async fn list_roles(
    Extension(principal): Extension<Identity>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Err(response) = require_admin(&principal) {
        return response;
    }
    match auth_state.credentials().list_roles().await {
        Ok(roles) => (StatusCode::OK, Json(roles)).into_response(),
        Err(err) => internal_error("Failed to list roles", &err),
    }
}

#[utoipa::path(
    post,
    path = "/api/role",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created (admin-only).", body = RoleRef),
        (status = 400, description = "Invalid tag or title."),
        (status = 401, description = "Unauthorized access"),
        (status = 403, description = "Forbidden."),
        (status = 409, description = "Role already exists."),
    ),
    tag = "role"
)]
#[instrument(skip_all, fields(role = %payload.tag))]
pub async fn create_role(
    Extension(principal): Extension<Identity>,
    auth_state: Extension<Arc<AuthState>>,
    Json(payload): Json<CreateRoleRequest>,
) -> impl IntoResponse {
    if let Err(response) = require_admin(&principal) {
        return response;
    }
    let tag = payload.tag.trim();
    let title = payload.title.trim();
    if !valid_role_tag(tag) {
        return bad_request("Invalid role tag");
    }
    if title.is_empty() {
        return bad_request("Role title is required");
    }

    match auth_state
        .credentials()
        .create_role(RoleRef::new(tag, title))
        .await
    {
        Ok(CreateOutcome::Created(role)) => {
            info!("role created");
            (StatusCode::CREATED, Json(role)).into_response()
        }
        Ok(CreateOutcome::Conflict) => {
            json_error(StatusCode::CONFLICT, "conflict", "Role already exists")
        }
        Err(err) => internal_error("Failed to create role", &err),
    }
}

#[utoipa::path(
    delete,
    path = "/api/role/{tag}",
    params(
        ("tag" = String, Path, description = "Role tag")
    ),
    responses(
        (status = 204, description = "Role and its user links removed (admin-only)."),
        (status = 401, description = "Unauthorized access"),
        (status = 403, description = "Forbidden."),
        (status = 404, description = "Role not found."),
    ),
    tag = "role"
)]
#[instrument(skip_all, fields(role = %tag))]
pub async fn delete_role(
    Path(tag): Path<String>,
    Extension(principal): Extension<Identity>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Err(response) = require_admin(&principal) {
        return response;
    }
    match auth_state.credentials().delete_role(&tag).await {
        Ok(true) => {
            info!("role deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => not_found("Role not found"),
        Err(err) => internal_error("Failed to delete role", &err),
    }
}
